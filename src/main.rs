use clap::Parser;
use clap::error::ErrorKind;
use oschecks::cmd;
use oschecks::cmd::{Cli, Command};
use oschecks::plugin::{PluginExit, Status};

#[tokio::main]
async fn main() -> PluginExit {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => PluginExit::Passthrough(0),
                _ => PluginExit::Passthrough(Status::Unknown.code()),
            };
        }
    };
    match cli.cmd {
        Command::NovaInstance(args) => cmd::nova_instance(*args).await,
        Command::PacemakerHost(args) => cmd::pacemaker_host(args).await,
    }
}
