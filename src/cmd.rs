use clap::{Parser, Subcommand};

mod nova;
mod pacemaker;

pub use nova::nova_instance;
pub use pacemaker::{PacemakerArgs, pacemaker_host, pacemaker_host_with};

use crate::config::nova::NovaArgs;

#[derive(Parser, Debug)]
#[command(name = "oschecks")]
#[command(version, about = "Health checks for OpenStack deployments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spawn and delete a test instance to verify the compute service end to end
    #[command(alias = "check_nova-instance")]
    NovaInstance(Box<NovaArgs>),

    /// Delegate a check to this node when it runs a given pacemaker resource
    #[command(alias = "peacemaker-host")]
    PacemakerHost(PacemakerArgs),
}
