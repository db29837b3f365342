use crate::{
    error::CheckError,
    host,
    logging::{Logger, LoggerArgs},
    pacemaker::{self, Pcs, Placement, StatusSource},
    plugin::{PluginExit, Report},
};
use clap::Args;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Args, Debug, Clone)]
pub struct PacemakerArgs {
    /// Cluster resource whose owner runs the check
    #[arg(short, long)]
    pub resource: String,

    /// Script run when the resource is started on this node.
    /// Its exit code becomes the result of the check.
    #[arg(short, long, value_name = "/path/to/check")]
    pub script: PathBuf,

    /// Program queried for the cluster status
    #[arg(long, alias = "pcs_command", default_value = "pcs")]
    pub pcs_command: String,

    /// Node name to compare against the resource owner.
    /// Defaults to the short hostname of this machine.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Logging configuration
    #[command(flatten)]
    pub logger: LoggerArgs,
}

pub async fn pacemaker_host(args: PacemakerArgs) -> PluginExit {
    if let Err(e) = Logger::from(args.logger.clone()).init() {
        return CheckError::from(e).into();
    }
    info!(
        "Starting oschecks v{} `pacemaker-host` check",
        env!("CARGO_PKG_VERSION")
    );
    debug!("effective config: {:#?}", args);

    let source = Pcs::new(&args.pcs_command);
    match pacemaker_host_with(&source, &args).await {
        Ok(exit) => exit,
        Err(e) => e.into(),
    }
}

/// Decides placement from `source` and delegates when the resource is local.
pub async fn pacemaker_host_with<S>(source: &S, args: &PacemakerArgs) -> Result<PluginExit, CheckError>
where
    S: StatusSource + ?Sized,
{
    let node = match &args.hostname {
        Some(name) => name.clone(),
        None => host::hostname()
            .map(|h| host::short(&h).to_string())
            .map_err(CheckError::Hostname)?,
    };

    let status = source.status().await?;
    let resource = &args.resource;
    let exit = match pacemaker::locate(&status, resource, &node) {
        Placement::Missing => {
            Report::critical(format!("pacemaker resource {resource} not found")).into()
        }
        Placement::NotStarted(state) => Report::critical(format!(
            "pacemaker resource {resource} is not started ({state})"
        ))
        .into(),
        Placement::Elsewhere(owner) => Report::ok(format!(
            "pacemaker resource {resource} doesn't run on this node (but on {owner})"
        ))
        .into(),
        Placement::Local => {
            debug!(%resource, %node, "resource is local");
            PluginExit::Passthrough(pacemaker::delegate(&args.script).await?)
        }
    };
    Ok(exit)
}
