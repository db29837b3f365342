use crate::{
    compute::{ComputeApi, NovaClient, endpoint},
    config::nova::{DEFAULT_SSH_KEY_FILE, DEFAULT_SSH_USER, NovaArgs, NovaConfig},
    error::CheckError,
    host,
    lifecycle::{self, Checker},
    plugin::{PluginExit, Report},
    ssh::OpenSsh,
};
use chrono::Utc;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{debug, info};

pub async fn nova_instance(args: NovaArgs) -> PluginExit {
    match run(args).await {
        Ok(report) => report.into(),
        Err(e) => e.into(),
    }
}

async fn run(args: NovaArgs) -> Result<Report, CheckError> {
    let config = args.load()?;
    config.logger.init()?;
    info!(
        "Starting oschecks v{} `nova-instance` check",
        env!("CARGO_PKG_VERSION")
    );
    debug!("effective config: {:#?}", config);

    let hostname = match &config.hostname {
        Some(name) => name.clone(),
        None => host::fqdn().await.map_err(CheckError::Hostname)?,
    };
    let instance_name = lifecycle::instance_name(&config.instance_name, &hostname);

    // Authentication counts towards the reported duration.
    let (started_at, started) = (Utc::now(), Instant::now());
    let client = connect(&config).await?;
    let shell = match &config.ssh {
        Some(ssh) => OpenSsh::new(&ssh.program, &ssh.user, ssh.key_file.clone()),
        // never invoked when the probe is disabled
        None => OpenSsh::new("ssh", DEFAULT_SSH_USER, PathBuf::from(DEFAULT_SSH_KEY_FILE)),
    };
    let opts = config.lifecycle(instance_name);

    Ok(Checker::starting_at(&client, &shell, &opts, started_at, started)
        .report()
        .await)
}

/// Authenticates and validates the compute endpoint with a limits call.
///
/// With an endpoint override the catalog url is rewritten and validated again.
async fn connect(config: &NovaConfig) -> Result<NovaClient, CheckError> {
    let mut client = NovaClient::connect(config.client.clone())
        .await
        .map_err(CheckError::Connection)?;
    client.limits().await.map_err(CheckError::Connection)?;

    if let Some(override_url) = &config.endpoint_url {
        let url = endpoint::merge(override_url, client.management_url())?;
        client.set_management_url(url);
        client.limits().await.map_err(CheckError::Connection)?;
    }
    Ok(client)
}
