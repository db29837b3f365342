//! Compute instance lifecycle check.
//!
//! The [`Checker`] provisions a throwaway instance and tears it down again:
//!
//! `UNKNOWN -> CREATING -> ACTIVE -> (REACHABLE) -> DELETING -> DELETED`
//!
//! Each phase returns a [`Step`]; the first failing phase short-circuits the
//! remaining provisioning phases. Once an instance exists its deletion is
//! always requested, and deletion is only polled while the run is still
//! healthy. Everything observed along the way lands in a single [`Outcome`]
//! which becomes the plugin [`Report`].
use crate::compute::{ComputeApi, ComputeError, CreateServer, Flavor, Image, Server};
use crate::plugin::Report;
use crate::ssh::{RemoteShell, SshStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// Delay between two polls of the same resource.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Name of the test instance for this checking host.
///
/// Suffixing the local hostname keeps checks run from several hosts against
/// the same cloud from colliding.
pub fn instance_name(base: &str, hostname: &str) -> String {
    format!("{}_{}", base, hostname.trim())
}

/// Reachability probe settings.
#[derive(Debug, Clone)]
pub struct SshProbe {
    pub timeout: Duration,
}

/// What to provision and how long each phase may take.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub instance_name: String,
    pub image_name: String,
    pub flavor_name: String,
    pub keypair_name: String,
    /// Delete same-named leftovers instead of failing.
    pub force_delete: bool,
    /// Bound for the active and deleted polls of the test instance.
    pub timeout: Duration,
    /// Bound for each leftover deletion poll.
    pub delete_timeout: Duration,
    pub ssh: Option<SshProbe>,
}

/// A failed phase: one or more human readable messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure(Vec<String>);

impl Failure {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure(vec![message])
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Failure(vec![message.to_string()])
    }
}

pub type Step<T> = Result<T, Failure>;

/// Everything a run observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub failures: Vec<String>,
    pub notifications: Vec<String>,
    pub perfdata: Vec<String>,
    pub ssh_connected: bool,
}

impl Outcome {
    pub fn is_healthy(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, failure: Failure) {
        for message in &failure.0 {
            warn!("{}", message);
        }
        self.failures.extend(failure.0);
    }

    /// Builds the plugin report for a run that took `elapsed`.
    pub fn into_report(self, elapsed: Duration) -> Report {
        if !self.is_healthy() {
            return Report::critical(self.failures.join(", "));
        }
        let secs = elapsed.as_secs();
        let ssh = if self.ssh_connected {
            ", ssh connected,"
        } else {
            ""
        };
        let notes = if self.notifications.is_empty() {
            String::new()
        } else {
            format!(" ({})", self.notifications.join(", "))
        };
        Report::ok(format!(
            "Nova instance spawned{} and deleted in {} seconds{}",
            ssh, secs, notes
        ))
        .with_perfdata(std::iter::once(format!("time={}", secs)).chain(self.perfdata))
    }
}

/// Why waiting for an instance to disappear ended without seeing it gone.
enum Lingering {
    TimedOut(u64),
    Failed(ComputeError),
}

/// Runs one instance lifecycle check.
pub struct Checker<'a, C: ?Sized, S: ?Sized> {
    api: &'a C,
    shell: &'a S,
    opts: &'a LifecycleOptions,
    outcome: Outcome,
    started: Instant,
}

impl<'a, C, S> Checker<'a, C, S>
where
    C: ComputeApi + ?Sized,
    S: RemoteShell + ?Sized,
{
    /// Starts the session clock now.
    pub fn new(api: &'a C, shell: &'a S, opts: &'a LifecycleOptions) -> Self {
        Self::starting_at(api, shell, opts, Utc::now(), Instant::now())
    }

    /// Continues a session whose clock started before the checker existed,
    /// typically before authentication. `started_at` is reported as the
    /// creation time and `started` measures the elapsed time.
    pub fn starting_at(
        api: &'a C,
        shell: &'a S,
        opts: &'a LifecycleOptions,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> Self {
        let outcome = Outcome {
            notifications: vec![format!("instance_creation_time={}", started_at.timestamp())],
            ..Outcome::default()
        };
        Self {
            api,
            shell,
            opts,
            outcome,
            started,
        }
    }

    /// Runs every phase and returns what was observed and how long it took.
    pub async fn run(mut self) -> (Outcome, Duration) {
        info!(instance = %self.opts.instance_name, "starting instance lifecycle check");

        match self.provision().await {
            Err(failure) => self.outcome.record(failure),
            Ok(server) => {
                let id = server.id.clone();
                if let Err(failure) = self.verify(server).await {
                    self.outcome.record(failure);
                }
                self.teardown(&id).await;
            }
        }

        let elapsed = self.started.elapsed();
        info!(
            healthy = self.outcome.is_healthy(),
            elapsed_secs = elapsed.as_secs(),
            "instance lifecycle check finished"
        );
        (self.outcome, elapsed)
    }

    /// Runs the check and renders the plugin report.
    pub async fn report(self) -> Report {
        let (outcome, elapsed) = self.run().await;
        outcome.into_report(elapsed)
    }

    async fn provision(&mut self) -> Step<Server> {
        self.clear_conflicts().await?;
        let image = self.resolve_image().await?;
        let flavor = self.resolve_flavor().await?;
        self.create(&image, &flavor).await
    }

    async fn verify(&mut self, server: Server) -> Step<()> {
        let server = self.wait_active(server).await?;
        if let Some(probe) = &self.opts.ssh {
            self.probe_ssh(&server, probe.timeout).await?;
            self.outcome.ssh_connected = true;
        }
        Ok(())
    }

    async fn teardown(&mut self, id: &str) {
        debug!(%id, "deleting test instance");
        if let Err(e) = self.api.delete_server(id).await {
            self.outcome
                .record(format!("Problem deleting the vm: {}", e).into());
            return;
        }
        if !self.outcome.is_healthy() {
            return;
        }
        if let Err(failure) = self.wait_deleted(id).await {
            self.outcome.record(failure);
        }
    }

    async fn clear_conflicts(&mut self) -> Step<()> {
        let opts = self.opts;
        let name = &opts.instance_name;
        let servers = self
            .api
            .list_servers()
            .await
            .map_err(|e| Failure::from(format!("Cannot list the vms ({})", e)))?;
        let leftovers: Vec<Server> = servers.into_iter().filter(|s| &s.name == name).collect();
        let count = leftovers.len();
        if count == 0 {
            return Ok(());
        }

        if !self.opts.force_delete {
            return Err(format!(
                "Found '{}' present {} time(s). Won't create test instance. Please check and delete.",
                name, count
            )
            .into());
        }

        info!(%name, count, "deleting leftover instances");
        let mut failures = Vec::new();
        for (index, server) in leftovers.iter().enumerate() {
            if let Err(message) = self.remove_leftover(server, index).await {
                failures.push(message);
            }
        }
        self.outcome
            .notifications
            .push(format!("Found '{}' present {} time(s)", name, count));

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Failure(failures))
        }
    }

    async fn remove_leftover(&mut self, server: &Server, index: usize) -> Result<(), String> {
        let undeleted = || {
            format!(
                "undeleted_server_{}_{}={}",
                server.name,
                index,
                server.created_epoch()
            )
        };

        let result = match self.api.delete_server(&server.id).await {
            Ok(()) => self.await_gone(&server.id, self.opts.delete_timeout).await,
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Lingering::Failed(e)),
        };

        match result {
            Ok(()) => Ok(()),
            Err(Lingering::TimedOut(waited)) => {
                self.outcome.perfdata.push(undeleted());
                Err(format!(
                    "Could not delete the vm {} within {} seconds (created at {})",
                    server.name,
                    waited,
                    server.created_display()
                ))
            }
            Err(Lingering::Failed(e)) => {
                self.outcome.perfdata.push(undeleted());
                Err(format!("Cannot delete the vm {} ({})", server.name, e))
            }
        }
    }

    async fn resolve_image(&self) -> Step<Image> {
        let name = &self.opts.image_name;
        self.api
            .find_image(name)
            .await
            .map_err(|e| format!("Cannot find the image {} ({})", name, e).into())
    }

    async fn resolve_flavor(&self) -> Step<Flavor> {
        let name = &self.opts.flavor_name;
        self.api
            .find_flavor(name)
            .await
            .map_err(|e| format!("Cannot find the flavor {} ({})", name, e).into())
    }

    async fn create(&self, image: &Image, flavor: &Flavor) -> Step<Server> {
        let name = &self.opts.instance_name;
        let request = CreateServer {
            name,
            image,
            flavor,
            key_name: &self.opts.keypair_name,
        };
        let server = self
            .api
            .create_server(request)
            .await
            .map_err(|e| Failure::from(format!("Cannot create the vm {} ({})", name, e)))?;
        info!(id = %server.id, %name, "instance creation requested");
        Ok(server)
    }

    async fn wait_active(&self, mut server: Server) -> Step<Server> {
        let timeout = self.opts.timeout;
        let mut waited = Duration::ZERO;
        while !server.is_active() {
            if waited >= timeout {
                return Err("Cannot create the vm".into());
            }
            sleep(POLL_INTERVAL).await;
            waited += POLL_INTERVAL;
            server = self.api.get_server(&server.id).await.map_err(|e| {
                Failure::from(format!("Problem getting the status of the vm: {}", e))
            })?;
            debug!(
                id = %server.id,
                status = %server.status,
                waited_secs = waited.as_secs(),
                "polled instance"
            );
        }
        info!(id = %server.id, waited_secs = waited.as_secs(), "instance is active");
        Ok(server)
    }

    async fn probe_ssh(&self, server: &Server, timeout: Duration) -> Step<()> {
        let host = server
            .first_address()
            .ok_or_else(|| Failure::from("Could not ssh to vm: no network address assigned"))?;

        let start = Instant::now();
        let mut last: Option<SshStatus> = None;
        loop {
            if last.is_some_and(SshStatus::is_connected) {
                info!(%host, "ssh probe succeeded");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                let status = last.map(|s| s.to_string()).unwrap_or_default();
                return Err(format!(
                    "Could not ssh to vm within {} seconds: {}",
                    timeout.as_secs(),
                    status
                )
                .into());
            }
            sleep(POLL_INTERVAL).await;

            let status = match self.shell.probe(host).await {
                Ok(output) => SshStatus::classify(&output),
                Err(e) => {
                    warn!(error = %e, "ssh probe could not run");
                    SshStatus::Unknown
                }
            };
            debug!(
                %host,
                %status,
                elapsed_secs = start.elapsed().as_secs(),
                "ssh probe attempt"
            );
            last = Some(status);
        }
    }

    async fn wait_deleted(&self, id: &str) -> Step<()> {
        match self.await_gone(id, self.opts.timeout).await {
            Ok(()) => {
                info!(%id, "instance deleted");
                Ok(())
            }
            Err(Lingering::TimedOut(waited)) => {
                Err(format!("Could not delete the vm within {} seconds", waited).into())
            }
            Err(Lingering::Failed(e)) => Err(format!("Cannot delete the vm ({})", e).into()),
        }
    }

    /// Polls until the API reports the instance as not found.
    async fn await_gone(&self, id: &str, timeout: Duration) -> Result<(), Lingering> {
        let mut waited = Duration::ZERO;
        loop {
            sleep(POLL_INTERVAL).await;
            if waited >= timeout {
                return Err(Lingering::TimedOut(waited.as_secs()));
            }
            waited += POLL_INTERVAL;
            match self.api.get_server(id).await {
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(Lingering::Failed(e)),
                Ok(server) => debug!(
                    %id,
                    status = %server.status,
                    waited_secs = waited.as_secs(),
                    "instance still present"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_suffixes_hostname() {
        assert_eq!(
            instance_name("monitoring_test", "checker01.example.com"),
            "monitoring_test_checker01.example.com"
        );
        assert_eq!(
            instance_name("monitoring_test", "checker01\n"),
            "monitoring_test_checker01"
        );
        assert!(instance_name("a", "host").ends_with("_host"));
    }

    #[test]
    fn healthy_outcome_report() {
        let outcome = Outcome {
            notifications: vec!["instance_creation_time=1700000000".into()],
            ..Outcome::default()
        };
        let report = outcome.into_report(Duration::from_secs(42));
        assert_eq!(
            report.to_string(),
            "OK - Nova instance spawned and deleted in 42 seconds \
             (instance_creation_time=1700000000) | time=42"
        );
    }

    #[test]
    fn ssh_and_perfdata_in_report() {
        let outcome = Outcome {
            notifications: vec!["Found 'x' present 1 time(s)".into()],
            perfdata: vec!["undeleted_server_x_0=0".into()],
            ssh_connected: true,
            ..Outcome::default()
        };
        let report = outcome.into_report(Duration::from_secs(7));
        assert!(report.text().starts_with("Nova instance spawned, ssh connected, and deleted in 7"));
        assert_eq!(report.perfdata(), ["time=7", "undeleted_server_x_0=0"]);
    }

    #[test]
    fn failures_join_into_critical() {
        let outcome = Outcome {
            failures: vec!["Cannot create the vm".into(), "Problem deleting the vm: boom".into()],
            ..Outcome::default()
        };
        let report = outcome.into_report(Duration::from_secs(1));
        assert_eq!(report.status(), crate::plugin::Status::Critical);
        assert_eq!(
            report.text(),
            "Cannot create the vm, Problem deleting the vm: boom"
        );
    }
}
