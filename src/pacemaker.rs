//! Pacemaker resource placement and delegation.
//!
//! `pcs status` lists one resource per line as whitespace separated fields:
//! resource name, agent, status and optionally the node running it. When the
//! resource is started on this node the real check is delegated to a script
//! whose exit code becomes ours.
use async_trait::async_trait;
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

const STARTED: &str = "Started";

#[derive(Debug, Error)]
pub enum PacemakerError {
    #[error("{0} not found")]
    StatusMissing(String),

    #[error("{program} status with status {code}: {output}")]
    StatusFailed {
        program: String,
        code: String,
        output: String,
    },

    #[error("failed to run {program} status: {source}")]
    StatusIo {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot run delegate {}: {source}", .script.display())]
    Delegate {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One resource line of the status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub resource: String,
    pub agent: String,
    pub status: String,
    /// Node currently running the resource, empty when none is listed.
    pub node: String,
}

impl ResourceRow {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let resource = fields.next()?.to_string();
        let agent = fields.next().unwrap_or_default().to_string();
        let status = fields.next().unwrap_or_default().to_string();
        let node = fields.collect::<Vec<_>>().join(" ");
        Some(Self {
            resource,
            agent,
            status,
            node,
        })
    }
}

/// Parses every non-blank line of the status output.
pub fn parse_status(text: &str) -> impl Iterator<Item = ResourceRow> + '_ {
    text.lines().filter_map(ResourceRow::parse)
}

/// Where a resource runs, relative to this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Missing,
    NotStarted(String),
    Elsewhere(String),
    Local,
}

/// Locates `resource` in the status output and decides where it runs.
pub fn locate(text: &str, resource: &str, local_node: &str) -> Placement {
    let Some(row) = parse_status(text).find(|r| r.resource == resource) else {
        return Placement::Missing;
    };
    if row.status != STARTED {
        return Placement::NotStarted(row.status);
    }
    if row.node != local_node {
        return Placement::Elsewhere(row.node);
    }
    Placement::Local
}

/// Produces cluster status text.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self) -> Result<String, PacemakerError>;
}

/// The `pcs` command line tool.
#[derive(Debug, Clone)]
pub struct Pcs {
    program: String,
}

impl Pcs {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl StatusSource for Pcs {
    async fn status(&self) -> Result<String, PacemakerError> {
        debug!(program = %self.program, "querying cluster status");
        let output = Command::new(&self.program)
            .arg("status")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => PacemakerError::StatusMissing(self.program.clone()),
                _ => PacemakerError::StatusIo {
                    program: self.program.clone(),
                    source,
                },
            })?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| output.status.to_string());
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(PacemakerError::StatusFailed {
                program: self.program.clone(),
                code,
                output: text.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs the delegate with inherited stdio and returns its exit code.
///
/// Signal terminations map to `128 + signal` like a shell reports them.
pub async fn delegate(script: &Path) -> Result<u8, PacemakerError> {
    info!(script = %script.display(), "delegating check to local script");
    let status = Command::new(script)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| PacemakerError::Delegate {
            script: script.to_path_buf(),
            source,
        })?;
    debug!(%status, "delegate finished");
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        code as u8
    } else if let Some(signal) = status.signal() {
        (128 + signal) as u8
    } else {
        crate::plugin::Status::Unknown.code()
    }
}
