//! Remote shell reachability probe.
//!
//! The probe runs a fixed command over OpenSSH and classifies the combined
//! output by looking for well-known diagnostic substrings.
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Command executed on the instance.
pub const PROBE_COMMAND: &str = r#"uname -a; echo "nagios ssh check"; exit 0"#;

/// Marker the probe command prints on success.
pub const PROBE_MARKER: &str = "nagios ssh check";

/// Seconds OpenSSH waits for the TCP connection.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum SshError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshStatus {
    Connected,
    TimedOut,
    Refused,
    AuthFailed,
    KeyInaccessible,
    UnresolvedHost,
    NoRoute,
    Reset,
    Unknown,
}

impl SshStatus {
    /// Classifies the combined stdout/stderr of one `ssh` run.
    ///
    /// Failure markers are checked before the success marker.
    pub fn classify(output: &str) -> Self {
        const FAILURES: [(&str, SshStatus); 7] = [
            ("Connection timed out", SshStatus::TimedOut),
            ("Connection refused", SshStatus::Refused),
            ("Permission denied", SshStatus::AuthFailed),
            (
                "not accessible: No such file or directory",
                SshStatus::KeyInaccessible,
            ),
            ("Could not resolve hostname", SshStatus::UnresolvedHost),
            ("No route to host", SshStatus::NoRoute),
            ("Connection reset by peer", SshStatus::Reset),
        ];

        FAILURES
            .iter()
            .find(|(needle, _)| output.contains(needle))
            .map(|(_, status)| *status)
            .unwrap_or_else(|| {
                if output.contains(PROBE_MARKER) {
                    SshStatus::Connected
                } else {
                    SshStatus::Unknown
                }
            })
    }

    pub fn is_connected(self) -> bool {
        self == SshStatus::Connected
    }
}

impl std::fmt::Display for SshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SshStatus::Connected => "OK",
            SshStatus::TimedOut => "SSH connection timed out",
            SshStatus::Refused => "SSH connection refused",
            SshStatus::AuthFailed => "SSH keypair authentication failed",
            SshStatus::KeyInaccessible => "SSH private key file inaccessible",
            SshStatus::UnresolvedHost => "SSH cannot resolve host",
            SshStatus::NoRoute => "SSH has no route to host",
            SshStatus::Reset => "SSH connection reset",
            SshStatus::Unknown => "SSH failed on unknown error",
        };
        f.write_str(text)
    }
}

/// Runs the probe command against a host and returns its combined output.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn probe(&self, host: &str) -> Result<String, SshError>;
}

/// OpenSSH client invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct OpenSsh {
    program: String,
    user: String,
    key_file: PathBuf,
}

impl OpenSsh {
    pub fn new(program: impl Into<String>, user: impl Into<String>, key_file: PathBuf) -> Self {
        Self {
            program: program.into(),
            user: user.into(),
            key_file,
        }
    }

    /// Arguments passed to the ssh binary for `host`.
    pub fn args(&self, host: &str) -> Vec<String> {
        vec![
            "-o".into(),
            "UserKnownHostsFile=/dev/null".into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
            "-l".into(),
            self.user.clone(),
            "-i".into(),
            self.key_file.display().to_string(),
            host.to_string(),
            PROBE_COMMAND.to_string(),
        ]
    }
}

#[async_trait]
impl RemoteShell for OpenSsh {
    async fn probe(&self, host: &str) -> Result<String, SshError> {
        let args = self.args(host);
        debug!(program = %self.program, ?args, "running ssh probe");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SshError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(status = %output.status, output = %combined, "ssh probe finished");
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_refused_before_success_marker() {
        let output = "ssh: connect to host 10.0.0.3 port 22: Connection refused\n";
        let status = SshStatus::classify(output);
        assert_eq!(status, SshStatus::Refused);
        assert!(!status.is_connected());
        assert_eq!(status.to_string(), "SSH connection refused");

        // A failure marker wins even when the marker string is also present.
        let mixed = format!("{}{}\n", output, PROBE_MARKER);
        assert_eq!(SshStatus::classify(&mixed), SshStatus::Refused);
    }

    #[test]
    fn classifies_known_failures() {
        let cases = [
            ("ssh: connect to host x port 22: Connection timed out", SshStatus::TimedOut),
            ("nagios@10.0.0.3: Permission denied (publickey).", SshStatus::AuthFailed),
            (
                "Warning: Identity file /nope not accessible: No such file or directory.",
                SshStatus::KeyInaccessible,
            ),
            ("ssh: Could not resolve hostname vm: Name or service not known", SshStatus::UnresolvedHost),
            ("ssh: connect to host x port 22: No route to host", SshStatus::NoRoute),
            ("Read from socket failed: Connection reset by peer", SshStatus::Reset),
            ("kex_exchange_identification: banner line contains invalid characters", SshStatus::Unknown),
        ];
        for (output, expected) in cases {
            assert_eq!(SshStatus::classify(output), expected, "output: {}", output);
        }
    }

    #[test]
    fn classifies_success() {
        let output = "Linux cirros 3.2.0-80-virtual x86_64 GNU/Linux\nnagios ssh check\n";
        assert_eq!(SshStatus::classify(output), SshStatus::Connected);
        assert_eq!(SshStatus::Connected.to_string(), "OK");
    }

    #[test]
    fn hardened_arguments() {
        let ssh = OpenSsh::new("ssh", "nagios", PathBuf::from("/home/nagios/.ssh/id_rsa"));
        let args = ssh.args("10.0.0.3");
        assert_eq!(
            args,
            vec![
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=10",
                "-l",
                "nagios",
                "-i",
                "/home/nagios/.ssh/id_rsa",
                "10.0.0.3",
                PROBE_COMMAND,
            ]
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let ssh = OpenSsh::new(
            "/nonexistent/oschecks-ssh",
            "nagios",
            PathBuf::from("/dev/null"),
        );
        let err = ssh.probe("127.0.0.1").await.unwrap_err();
        assert!(matches!(err, SshError::Spawn { .. }));
    }
}
