//! Local host identity.
use std::io;
use tokio::process::Command;
use tracing::debug;

/// The kernel hostname of this machine.
pub fn hostname() -> io::Result<String> {
    let name = nix::unistd::gethostname()?;
    name.into_string()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not valid UTF-8"))
}

/// Fully qualified hostname, as `hostname -f` reports it.
///
/// Falls back to the kernel hostname when `hostname -f` is unavailable or
/// prints nothing.
pub async fn fqdn() -> io::Result<String> {
    match Command::new("hostname").arg("-f").output().await {
        Ok(out) if out.status.success() => {
            let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !name.is_empty() {
                return Ok(name);
            }
        }
        Ok(out) => debug!(status = %out.status, "hostname -f failed"),
        Err(e) => debug!(error = %e, "hostname -f unavailable"),
    }
    hostname()
}

/// The first label of a hostname.
pub fn short(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(short("ctrl01.example.com"), "ctrl01");
        assert_eq!(short("ctrl01"), "ctrl01");
        assert_eq!(short(""), "");
    }

    #[test]
    fn kernel_hostname_is_not_empty() {
        assert!(!hostname().unwrap().is_empty());
    }
}
