use crate::{
    compute::{ComputeError, endpoint::EndpointError},
    config::ConfigError,
    logging::LoggingError,
    pacemaker::PacemakerError,
    plugin::{PluginExit, Report, Status},
};
use thiserror::Error;

/// Errors that end a check before it can produce its own report.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Cannot connect to nova: {0}")]
    Connection(#[source] ComputeError),

    #[error("you must provide an endpoint_url in the form <scheme>://<url>/ ({0})")]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Pacemaker(#[from] PacemakerError),

    #[error("cannot determine local hostname: {0}")]
    Hostname(#[source] std::io::Error),
}

impl CheckError {
    pub fn status(&self) -> Status {
        match self {
            CheckError::Connection(_) => Status::Critical,
            CheckError::Endpoint(_) => Status::Unknown,
            CheckError::Config(_) => Status::Unknown,
            CheckError::Logging(_) => Status::Unknown,
            CheckError::Pacemaker(e) => match e {
                PacemakerError::StatusMissing(_) => Status::Critical,
                PacemakerError::StatusFailed { .. } => Status::Critical,
                PacemakerError::StatusIo { .. } => Status::Critical,
                PacemakerError::Delegate { .. } => Status::Unknown,
            },
            CheckError::Hostname(_) => Status::Unknown,
        }
    }
}

impl From<CheckError> for Report {
    fn from(err: CheckError) -> Self {
        Report::new(err.status(), err.to_string())
    }
}

impl From<CheckError> for PluginExit {
    fn from(err: CheckError) -> Self {
        tracing::debug!(error = ?err, "check aborted");
        PluginExit::Report(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_map_to_statuses() {
        let conn = CheckError::Connection(ComputeError::Unauthorized("bad token".into()));
        assert_eq!(conn.status(), Status::Critical);
        assert_eq!(
            conn.to_string(),
            "Cannot connect to nova: access denied: bad token"
        );

        let config = CheckError::from(ConfigError::Missing("auth-url (OS_AUTH_URL)"));
        assert_eq!(config.status(), Status::Unknown);

        let pcs = CheckError::from(PacemakerError::StatusMissing("pcs".into()));
        let report = Report::from(pcs);
        assert_eq!(report.to_string(), "CRITICAL - pcs not found");
    }
}
