//! Monitoring plugin contract.
//!
//! Nagios-family monitoring systems consume a single line of output and one of
//! four exit codes. A [`Report`] carries the status, the human readable text and
//! any performance data; [`PluginExit`] is what `main` returns so that the
//! process terminates with the right code.
use chrono::Utc;
use std::fmt;
use std::process::{ExitCode, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single plugin result line: `STATUS - text | perfdata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    status: Status,
    text: String,
    perfdata: Vec<String>,
}

impl Report {
    pub fn new(status: Status, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            perfdata: Vec::new(),
        }
    }

    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(Status::Ok, text)
    }

    pub fn critical(text: impl Into<String>) -> Self {
        Self::new(Status::Critical, text)
    }

    pub fn with_perfdata<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.perfdata.extend(metrics.into_iter().map(Into::into));
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn perfdata(&self) -> &[String] {
        &self.perfdata
    }

    /// Writes the report where the monitoring system expects it.
    ///
    /// Healthy results go to stdout. Failures go to stderr stamped with the
    /// current UTC time so that cached results can be told apart.
    pub fn emit(&self) {
        match self.status {
            Status::Ok | Status::Warning => println!("{}", self),
            Status::Critical | Status::Unknown => {
                eprintln!("{} (UTC: {})", self, Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"))
            }
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.status, self.text)?;
        if !self.perfdata.is_empty() {
            write!(f, " | {}", self.perfdata.join(" "))?;
        }
        Ok(())
    }
}

/// How the process ends.
#[derive(Debug)]
pub enum PluginExit {
    /// Print a report line and exit with its status code.
    Report(Report),
    /// Exit with a code produced elsewhere (a delegate, or clap's help output).
    Passthrough(u8),
}

impl From<Report> for PluginExit {
    fn from(report: Report) -> Self {
        PluginExit::Report(report)
    }
}

impl Termination for PluginExit {
    fn report(self) -> ExitCode {
        match self {
            PluginExit::Report(report) => {
                report.emit();
                ExitCode::from(report.status().code())
            }
            PluginExit::Passthrough(code) => ExitCode::from(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_plugin_contract() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Warning.code(), 1);
        assert_eq!(Status::Critical.code(), 2);
        assert_eq!(Status::Unknown.code(), 3);
    }

    #[test]
    fn report_without_perfdata() {
        let report = Report::critical("Cannot create the vm");
        assert_eq!(report.to_string(), "CRITICAL - Cannot create the vm");
    }

    #[test]
    fn report_with_perfdata() {
        let report = Report::ok("spawned in 3 seconds")
            .with_perfdata(["time=3", "undeleted_server_x_0=1700000000"]);
        assert_eq!(
            report.to_string(),
            "OK - spawned in 3 seconds | time=3 undeleted_server_x_0=1700000000"
        );
    }
}
