//! Compute API abstractions.
//!
//! This module defines the [`ComputeApi`] trait, the narrow set of compute
//! service calls the instance lifecycle check consumes, together with the
//! resource types those calls return.
//!
//! The reqwest backed implementation lives in [`nova`]; identity service
//! authentication in [`auth`]; endpoint override handling in [`endpoint`].
use async_trait::async_trait;
use chrono::DateTime;
use indexmap::IndexMap;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub mod auth;
pub mod endpoint;
pub mod nova;

pub use auth::{Credentials, EndpointType};
pub use nova::{ApiVersion, NovaClient};

#[derive(Debug, Error)]
pub enum ComputeError {
    /// The requested resource does not exist (HTTP 404 or empty lookup).
    #[error("{0}")]
    NotFound(String),

    /// More than one resource matched a name lookup.
    #[error("{0}")]
    Ambiguous(String),

    /// Authentication/Authorization failures
    #[error("access denied: {0}")]
    Unauthorized(String),

    /// Any other non-success API response
    #[error("{message} (HTTP {status})")]
    Api { status: StatusCode, message: String },

    /// Network or decoding errors from the HTTP client
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The service catalog has no usable compute endpoint
    #[error("service catalog: {0}")]
    Catalog(String),

    /// URL parse error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

impl ComputeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ComputeError::NotFound(_))
    }
}

/// A compute instance as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created: Option<String>,
    /// Network name to addresses, in the order the API lists them.
    #[serde(default)]
    pub addresses: IndexMap<String, Vec<Address>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Address {
    pub addr: String,
}

impl Server {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }

    /// First address of the first network the instance is attached to.
    pub fn first_address(&self) -> Option<&str> {
        self.addresses
            .values()
            .next()
            .and_then(|addrs| addrs.first())
            .map(|a| a.addr.as_str())
    }

    /// Creation time as unix seconds, or 0 when absent or unparsable.
    pub fn created_epoch(&self) -> i64 {
        self.created
            .as_deref()
            .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0)
    }

    pub fn created_display(&self) -> &str {
        self.created.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Flavor {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Parameters of an instance creation request.
#[derive(Debug, Clone, Copy)]
pub struct CreateServer<'a> {
    pub name: &'a str,
    pub image: &'a Image,
    pub flavor: &'a Flavor,
    pub key_name: &'a str,
}

/// The compute service operations used by the lifecycle check.
///
/// `get_server` and `delete_server` must return [`ComputeError::NotFound`]
/// when the instance no longer exists; the lifecycle check relies on that
/// signal to confirm deletion.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Lightweight call used to validate connectivity and credentials.
    async fn limits(&self) -> Result<(), ComputeError>;

    async fn list_servers(&self) -> Result<Vec<Server>, ComputeError>;

    /// Resolves exactly one image by name.
    async fn find_image(&self, name: &str) -> Result<Image, ComputeError>;

    /// Resolves exactly one flavor by name.
    async fn find_flavor(&self, name: &str) -> Result<Flavor, ComputeError>;

    async fn create_server(&self, request: CreateServer<'_>) -> Result<Server, ComputeError>;

    async fn get_server(&self, id: &str) -> Result<Server, ComputeError>;

    async fn delete_server(&self, id: &str) -> Result<(), ComputeError>;
}

/// Picks the single element named `name`, the way name lookups behave in the
/// compute API clients: no match is not found, several matches are ambiguous.
pub(crate) fn find_unique<T>(
    kind: &str,
    name: &str,
    items: Vec<T>,
    name_of: impl Fn(&T) -> &str,
) -> Result<T, ComputeError> {
    let mut matches: Vec<T> = items.into_iter().filter(|i| name_of(i) == name).collect();
    match matches.len() {
        0 => Err(ComputeError::NotFound(format!(
            "No {} matching {{'name': '{}'}}.",
            kind, name
        ))),
        1 => Ok(matches.remove(0)),
        n => Err(ComputeError::Ambiguous(format!(
            "Multiple {} matches found for {{'name': '{}'}} ({} results).",
            kind, name, n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_json(body: &str) -> Server {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn first_address_follows_network_order() {
        let server = server_json(
            r#"{
                "id": "abc",
                "name": "monitoring_test_host",
                "status": "ACTIVE",
                "addresses": {
                    "zeta": [{"addr": "10.0.0.5", "version": 4}],
                    "alpha": [{"addr": "192.168.1.9", "version": 4}]
                }
            }"#,
        );
        assert!(server.is_active());
        assert_eq!(server.first_address(), Some("10.0.0.5"));
    }

    #[test]
    fn server_without_addresses() {
        let server = server_json(r#"{"id": "abc"}"#);
        assert_eq!(server.first_address(), None);
        assert!(!server.is_active());
        assert_eq!(server.created_epoch(), 0);
    }

    #[test]
    fn created_epoch_parses_rfc3339() {
        let server = server_json(r#"{"id": "abc", "created": "2014-01-01T00:00:00Z"}"#);
        assert_eq!(server.created_epoch(), 1_388_534_400);
    }

    #[test]
    fn find_unique_reports_missing_and_ambiguous() {
        let names = vec!["cirros".to_string(), "ubuntu".into(), "ubuntu".into()];

        let found = find_unique("Image", "cirros", names.clone(), |s| s.as_str()).unwrap();
        assert_eq!(found, "cirros");

        let missing = find_unique("Image", "fedora", names.clone(), |s| s.as_str());
        assert!(matches!(missing, Err(ComputeError::NotFound(_))));

        let ambiguous = find_unique("Image", "ubuntu", names, |s| s.as_str());
        assert!(matches!(ambiguous, Err(ComputeError::Ambiguous(_))));
    }
}
