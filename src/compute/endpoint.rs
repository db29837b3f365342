//! Catalog endpoint override.
//!
//! An override replaces only the network location of the catalog endpoint:
//! scheme and host come from the override, the port from the override or the
//! catalog (falling back to the compute API default), and the API path, query
//! and fragment always come from the catalog.
use thiserror::Error;
use url::Url;

/// Port used when neither the override nor the catalog names one.
pub const DEFAULT_COMPUTE_PORT: u16 = 8774;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("'{0}' has no host")]
    MissingHost(String),
}

/// Merges the network location of `endpoint` into `catalog`.
pub fn merge(endpoint: &str, catalog: &Url) -> Result<Url, EndpointError> {
    let over = Url::parse(endpoint)?;
    let host = over
        .host()
        .ok_or_else(|| EndpointError::MissingHost(endpoint.to_string()))?;
    let explicit = if names_port(endpoint) {
        over.port_or_known_default()
    } else {
        None
    };
    let port = explicit
        .or_else(|| catalog.port())
        .unwrap_or(DEFAULT_COMPUTE_PORT);

    let mut merged = Url::parse(&format!(
        "{}://{}:{}{}",
        over.scheme(),
        host,
        port,
        catalog.path()
    ))?;
    merged.set_query(catalog.query());
    merged.set_fragment(catalog.fragment());
    Ok(merged)
}

/// Whether the authority of `endpoint` spells out a port.
///
/// `Url::port` hides ports equal to the scheme default, but `http://lb:80/`
/// still means port 80 rather than the catalog's.
fn names_port(endpoint: &str) -> bool {
    let Some((_, rest)) = endpoint.split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    after_host
        .split_once(':')
        .is_some_and(|(_, port)| !port.is_empty())
}
