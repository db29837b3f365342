//! Identity service password authentication.
//!
//! Supports the v2.0 `tokens` and v3 `auth/tokens` flows. The version is
//! picked from the auth URL path: a path ending in `v3` uses v3, anything else
//! uses v2.0. Both flows return a token and the compute endpoint selected from
//! the service catalog.
use super::ComputeError;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tracing::debug;
use url::Url;

const COMPUTE_SERVICE: &str = "compute";

/// Which catalog endpoint to use for a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointType {
    #[default]
    Public,
    Internal,
    Admin,
}

impl EndpointType {
    /// Interface name used by the v3 catalog.
    fn interface(self) -> &'static str {
        match self {
            EndpointType::Public => "public",
            EndpointType::Internal => "internal",
            EndpointType::Admin => "admin",
        }
    }
}

impl FromStr for EndpointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publicURL" | "public" => Ok(EndpointType::Public),
            "internalURL" | "internal" => Ok(EndpointType::Internal),
            "adminURL" | "admin" => Ok(EndpointType::Admin),
            other => Err(format!(
                "unknown endpoint type '{}' (expected publicURL, internalURL or adminURL)",
                other
            )),
        }
    }
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}URL", self.interface())
    }
}

impl<'de> Deserialize<'de> for EndpointType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Password credentials for the identity service.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub auth_url: Url,
    pub username: String,
    pub password: SecretString,
    pub tenant: String,
    /// Domain names are only sent to v3 endpoints.
    pub user_domain: String,
    pub project_domain: String,
}

/// Which compute endpoint to pick from the catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub endpoint_type: EndpointType,
    pub region: Option<String>,
}

/// Authenticated identity: a token and the catalog's compute endpoint.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SecretString,
    pub compute_url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentityVersion {
    V2,
    V3,
}

impl IdentityVersion {
    fn detect(auth_url: &Url) -> Self {
        let path = auth_url.path().trim_end_matches('/');
        if path.ends_with("/v3") {
            IdentityVersion::V3
        } else {
            IdentityVersion::V2
        }
    }

    fn token_url(self, auth_url: &Url) -> Result<Url, ComputeError> {
        let mut base = auth_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let relative = match self {
            IdentityVersion::V3 => "auth/tokens",
            IdentityVersion::V2 if base.path().trim_end_matches('/').ends_with("/v2.0") => {
                "tokens"
            }
            IdentityVersion::V2 => "v2.0/tokens",
        };
        Ok(base.join(relative)?)
    }
}

#[derive(Debug, Deserialize)]
struct V2Response {
    access: V2Access,
}

#[derive(Debug, Deserialize)]
struct V2Access {
    token: V2Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2Service>,
}

#[derive(Debug, Deserialize)]
struct V2Token {
    id: SecretString,
}

#[derive(Debug, Deserialize)]
struct V2Service {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Debug, Deserialize)]
struct V2Endpoint {
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: Option<String>,
    #[serde(rename = "internalURL")]
    internal_url: Option<String>,
    #[serde(rename = "adminURL")]
    admin_url: Option<String>,
}

impl V2Endpoint {
    fn url(&self, kind: EndpointType) -> Option<&str> {
        match kind {
            EndpointType::Public => self.public_url.as_deref(),
            EndpointType::Internal => self.internal_url.as_deref(),
            EndpointType::Admin => self.admin_url.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct V3Response {
    token: V3Token,
}

#[derive(Debug, Deserialize)]
struct V3Token {
    #[serde(default)]
    catalog: Vec<V3Service>,
}

#[derive(Debug, Deserialize)]
struct V3Service {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Debug, Deserialize)]
struct V3Endpoint {
    interface: String,
    region: Option<String>,
    region_id: Option<String>,
    url: String,
}

impl V3Endpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
    }
}

/// Authenticates against the identity service and resolves the compute endpoint.
pub async fn authenticate(
    client: &Client,
    creds: &Credentials,
    filter: &CatalogFilter,
) -> Result<Session, ComputeError> {
    let version = IdentityVersion::detect(&creds.auth_url);
    let url = version.token_url(&creds.auth_url)?;
    debug!(%url, ?version, "requesting identity token");

    let body = match version {
        IdentityVersion::V2 => json!({
            "auth": {
                "passwordCredentials": {
                    "username": creds.username,
                    "password": creds.password.expose_secret(),
                },
                "tenantName": creds.tenant,
            }
        }),
        IdentityVersion::V3 => json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": creds.username,
                            "domain": { "name": creds.user_domain },
                            "password": creds.password.expose_secret(),
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": creds.tenant,
                        "domain": { "name": creds.project_domain },
                    }
                }
            }
        }),
    };

    let resp = client.post(url).json(&body).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let message = super::nova::error_message(resp).await;
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ComputeError::Unauthorized(message)
            }
            _ => ComputeError::Api { status, message },
        });
    }

    match version {
        IdentityVersion::V2 => {
            let parsed: V2Response = resp.json().await?;
            let compute_url = select_v2(&parsed.access.service_catalog, filter)?;
            Ok(Session {
                token: parsed.access.token.id,
                compute_url,
            })
        }
        IdentityVersion::V3 => {
            let token = resp
                .headers()
                .get("X-Subject-Token")
                .and_then(|v| v.to_str().ok())
                .map(|v| SecretString::new(v.to_owned().into()))
                .ok_or_else(|| {
                    ComputeError::Unauthorized("identity response has no X-Subject-Token".into())
                })?;
            let parsed: V3Response = resp.json().await?;
            let compute_url = select_v3(&parsed.token.catalog, filter)?;
            Ok(Session { token, compute_url })
        }
    }
}

fn select_v2(catalog: &[V2Service], filter: &CatalogFilter) -> Result<Url, ComputeError> {
    let raw = catalog
        .iter()
        .filter(|s| s.kind == COMPUTE_SERVICE)
        .flat_map(|s| s.endpoints.iter())
        .filter(|e| match &filter.region {
            Some(region) => e.region.as_deref() == Some(region.as_str()),
            None => true,
        })
        .find_map(|e| e.url(filter.endpoint_type))
        .ok_or_else(|| no_endpoint(filter))?;
    Ok(Url::parse(raw)?)
}

fn select_v3(catalog: &[V3Service], filter: &CatalogFilter) -> Result<Url, ComputeError> {
    let interface = filter.endpoint_type.interface();
    let raw = catalog
        .iter()
        .filter(|s| s.kind == COMPUTE_SERVICE)
        .flat_map(|s| s.endpoints.iter())
        .filter(|e| e.interface == interface)
        .find(|e| match &filter.region {
            Some(region) => e.in_region(region),
            None => true,
        })
        .map(|e| e.url.as_str())
        .ok_or_else(|| no_endpoint(filter))?;
    Ok(Url::parse(raw)?)
}

fn no_endpoint(filter: &CatalogFilter) -> ComputeError {
    match &filter.region {
        Some(region) => ComputeError::Catalog(format!(
            "no {} compute endpoint in region '{}'",
            filter.endpoint_type, region
        )),
        None => ComputeError::Catalog(format!("no {} compute endpoint", filter.endpoint_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_type_accepts_catalog_spellings() {
        assert_eq!("publicURL".parse::<EndpointType>(), Ok(EndpointType::Public));
        assert_eq!("internal".parse::<EndpointType>(), Ok(EndpointType::Internal));
        assert_eq!("adminURL".parse::<EndpointType>(), Ok(EndpointType::Admin));
        assert!("private".parse::<EndpointType>().is_err());
        assert_eq!(EndpointType::Internal.to_string(), "internalURL");
    }

    #[test]
    fn identity_version_from_path() {
        let v3 = Url::parse("http://keystone:5000/v3/").unwrap();
        let v2 = Url::parse("http://keystone:5000/v2.0").unwrap();
        let bare = Url::parse("http://keystone:5000").unwrap();

        assert_eq!(IdentityVersion::detect(&v3), IdentityVersion::V3);
        assert_eq!(IdentityVersion::detect(&v2), IdentityVersion::V2);
        assert_eq!(IdentityVersion::detect(&bare), IdentityVersion::V2);

        assert_eq!(
            IdentityVersion::V3.token_url(&v3).unwrap().as_str(),
            "http://keystone:5000/v3/auth/tokens"
        );
        assert_eq!(
            IdentityVersion::V2.token_url(&v2).unwrap().as_str(),
            "http://keystone:5000/v2.0/tokens"
        );
        assert_eq!(
            IdentityVersion::V2.token_url(&bare).unwrap().as_str(),
            "http://keystone:5000/v2.0/tokens"
        );
    }

    #[test]
    fn v2_catalog_selection_honours_type_and_region() {
        let catalog: Vec<V2Service> = serde_json::from_str(
            r#"[
                {"type": "image", "endpoints": [{"region": "r1", "publicURL": "http://glance:9292"}]},
                {"type": "compute", "endpoints": [
                    {"region": "r1", "publicURL": "http://nova-r1:8774/v2/t", "internalURL": "http://int-r1:8774/v2/t"},
                    {"region": "r2", "publicURL": "http://nova-r2:8774/v2/t"}
                ]}
            ]"#,
        )
        .unwrap();

        let default = select_v2(&catalog, &CatalogFilter::default()).unwrap();
        assert_eq!(default.as_str(), "http://nova-r1:8774/v2/t");

        let internal = CatalogFilter {
            endpoint_type: EndpointType::Internal,
            region: None,
        };
        assert_eq!(
            select_v2(&catalog, &internal).unwrap().as_str(),
            "http://int-r1:8774/v2/t"
        );

        let r2 = CatalogFilter {
            endpoint_type: EndpointType::Public,
            region: Some("r2".into()),
        };
        assert_eq!(select_v2(&catalog, &r2).unwrap().as_str(), "http://nova-r2:8774/v2/t");

        let r2_admin = CatalogFilter {
            endpoint_type: EndpointType::Admin,
            region: Some("r2".into()),
        };
        assert!(matches!(
            select_v2(&catalog, &r2_admin),
            Err(ComputeError::Catalog(_))
        ));
    }

    #[test]
    fn v3_catalog_selection_by_interface() {
        let catalog: Vec<V3Service> = serde_json::from_str(
            r#"[
                {"type": "compute", "endpoints": [
                    {"interface": "admin", "region_id": "RegionOne", "url": "http://admin:8774/v2.1"},
                    {"interface": "public", "region_id": "RegionOne", "url": "http://public:8774/v2.1"}
                ]}
            ]"#,
        )
        .unwrap();

        let filter = CatalogFilter {
            endpoint_type: EndpointType::Public,
            region: Some("RegionOne".into()),
        };
        assert_eq!(
            select_v3(&catalog, &filter).unwrap().as_str(),
            "http://public:8774/v2.1"
        );
    }
}
