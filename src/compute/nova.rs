use super::auth::{self, CatalogFilter, Credentials};
use super::{ComputeApi, ComputeError, CreateServer, Flavor, Image, Server, find_unique};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

const MICROVERSION_HEADER: &str = "X-OpenStack-Nova-API-Version";

/// Requested compute API version.
///
/// `2.N` values are sent as a microversion header; `2`, `1.1` and other
/// legacy values only select the catalog endpoint and send no header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion(String);

impl ApiVersion {
    pub fn microversion(&self) -> Option<&str> {
        let (major, minor) = self.0.split_once('.')?;
        match (major.parse::<u32>(), minor.parse::<u32>()) {
            (Ok(2), Ok(minor)) if minor >= 1 => Some(&self.0),
            _ => None,
        }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        ApiVersion("2".to_string())
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.split('.').count() <= 2
            && s.split('.').all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        if valid {
            Ok(ApiVersion(s.to_string()))
        } else {
            Err(format!("invalid api version '{}'", s))
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Int(u32),
            Float(f64),
        }
        let raw = match Repr::deserialize(deserializer)? {
            Repr::Str(s) => s,
            Repr::Int(i) => i.to_string(),
            Repr::Float(f) => f.to_string(),
        };
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Options for building a [`NovaClient`].
#[derive(Debug, Clone)]
pub struct NovaOptions {
    pub credentials: Credentials,
    pub catalog: CatalogFilter,
    pub api_version: ApiVersion,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct ServersEnvelope {
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct ImagesEnvelope {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct FlavorsEnvelope {
    flavors: Vec<Flavor>,
}

/// Compute API client authenticated against the identity service.
#[derive(Debug)]
pub struct NovaClient {
    http: Client,
    token: SecretString,
    management_url: Url,
    api_version: ApiVersion,
}

impl NovaClient {
    /// Authenticates and resolves the compute endpoint from the catalog.
    ///
    /// No compute API call is made; use [`ComputeApi::limits`] to validate
    /// connectivity.
    pub async fn connect(opts: NovaOptions) -> Result<Self, ComputeError> {
        let http = Client::builder().timeout(opts.request_timeout).build()?;
        let session = auth::authenticate(&http, &opts.credentials, &opts.catalog).await?;
        debug!(url = %session.compute_url, "compute endpoint from catalog");
        Ok(Self::with_token(
            http,
            session.token,
            session.compute_url,
            opts.api_version,
        ))
    }

    /// Builds a client from an existing token and endpoint.
    pub fn with_token(
        http: Client,
        token: SecretString,
        management_url: Url,
        api_version: ApiVersion,
    ) -> Self {
        Self {
            http,
            token,
            management_url,
            api_version,
        }
    }

    pub fn management_url(&self) -> &Url {
        &self.management_url
    }

    pub fn set_management_url(&mut self, url: Url) {
        debug!(%url, "compute endpoint overridden");
        self.management_url = url;
    }

    fn url(&self, path: &str) -> Result<Url, ComputeError> {
        let mut url = self.management_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ComputeError::Catalog(format!(
                    "compute endpoint '{}' cannot be a base url",
                    self.management_url
                ))
            })?
            .pop_if_empty()
            .extend(path.split('/'));
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ComputeError> {
        let url = self.url(path)?;
        debug!(%method, %url, "compute request");
        let mut req = self
            .http
            .request(method, url)
            .header("X-Auth-Token", self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(version) = self.api_version.microversion() {
            req = req.header(MICROVERSION_HEADER, version);
        }
        Ok(req)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ComputeError> {
        let resp = req.send().await?;
        let status = resp.status();
        debug!(%status, "compute response");
        if status.is_success() {
            return Ok(resp);
        }
        let message = error_message(resp).await;
        Err(match status {
            StatusCode::NOT_FOUND => ComputeError::NotFound(format!("{} (HTTP 404)", message)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ComputeError::Unauthorized(message)
            }
            _ => ComputeError::Api { status, message },
        })
    }
}

/// Extracts the fault message from an error response body.
///
/// OpenStack services wrap faults as `{"<faultName>": {"message": ...}}`;
/// identity uses `{"error": {"message": ...}}`. Falls back to the status text.
pub(crate) async fn error_message(resp: Response) -> String {
    let status = resp.status();
    let body: Option<Value> = resp.json().await.ok();
    body.as_ref()
        .and_then(Value::as_object)
        .and_then(|obj| obj.values().find_map(|v| v.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

#[async_trait]
impl ComputeApi for NovaClient {
    async fn limits(&self) -> Result<(), ComputeError> {
        self.send(self.request(Method::GET, "limits")?).await?;
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<Server>, ComputeError> {
        let resp = self.send(self.request(Method::GET, "servers/detail")?).await?;
        let body: ServersEnvelope = resp.json().await?;
        Ok(body.servers)
    }

    async fn find_image(&self, name: &str) -> Result<Image, ComputeError> {
        let resp = self.send(self.request(Method::GET, "images/detail")?).await?;
        let body: ImagesEnvelope = resp.json().await?;
        find_unique("Image", name, body.images, |i| i.name.as_str())
    }

    async fn find_flavor(&self, name: &str) -> Result<Flavor, ComputeError> {
        let resp = self.send(self.request(Method::GET, "flavors/detail")?).await?;
        let body: FlavorsEnvelope = resp.json().await?;
        find_unique("Flavor", name, body.flavors, |f| f.name.as_str())
    }

    async fn create_server(&self, request: CreateServer<'_>) -> Result<Server, ComputeError> {
        let body = json!({
            "server": {
                "name": request.name,
                "imageRef": request.image.id,
                "flavorRef": request.flavor.id,
                "key_name": request.key_name,
            }
        });
        let req = self.request(Method::POST, "servers")?.json(&body);
        let resp = self.send(req).await?;
        let mut server = resp.json::<ServerEnvelope>().await?.server;
        // The create response only carries the id and links.
        if server.name.is_empty() {
            server.name = request.name.to_string();
        }
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> Result<Server, ComputeError> {
        let path = format!("servers/{}", id);
        let resp = self.send(self.request(Method::GET, &path)?).await?;
        Ok(resp.json::<ServerEnvelope>().await?.server)
    }

    async fn delete_server(&self, id: &str) -> Result<(), ComputeError> {
        let path = format!("servers/{}", id);
        self.send(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microversion_only_for_minor_versions() {
        assert_eq!(ApiVersion::default().microversion(), None);
        assert_eq!("1.1".parse::<ApiVersion>().unwrap().microversion(), None);
        assert_eq!("2.1".parse::<ApiVersion>().unwrap().microversion(), Some("2.1"));
        assert_eq!(
            "2.37".parse::<ApiVersion>().unwrap().microversion(),
            Some("2.37")
        );
        assert!("two".parse::<ApiVersion>().is_err());
        assert!("2.".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn api_version_from_toml_number_or_string() {
        #[derive(Deserialize)]
        struct Cfg {
            a: ApiVersion,
            b: ApiVersion,
            c: ApiVersion,
        }
        let cfg: Cfg = toml::from_str("a = 2\nb = \"2.37\"\nc = 1.1\n").unwrap();
        assert_eq!(cfg.a.to_string(), "2");
        assert_eq!(cfg.b.to_string(), "2.37");
        assert_eq!(cfg.c.to_string(), "1.1");
    }

    #[test]
    fn paths_append_to_management_url() {
        let client = NovaClient::with_token(
            Client::new(),
            SecretString::new("t".to_owned().into()),
            Url::parse("http://nova:8774/v2/tenant/").unwrap(),
            ApiVersion::default(),
        );
        assert_eq!(
            client.url("servers/detail").unwrap().as_str(),
            "http://nova:8774/v2/tenant/servers/detail"
        );
    }
}
