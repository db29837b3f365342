use super::{ConfigError, Timeout, impl_overlay};
use crate::compute::auth::CatalogFilter;
use crate::compute::nova::NovaOptions;
use crate::compute::{ApiVersion, Credentials, EndpointType};
use crate::lifecycle::{LifecycleOptions, SshProbe};
use crate::logging::{Logger, LoggerArgs};
use clap::Args;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_IMAGE: &str = "cirros";
pub const DEFAULT_FLAVOR: &str = "m1.tiny";
pub const DEFAULT_INSTANCE: &str = "monitoring_test";
pub const DEFAULT_DOMAIN: &str = "Default";
pub const DEFAULT_KEYPAIR: &str = "nagios";
pub const DEFAULT_SSH_USER: &str = "nagios";
pub const DEFAULT_SSH_KEY_FILE: &str = "/home/nagios/.ssh/id_rsa";
pub const DEFAULT_TIMEOUT: Timeout = Timeout::from_secs(120);
pub const DEFAULT_DELETE_TIMEOUT: Timeout = Timeout::from_secs(45);
pub const DEFAULT_SSH_TIMEOUT: Timeout = Timeout::from_secs(45);
pub const DEFAULT_HTTP_TIMEOUT: Timeout = Timeout::from_secs(30);

/// Resolved configuration of the instance lifecycle check.
#[derive(Debug, Clone)]
pub struct NovaConfig {
    pub client: NovaOptions,
    pub endpoint_url: Option<String>,
    pub instance_name: String,
    pub image_name: String,
    pub flavor_name: String,
    pub keypair_name: String,
    pub force_delete: bool,
    pub timeout: Timeout,
    pub delete_timeout: Timeout,
    pub ssh: Option<SshConfig>,
    pub hostname: Option<String>,
    pub logger: Logger,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub program: String,
    pub user: String,
    pub key_file: PathBuf,
    pub timeout: Timeout,
}

impl NovaConfig {
    /// Lifecycle options for the instance named `instance_name`.
    pub fn lifecycle(&self, instance_name: String) -> LifecycleOptions {
        LifecycleOptions {
            instance_name,
            image_name: self.image_name.clone(),
            flavor_name: self.flavor_name.clone(),
            keypair_name: self.keypair_name.clone(),
            force_delete: self.force_delete,
            timeout: self.timeout.into(),
            delete_timeout: self.delete_timeout.into(),
            ssh: self.ssh.as_ref().map(|s| SshProbe {
                timeout: s.timeout.into(),
            }),
        }
    }
}

#[derive(Args, Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NovaArgs {
    /// Path to a TOML configuration file. Command line values take precedence.
    #[arg(long, env = "OSCHECKS_CONFIG")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Identity service URL
    #[arg(long, env = "OS_AUTH_URL", alias = "auth_url")]
    pub auth_url: Option<Url>,

    /// Username to use for authentication
    #[arg(long, env = "OS_USERNAME")]
    pub username: Option<String>,

    /// Password to use for authentication
    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    pub password: Option<SecretString>,

    /// Tenant (project) name to use for authentication
    #[arg(long, env = "OS_TENANT_NAME", alias = "project")]
    pub tenant: Option<String>,

    /// Region to select the compute endpoint from
    #[arg(long, env = "OS_REGION_NAME", alias = "region_name")]
    pub region_name: Option<String>,

    /// User domain name (identity v3 only)
    #[arg(long, env = "OS_USER_DOMAIN_NAME", alias = "user_domain")]
    pub user_domain: Option<String>,

    /// Project domain name (identity v3 only)
    #[arg(long, env = "OS_PROJECT_DOMAIN_NAME", alias = "project_domain")]
    pub project_domain: Option<String>,

    /// Override the catalog endpoint, in the form <scheme>://<host>[:port]/.
    ///
    /// Only the network location is replaced; the API path still comes from
    /// the catalog.
    #[arg(long, alias = "endpoint_url")]
    pub endpoint_url: Option<String>,

    /// Endpoint type to use from the catalog when not overriding
    #[arg(long, alias = "endpoint_type")]
    pub endpoint_type: Option<EndpointType>,

    /// Image name to boot
    #[arg(long, alias = "image_name")]
    pub image_name: Option<String>,

    /// Flavor name to boot
    #[arg(long, alias = "flavor_name")]
    pub flavor_name: Option<String>,

    /// Base name of the test instance. The local hostname is appended.
    #[arg(long, alias = "instance_name")]
    pub instance_name: Option<String>,

    /// Delete leftover instances with the test name and report them as a
    /// notification instead of failing.
    #[arg(
        long,
        alias = "force_delete",
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true,
    )]
    pub force_delete: Option<bool>,

    /// Compute API version. `2.N` is sent as a microversion.
    #[arg(long, alias = "api_version")]
    pub api_version: Option<ApiVersion>,

    /// Max time to create or delete the test instance.
    ///
    /// Unitless numbers are interpreted as seconds.
    #[arg(long)]
    pub timeout: Option<Timeout>,

    /// Max time to delete each leftover instance
    #[arg(long, alias = "timeout_delete")]
    pub timeout_delete: Option<Timeout>,

    /// Max time for a single API request
    #[arg(long)]
    pub http_timeout: Option<Timeout>,

    /// Check that the instance accepts ssh logins
    #[arg(
        long,
        alias = "check_ssh",
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true,
    )]
    pub check_ssh: Option<bool>,

    /// Max time to wait for a successful ssh login
    #[arg(long, alias = "timeout_ssh")]
    pub timeout_ssh: Option<Timeout>,

    /// Name of the ssh keypair registered in the compute service
    #[arg(long, alias = "ssh_keypair_name")]
    pub ssh_keypair_name: Option<String>,

    /// Private key used for ssh attempts
    #[arg(long, alias = "ssh_keypair_file")]
    pub ssh_keypair_file: Option<PathBuf>,

    /// Username used for ssh attempts
    #[arg(long, alias = "ssh_keypair_user")]
    pub ssh_keypair_user: Option<String>,

    /// ssh client binary
    #[arg(long)]
    pub ssh_command: Option<String>,

    /// Hostname appended to the instance name. Defaults to the local FQDN.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Logging configuration
    #[command(flatten)]
    #[serde(flatten)]
    pub logger: LoggerArgs,
}

impl_overlay!(NovaArgs {
    config,
    auth_url,
    username,
    password,
    tenant,
    region_name,
    user_domain,
    project_domain,
    endpoint_url,
    endpoint_type,
    image_name,
    flavor_name,
    instance_name,
    force_delete,
    api_version,
    timeout,
    timeout_delete,
    http_timeout,
    check_ssh,
    timeout_ssh,
    ssh_keypair_name,
    ssh_keypair_file,
    ssh_keypair_user,
    ssh_command,
    hostname,
    logger,
});

impl NovaArgs {
    /// Merges the configuration file (if any) under these arguments.
    pub fn load(self) -> Result<NovaConfig, ConfigError> {
        let path = self.config.clone();
        super::resolve(path.as_deref(), self)
    }
}

impl TryFrom<NovaArgs> for NovaConfig {
    type Error = ConfigError;

    fn try_from(args: NovaArgs) -> Result<Self, Self::Error> {
        let credentials = Credentials {
            auth_url: args.auth_url.ok_or(ConfigError::Missing("auth-url (OS_AUTH_URL)"))?,
            username: args.username.ok_or(ConfigError::Missing("username (OS_USERNAME)"))?,
            password: args.password.ok_or(ConfigError::Missing("password (OS_PASSWORD)"))?,
            tenant: args.tenant.ok_or(ConfigError::Missing("tenant (OS_TENANT_NAME)"))?,
            user_domain: args.user_domain.unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            project_domain: args
                .project_domain
                .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
        };

        let instance_name = args
            .instance_name
            .unwrap_or_else(|| DEFAULT_INSTANCE.to_string());
        if instance_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "instance name must not be empty".into(),
            ));
        }

        let ssh = args.check_ssh.unwrap_or(false).then(|| SshConfig {
            program: args.ssh_command.unwrap_or_else(|| "ssh".to_string()),
            user: args
                .ssh_keypair_user
                .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            key_file: args
                .ssh_keypair_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SSH_KEY_FILE)),
            timeout: args.timeout_ssh.unwrap_or(DEFAULT_SSH_TIMEOUT),
        });

        Ok(Self {
            client: NovaOptions {
                credentials,
                catalog: CatalogFilter {
                    endpoint_type: args.endpoint_type.unwrap_or_default(),
                    region: args.region_name,
                },
                api_version: args.api_version.unwrap_or_default(),
                request_timeout: args.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT).into(),
            },
            endpoint_url: args.endpoint_url,
            instance_name,
            image_name: args.image_name.unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            flavor_name: args
                .flavor_name
                .unwrap_or_else(|| DEFAULT_FLAVOR.to_string()),
            keypair_name: args
                .ssh_keypair_name
                .unwrap_or_else(|| DEFAULT_KEYPAIR.to_string()),
            force_delete: args.force_delete.unwrap_or(false),
            timeout: args.timeout.unwrap_or(DEFAULT_TIMEOUT),
            delete_timeout: args.timeout_delete.unwrap_or(DEFAULT_DELETE_TIMEOUT),
            ssh,
            hostname: args.hostname,
            logger: args.logger.into(),
        })
    }
}
