//! Layered configuration.
//!
//! Command line arguments (with their environment fallbacks) are overlaid on
//! top of an optional TOML file, then resolved into a validated configuration
//! with defaults applied.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod nova;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required option: {0}")]
    Missing(&'static str),

    #[error("{0}")]
    Validation(String),
}

/// Trait for merging two partial structs.
pub trait Overlay {
    /// self is the base layer, top is the top layer.
    fn overlay(self, top: Self) -> Self;
}

// If top layer exists, use it. Otherwise keep base.
impl<T> Overlay for Option<T> {
    fn overlay(self, top: Self) -> Self {
        top.or(self)
    }
}

/// Implements [`Overlay`] field by field for a struct of overlayable fields.
macro_rules! impl_overlay {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::config::Overlay for $ty {
            fn overlay(self, top: Self) -> Self {
                Self {
                    $($field: $crate::config::Overlay::overlay(self.$field, top.$field)),*
                }
            }
        }
    };
}

pub(crate) use impl_overlay;

/// Loads the optional file layer, overlays `cli` on it and resolves the result.
pub fn resolve<T, C>(config_path: Option<&Path>, cli: T) -> Result<C, ConfigError>
where
    T: Overlay + DeserializeOwned + Default + TryInto<C, Error = ConfigError>,
{
    let base = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<T>(&content)?
        }
        None => T::default(),
    };
    base.overlay(cli).try_into()
}

/// A phase timeout.
///
/// Unitless numbers are interpreted as seconds, otherwise humantime
/// strings like "2m" or "90s" are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(Duration);

impl Timeout {
    pub const fn from_secs(secs: u64) -> Self {
        Timeout(Duration::from_secs(secs))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl FromStr for Timeout {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(secs) = s.trim().parse::<u64>() {
            return Ok(Timeout::from_secs(secs));
        }
        Ok(Timeout(humantime::parse_duration(s)?))
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

impl From<Timeout> for Duration {
    fn from(val: Timeout) -> Self {
        val.0
    }
}

impl<'de> Deserialize<'de> for Timeout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Secs(u64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Secs(secs) => Ok(Timeout::from_secs(secs)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
