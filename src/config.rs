//! Process configuration.
//!
//! [`Settings`] are layered with `figment`, later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`Settings::default`]).
//! 2. A TOML file — the path in `GREETING_CONFIG`, else `greeting.toml` in the
//!    working directory. A missing file is skipped.
//! 3. `ConnectionStrings__RedisConnection`, the variable managed hosting
//!    platforms inject for a named connection string.
//! 4. `GREETING_*` environment variables, nested keys split on `__`
//!    (e.g. `GREETING_CACHE__INSTANCE_NAME`).

use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the TOML settings file.
pub const CONFIG_PATH_ENV: &str = "GREETING_CONFIG";

/// Settings file read when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "greeting.toml";

const ENV_PREFIX: &str = "GREETING_";
const CONNECTION_STRING_ENV: &str = "ConnectionStrings__RedisConnection";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Extract(#[from] figment::Error),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on.
    pub listen_addr: String,
    /// Path of the greeting endpoint.
    pub route: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7071".to_owned(),
            route: "/api/httpget".to_owned(),
        }
    }
}

/// Which [`DistributedCache`](crate::cache::DistributedCache) backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Redis URL or StackExchange-style connection string.
    pub connection_string: String,
    /// Prefix applied to every key stored in Redis.
    pub instance_name: String,
    /// Upper bound on connecting and on each cache round-trip.
    pub operation_timeout_ms: u64,
}

impl CacheSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            connection_string: "redis://127.0.0.1:6379".to_owned(),
            instance_name: "contentapiCache".to_owned(),
            operation_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

impl Settings {
    /// Loads and validates settings from every source.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Extract`] when a source is malformed or a value has the
    /// wrong type; [`ConfigError::Invalid`] when a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Self = Self::figment().extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The layered provider stack behind [`Settings::load`].
    pub fn figment() -> Figment {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(
                Env::raw()
                    .only(&[CONNECTION_STRING_ENV])
                    .map(|_| "cache.connection_string".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(invalid("server.listen_addr", "must not be empty"));
        }
        if !self.server.route.starts_with('/') {
            return Err(invalid(
                "server.route",
                format!("must start with '/', got {:?}", self.server.route),
            ));
        }
        if self.cache.operation_timeout_ms == 0 {
            return Err(invalid("cache.operation_timeout_ms", "must be greater than zero"));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.connection_string.trim().is_empty() {
            return Err(invalid(
                "cache.connection_string",
                "required when the redis backend is selected",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}
