use crate::constants::{env, mappings, network, server};
use crate::services::transport::parse_base_url;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid service url {url:?}: {reason}")]
    InvalidServiceUrl { url: String, reason: String },

    #[error("service timeout must be greater than zero")]
    ZeroTimeout,
}

/// Process-level settings. Mapping documents are loaded separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub service_url: String,
    pub timeout: Duration,
    pub server_name: String,
    pub server_version: String,
    pub log_level: Option<String>,
    pub mappings_file: Option<PathBuf>,
    pub config_dir: PathBuf,
    pub pool_max_idle: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_url: network::DEFAULT_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(network::TIMEOUT_SERVICE_REQUEST_SECS),
            server_name: server::DEFAULT_SERVER_NAME.to_string(),
            server_version: server::SERVER_VERSION.to_string(),
            log_level: None,
            mappings_file: None,
            config_dir: PathBuf::from(mappings::DEFAULT_CONFIG_DIR),
            pool_max_idle: network::POOL_MAX_IDLE_PER_HOST,
        }
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub service_url: Option<String>,
    pub timeout_secs: Option<f64>,
    pub mappings_file: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = get(env::SERVICE_URL).or_else(|| get(env::SERVICE_URL_LEGACY)) {
            config.service_url = url;
        }
        let timeout_var = if get(env::SERVICE_TIMEOUT).is_some() {
            env::SERVICE_TIMEOUT
        } else {
            env::SERVICE_TIMEOUT_LEGACY
        };
        if let Some(raw) = get(timeout_var) {
            config.timeout = parse_timeout(timeout_var, &raw)?;
        }
        if let Some(name) = get(env::SERVER_NAME) {
            config.server_name = name;
        }
        if let Some(version) = get(env::SERVER_VERSION) {
            config.server_version = version;
        }
        config.log_level = get(env::LOG_LEVEL);
        config.mappings_file = get(env::MAPPINGS_FILE).map(PathBuf::from);
        if let Some(dir) = get(env::CONFIG_DIR) {
            config.config_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(env::POOL_MAX_IDLE) {
            config.pool_max_idle = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: env::POOL_MAX_IDLE,
                value: raw.clone(),
                reason: "expected a non-negative integer".to_string(),
            })?;
        }
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(url) = overrides.service_url {
            self.service_url = url;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.timeout = seconds(secs).ok_or_else(|| ConfigError::InvalidValue {
                name: "--timeout",
                value: secs.to_string(),
                reason: "must be a positive number of seconds".to_string(),
            })?;
        }
        if let Some(path) = overrides.mappings_file {
            self.mappings_file = Some(path);
        }
        if let Some(dir) = overrides.config_dir {
            self.config_dir = dir;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = Some(level);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_base_url(&self.service_url).map_err(|err| ConfigError::InvalidServiceUrl {
            url: self.service_url.clone(),
            reason: err.to_string(),
        })?;
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// `None` for zero, negative, non-finite or out-of-range values.
fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|timeout| !timeout.is_zero())
}

fn parse_timeout(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let secs: f64 = raw.parse().map_err(|_| invalid("expected a number of seconds"))?;
    seconds(secs).ok_or_else(|| invalid("must be a positive number of seconds"))
}
