use crate::config::{ConfigError, ServerConfig};
use crate::services::dispatcher::ToolDispatcher;
use crate::services::mapping_loader::{LoadedMappings, MappingLoader, MappingSource};
use crate::services::transport::{HttpTransport, ReqwestTransport, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct App {
    pub config: ServerConfig,
    pub source: MappingSource,
    pub dispatcher: ToolDispatcher,
}

impl App {
    /// Loads mappings and builds the pooled HTTP client. Mapping problems
    /// never fail start-up; configuration problems do.
    pub fn initialize(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let loaded = Self::load_mappings(&config);
        let transport = ReqwestTransport::new(&config.service_url, config.pool_max_idle)?;
        info!(
            service_url = %transport.base_url(),
            timeout_ms = config.timeout.as_millis() as u64,
            "downstream client ready"
        );
        Ok(Self::with_transport(config, loaded, Arc::new(transport)))
    }

    pub fn load_mappings(config: &ServerConfig) -> LoadedMappings {
        MappingLoader::new(config.config_dir.clone()).load(config.mappings_file.as_deref())
    }

    pub fn with_transport(
        config: ServerConfig,
        loaded: LoadedMappings,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(Arc::new(loaded.set), transport, config.timeout);
        Self {
            config,
            source: loaded.source,
            dispatcher,
        }
    }
}
