pub mod network {
    pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8080";
    pub const TIMEOUT_SERVICE_REQUEST_SECS: u64 = 30;
    pub const POOL_MAX_IDLE_PER_HOST: usize = 10;
}

pub mod server {
    pub const PROTOCOL_VERSION: &str = "2025-06-18";
    pub const DEFAULT_SERVER_NAME: &str = "product-info-server";
    pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub mod mappings {
    pub const DEFAULT_CONFIG_DIR: &str = "config";
    /// Discovery order inside the config directory.
    pub const FILE_NAMES: &[&str] = &[
        "tool_mappings.yaml",
        "tool_mappings.yml",
        "tool_mappings.json",
        "tool_mappings.properties",
    ];
    pub const PARSERS_PREFIX: &str = "response_parsers";
}

pub mod limits {
    pub const MAX_TOOL_SUGGESTIONS: usize = 5;
    pub const LOG_BODY_PREVIEW_BYTES: usize = 256;
}

pub mod env {
    pub const SERVICE_URL: &str = "SERVICE_URL";
    pub const SERVICE_URL_LEGACY: &str = "PRODUCT_SERVICE_URL";
    pub const SERVICE_TIMEOUT: &str = "SERVICE_TIMEOUT";
    pub const SERVICE_TIMEOUT_LEGACY: &str = "PRODUCT_SERVICE_TIMEOUT";
    pub const SERVER_NAME: &str = "MCP_SERVER_NAME";
    pub const SERVER_VERSION: &str = "MCP_SERVER_VERSION";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const MAPPINGS_FILE: &str = "MAPPINGS_FILE";
    pub const CONFIG_DIR: &str = "CONFIG_DIR";
    pub const POOL_MAX_IDLE: &str = "HTTP_POOL_MAX_IDLE";
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http:", "https:"];
}
