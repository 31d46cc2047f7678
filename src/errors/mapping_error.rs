use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a mapping source is rejected. These never reach a caller: the
/// loader logs them and moves on to the next source.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mappings from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse YAML mappings from {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse JSON mappings from {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid properties line {line} in {path:?}: {message}")]
    Properties {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("unsupported mapping file format for {path:?}")]
    UnsupportedFormat { path: PathBuf },

    #[error("tool '{tool}' is invalid: {reason}")]
    InvalidMapping { tool: String, reason: String },

    #[error("response parser '{parser}' is invalid: {reason}")]
    InvalidParser { parser: String, reason: String },

    #[error("mapping source {path:?} defines no tools")]
    Empty { path: PathBuf },
}
