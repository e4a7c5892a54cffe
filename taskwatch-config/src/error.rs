use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidOverride {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid server URL '{url}'")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server URL '{url}' must use http or https, not '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("server URL '{url}' has no host")]
    MissingHost { url: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error(
        "stream.reconnect_base_ms ({base}) exceeds stream.reconnect_max_ms ({max})"
    )]
    BackoffBounds { base: u64, max: u64 },
}
