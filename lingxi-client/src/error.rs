//! Error types for the Lingxi binary.

use crate::api_client::RestClientError;
use crate::config::ConfigError;
use crate::persistence::PersistenceError;
use crate::telemetry::TelemetryError;
use lingxi_core::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Client(#[from] RestClientError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Usage: {0}")]
    Usage(String),
}
