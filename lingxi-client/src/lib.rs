//! Lingxi client library exports.
//!
//! The REST client, the stream ingestor, the TTL cache, the optimistic
//! mutation engine and the per-domain stores built from them.

pub mod api_client;
pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod notifications;
pub mod optimistic;
pub mod persistence;
pub mod stores;
pub mod stream;
pub mod telemetry;

pub use backend::{QuestionField, StudyBackend};
pub use error::ClientError;
