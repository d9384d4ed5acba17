//! Error types for the platform monitor.

use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Key-value store error: {0}")]
    Store(String),
    #[error("Message bus error: {0}")]
    Bus(String),
    #[error("Cluster API error: {0}")]
    Cluster(String),
    #[error("Query service error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Reduction error: {0}")]
    Reduction(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for MonitorError {
    fn from(error: redis::RedisError) -> Self {
        MonitorError::Store(error.to_string())
    }
}

impl From<kube::Error> for MonitorError {
    fn from(error: kube::Error) -> Self {
        MonitorError::Cluster(error.to_string())
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(error: reqwest::Error) -> Self {
        MonitorError::Query(error.to_string())
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Failure raised by a single status check.
///
/// The orchestrator never lets one of these escape a tick; it is turned into a
/// synthetic `ERROR` result for the failing check.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Collaborator(#[from] MonitorError),
    #[error("{0}")]
    Failed(String),
}

impl CheckError {
    pub fn failed(message: impl Into<String>) -> Self {
        CheckError::Failed(message.into())
    }
}

/// Failure writing a frame to one live subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("subscriber connection is closed")]
    Closed,
    #[error("subscriber buffer is full")]
    Full,
}
