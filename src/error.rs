//! Error types for the convergence core.
//!
//! Each subsystem gets its own error enum, the way a stable API with many
//! independent failure domains should; a top-level [`ConvergenceError`]
//! collects them for callers that cross subsystem boundaries (the
//! `Converger`, mainly).

use thiserror::Error;

/// Top-level error type, used where a caller spans more than one subsystem.
#[derive(Error, Debug)]
pub enum ConvergenceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("dns error: {0}")]
    Dns(#[from] DnsError),
}

/// Errors raised by the [`crate::store::SubscriptionStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state root does not exist or is not a directory: {0}")]
    RootMissing(String),

    #[error("subscription not found: {0}")]
    NotFound(String),

    #[error("subscription already exists: {0}")]
    AlreadyExists(String),

    #[error("port space exhausted")]
    Exhausted,

    #[error("record on disk is malformed: {0}")]
    SerializationError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`crate::client::SubscriptionManagerClient`] implementation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("subscription not found: {0}")]
    NotFound(String),

    #[error("subscription already exists: {0}")]
    AlreadyExists(String),

    #[error("server responded with {observed}, expected {expected}")]
    UnexpectedResponseCode { observed: u16, expected: u16 },

    #[error("transient external failure: {0}")]
    TransientExternal(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed response body: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Errors raised by an [`crate::orchestrator::OrchestratorAdapter`] implementation.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("server responded with unexpected status {observed}")]
    UnexpectedResponseCode { observed: u16 },

    #[error("transient external failure: {0}")]
    TransientExternal(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed response body: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Errors raised by a [`crate::dns::DnsAdapter`] implementation.
#[derive(Error, Debug)]
pub enum DnsError {
    #[error("server responded with unexpected status {observed}")]
    UnexpectedResponseCode { observed: u16 },

    #[error("transient external failure: {0}")]
    TransientExternal(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ConvergenceResult<T> = std::result::Result<T, ConvergenceError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type ClientResult<T> = std::result::Result<T, ClientError>;
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
pub type DnsResult<T> = std::result::Result<T, DnsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::NotFound("sub-a".to_string());
        assert_eq!(err.to_string(), "subscription not found: sub-a");
    }

    #[test]
    fn client_error_conversion() {
        let err = StoreError::Exhausted;
        let wrapped: ConvergenceError = err.into();
        assert!(matches!(
            wrapped,
            ConvergenceError::Store(StoreError::Exhausted)
        ));
    }
}
