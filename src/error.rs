use std::{fmt, io};

use base64::DecodeError as Base64DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::{sync::oneshot::error::RecvError, task::JoinError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum SyncError {
    #[error("Snapshot compression error: {0}")]
    Compression(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Host environment error: {0}")]
    Host(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    /// Transient unavailability: no eligible window, empty or missing tab enumeration. The
    /// operation is abandoned and retried on the next triggering event.
    #[error("Not ready: {0}")]
    NotReady(String),
    #[error("Queued operation was dropped before completion")]
    OperationCancelled,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Storage error: {0}")]
    Store(String),
}

impl SyncError {
    /// Transient failures are expected under normal operation and are logged at debug level.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NotReady(_) | SyncError::OperationCancelled
        )
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(src: toml::de::Error) -> SyncError {
        SyncError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(src: toml::ser::Error) -> SyncError {
        SyncError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for SyncError {
    fn from(src: JsonError) -> SyncError {
        SyncError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<Base64DecodeError> for SyncError {
    fn from(src: Base64DecodeError) -> SyncError {
        SyncError::Compression(format!("base64 decode failed: {src}"))
    }
}

impl From<io::Error> for SyncError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => SyncError::NotFound(format!("{x}")),
            _ => SyncError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for SyncError {
    fn from(x: fmt::Error) -> Self {
        SyncError::Custom(format!("{x}"))
    }
}

impl From<RecvError> for SyncError {
    fn from(_: RecvError) -> Self {
        SyncError::OperationCancelled
    }
}

impl From<JoinError> for SyncError {
    fn from(x: JoinError) -> Self {
        if x.is_panic() {
            SyncError::Custom(format!("Queued operation panicked: {x}"))
        } else {
            SyncError::OperationCancelled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let err: SyncError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, SyncError::NotFound(_)));

        let err: SyncError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, SyncError::Io(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::NotReady("no window".to_string()).is_transient());
        assert!(SyncError::OperationCancelled.is_transient());
        assert!(!SyncError::Store("quota".to_string()).is_transient());
    }
}
