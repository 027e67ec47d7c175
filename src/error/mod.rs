//! Error handling for the ledger
//!
//! This module provides the error types shared by the chain, the store and the
//! networking layer.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger operations
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Malformed persisted record
    Format(String),
    /// File I/O errors
    Io(String),
    /// Network communication errors
    Network(String),
    /// Block or chain validation errors
    InvalidBlock(String),
    /// Mining errors (including cancellation)
    Mining(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// A lock was poisoned by a panicking thread
    Lock(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Format(msg) => write!(f, "Format error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Lock(msg) => write!(f, "Lock error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<std::num::ParseIntError> for BlockchainError {
    fn from(err: std::num::ParseIntError) -> Self {
        BlockchainError::Format(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for BlockchainError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        BlockchainError::Lock(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = BlockchainError::Format("expected 8 fields, found 3".to_string());
        assert_eq!(err.to_string(), "Format error: expected 8 fields, found 3");

        let err = BlockchainError::Mining("cancelled".to_string());
        assert_eq!(err.to_string(), "Mining error: cancelled");
    }

    #[test]
    fn test_parse_int_maps_to_format() {
        let err: BlockchainError = "abc".parse::<u64>().unwrap_err().into();
        assert!(matches!(err, BlockchainError::Format(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BlockchainError = io.into();
        assert!(matches!(err, BlockchainError::Io(msg) if msg.contains("missing")));
    }
}
