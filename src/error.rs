//! Error types for regmirror
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RegMirrorError
pub type Result<T> = std::result::Result<T, RegMirrorError>;

/// Unified error type for regmirror operations
#[derive(Debug, Error)]
pub enum RegMirrorError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Backing Store Errors
    // -------------------------------------------------------------------------
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("backing store unavailable: {0}")]
    Persistence(String),

    // -------------------------------------------------------------------------
    // Register Map Errors
    // -------------------------------------------------------------------------
    #[error("address {address} out of range for {space} space")]
    AddressOutOfRange { space: &'static str, address: u16 },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("protocol frame error: {0}")]
    Frame(String),

    // -------------------------------------------------------------------------
    // Caller Contract Violations
    // -------------------------------------------------------------------------
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rmodbus::ErrorKind> for RegMirrorError {
    fn from(kind: rmodbus::ErrorKind) -> Self {
        RegMirrorError::Frame(format!("{kind:?}"))
    }
}
