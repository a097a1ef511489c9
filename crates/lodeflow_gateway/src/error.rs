//! Error types for the gateway layer.

use crate::DbEngine;
use thiserror::Error;

/// Gateway operation result type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors from database administration operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Engine type is not supported by this gateway build
    #[error("Unsupported database engine: {0}")]
    UnsupportedEngine(DbEngine),

    /// Session could not be opened (bad credentials, unreachable server,
    /// account not provisioned yet)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The named table does not exist in the connected database
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Connected, but the schema could not be read
    #[error("Schema error: {0}")]
    Schema(String),

    /// Administrative database/account creation failed
    #[error("Provisioning error: {0}")]
    Provision(String),

    /// Identifier rejected before any DDL was assembled
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl GatewayError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a provisioning error.
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }
}
