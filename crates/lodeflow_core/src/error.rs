//! Error types for the provisioning and reconciliation service.

use lodeflow_catalog::{CatalogError, DatasourceId};
use lodeflow_gateway::{DbEngine, GatewayError};
use thiserror::Error;

/// Service operation result type.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by the data-source service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested engine is not configured or not supported by the gateway;
    /// rejected before any I/O
    #[error("Unsupported database engine: {0}")]
    UnsupportedEngine(DbEngine),

    /// Neither the user's own connection nor administrative creation worked;
    /// terminal, no further fallback is attempted
    #[error("Database provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// Catalog lookup for an id yielded nothing
    #[error("Datasource not found: {0}")]
    NotFound(DatasourceId),

    /// Operation needs a persisted data source (one with an assigned id)
    #[error("Datasource has not been persisted yet")]
    Unpersisted,

    /// Reconciliation needs a designated backing table
    #[error("Datasource {0} has no backing table designated")]
    NoBackingTable(DatasourceId),

    /// Engine configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential derivation rejected its input
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// External database failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Metadata catalog failure
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors from the credential deriver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The user's base secret is required to be non-empty by contract
    #[error("User base secret is empty")]
    EmptySecret,

    /// The base secret is shorter than the slice window of the scheme
    #[error("User base secret too short ({0} chars)")]
    SecretTooShort(usize),
}
