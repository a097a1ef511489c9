//! Provisioning and reconciliation core for Lodeflow.
//!
//! Orchestrates the metadata catalog and the database administration
//! gateway: prepares per-user data sources (provisioning the backing
//! database account on demand), keeps cached column metadata in step with
//! the live schema, and exposes the data-source lifecycle operations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lodeflow_core::{DatasourceService, EnginesConfig, User};
//!
//! let service = DatasourceService::new(catalog.clone(), catalog, gateway, engines);
//! let candidate = service.prepare_new_datasource_for_user(&user, engine).await?;
//! let saved = service.save_datasource(candidate, true).await?;
//! ```

pub mod config;
pub mod credentials;
mod error;
mod service;

pub use config::{EngineConfig, EnginesConfig, NameTemplate};
pub use credentials::derive_db_password;
pub use error::{CredentialError, Result, ServiceError};
pub use service::{DatasourceHandle, DatasourceService, User};
