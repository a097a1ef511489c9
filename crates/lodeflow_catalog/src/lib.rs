//! Metadata catalog for Lodeflow data sources.
//!
//! This crate is the single source of truth for cached data-source and
//! column metadata. The live external databases remain authoritative for
//! column *existence*; the catalog is authoritative for format mappings.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lodeflow_catalog::{Catalog, DatasourceStore};
//!
//! let catalog = Catalog::open("~/.lodeflow/catalog.sqlite3").await?;
//! let sources = catalog.find_by_user(user_id).await?;
//! ```

mod error;
mod schema;
mod store;
mod types;

pub use error::{CatalogError, Result};
pub use store::{ColumnStore, DatasourceStore};
pub use types::*;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// SQLite-backed metadata catalog.
///
/// Implements [`DatasourceStore`] and [`ColumnStore`]; the core service only
/// sees those traits.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open or create a catalog at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let catalog = Self { pool };
        catalog.ensure_schema().await?;

        info!(path = %path.display(), "Catalog opened");

        Ok(catalog)
    }

    /// Open an in-memory catalog (for testing).
    ///
    /// The pool is capped at a single connection: each SQLite in-memory
    /// connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let catalog = Self { pool };
        catalog.ensure_schema().await?;

        Ok(catalog)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the catalog connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Current time as milliseconds since Unix epoch.
    pub(crate) fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
