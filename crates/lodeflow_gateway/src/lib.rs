//! Database administration gateway for Lodeflow.
//!
//! This crate is the seam across which real database engines are adapted:
//! it can open a session with a supplied credential set, list the columns of
//! a named table, and create a new user-scoped database + account from an
//! administrative session. Engine-specific SQL lives only in the adapter
//! modules; everything above this crate talks to the traits.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lodeflow_gateway::{DatabaseGateway, DbConnection, DbEngine, SqlGateway};
//!
//! let gateway = SqlGateway::new();
//! let session = gateway.open_database(&conn).await?;
//! let columns = session.list_columns("transactions").await?;
//! ```

mod connection;
mod error;
pub mod guard;
mod mysql;
mod postgres;

pub use connection::{ColumnDescriptor, DbConnection, DbEngine};
pub use error::{GatewayError, Result};

use async_trait::async_trait;

/// An open session against one external database.
///
/// Sessions are per-call: each gateway operation opens its own and nothing
/// is pooled or shared across callers.
#[async_trait]
pub trait DatabaseSession: Send + Sync {
    /// List the live columns of the named table.
    ///
    /// A missing table is `GatewayError::TableNotFound`, distinct from a
    /// lost connection or an unreadable schema.
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Create the database and account described by `target`.
    ///
    /// Requires this session to be administrative. Idempotent-safe: when the
    /// target already exists the call succeeds trivially and existing data
    /// is left alone.
    async fn create_user_database(&self, target: &DbConnection) -> Result<bool>;

    /// Close the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Entry point for opening sessions.
#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    /// Open a session using the given credential set.
    ///
    /// Does not retry; retry policy belongs to the caller.
    async fn open_database(&self, conn: &DbConnection) -> Result<Box<dyn DatabaseSession>>;

    /// Engines this gateway can talk to.
    fn supported_engines(&self) -> &'static [DbEngine];
}

const SUPPORTED_ENGINES: &[DbEngine] = &[DbEngine::MySql, DbEngine::Postgres];

/// Gateway backed by real SQL engines via sqlx.
#[derive(Debug, Clone, Default)]
pub struct SqlGateway;

impl SqlGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseGateway for SqlGateway {
    async fn open_database(&self, conn: &DbConnection) -> Result<Box<dyn DatabaseSession>> {
        match conn.engine {
            DbEngine::MySql => Ok(Box::new(mysql::MySqlSession::open(conn).await?)),
            DbEngine::Postgres => Ok(Box::new(postgres::PgSession::open(conn).await?)),
        }
    }

    fn supported_engines(&self) -> &'static [DbEngine] {
        SUPPORTED_ENGINES
    }
}
