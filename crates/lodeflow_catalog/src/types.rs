//! Entities held by the metadata catalog.

use lodeflow_gateway::{DbConnection, DbEngine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasourceId(pub i64);

impl fmt::Display for DatasourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a data-source column record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub i64);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the owning user (an external entity; only the id is stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical tabular dataset owned by a user, backed by a table in a
/// dedicated external database account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    /// Assigned by the catalog on first persist
    pub id: Option<DatasourceId>,
    /// Backing database engine
    pub engine: DbEngine,
    /// Name of the user-scoped database
    pub db_name: String,
    /// Account name within the external engine
    pub db_username: String,
    /// Derived password (opaque to the catalog)
    pub db_password: String,
    /// Server host
    pub db_server: String,
    /// Server port; engine default when absent
    pub db_port: Option<u16>,
    /// Table holding the tabular data; None until the upload workflow
    /// designates one
    pub db_table: Option<String>,
    /// Owning user
    pub user_id: UserId,
}

impl Datasource {
    /// Connection attributes for this data source's own account.
    pub fn connection(&self) -> DbConnection {
        DbConnection {
            engine: self.engine,
            server: self.db_server.clone(),
            port: self.db_port,
            username: self.db_username.clone(),
            password: self.db_password.clone(),
            database: Some(self.db_name.clone()),
        }
    }
}

/// Cached metadata about one column of a data source's backing table.
///
/// `name` mirrors the live schema after reconciliation; `format_id` is the
/// catalog's own mapping onto a semantic format and survives reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceColumn {
    /// Assigned by the catalog on first persist
    pub id: Option<ColumnId>,
    /// Owning data source
    pub datasource_id: DatasourceId,
    /// Column name, unique within the data source
    pub name: String,
    /// Semantic format mapping; None = not yet mapped
    pub format_id: Option<i64>,
}
