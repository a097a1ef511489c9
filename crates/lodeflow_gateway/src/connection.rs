//! Connection value objects shared by the gateway and its callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database engine types.
///
/// Closed set: a connection can only ever name an engine this build knows
/// how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    MySql,
    Postgres,
}

impl DbEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Default server port for this engine.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown database engine: {other}")),
        }
    }
}

/// The minimal bundle needed to open a database session.
///
/// Used both for a user's own scoped account and for an administrative
/// account of a given engine type. Not persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConnection {
    pub engine: DbEngine,
    pub server: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    /// Target database. `None` for administrative sessions that are opened
    /// without selecting a database (e.g. to create one).
    pub database: Option<String>,
}

impl DbConnection {
    /// Effective port: explicit value or the engine default.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }
}

/// A column as reported live by the external database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Engine-native type name (informational; reconciliation keys on `name`).
    pub data_type: String,
}
