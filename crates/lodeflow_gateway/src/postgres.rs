//! PostgreSQL adapter: the only place Postgres-specific SQL lives.

use crate::error::{GatewayError, Result};
use crate::guard::{quote_literal, validate_identifier};
use crate::{ColumnDescriptor, DatabaseSession, DbConnection, DbEngine};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Maintenance database used when a session is opened without a target
/// database (administrative sessions).
const MAINTENANCE_DB: &str = "postgres";

pub(crate) struct PgSession {
    conn: Mutex<PgConnection>,
}

impl PgSession {
    pub(crate) async fn open(conn: &DbConnection) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&conn.server)
            .port(conn.port_or_default())
            .username(&conn.username)
            .password(&conn.password)
            .database(conn.database.as_deref().unwrap_or(MAINTENANCE_DB));

        let session = options
            .connect()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
        debug!(server = %conn.server, user = %conn.username, "Postgres session opened");

        Ok(Self {
            conn: Mutex::new(session),
        })
    }
}

#[async_trait]
impl DatabaseSession for PgSession {
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut conn = self.conn.lock().await;

        let rows = sqlx::query(
            r#"
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| GatewayError::Schema(e.to_string()))?;

        if rows.is_empty() {
            return Err(GatewayError::TableNotFound(table.to_string()));
        }

        rows.iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    name: row
                        .try_get::<String, _>(0)
                        .map_err(|e| GatewayError::Schema(e.to_string()))?,
                    data_type: row
                        .try_get::<String, _>(1)
                        .map_err(|e| GatewayError::Schema(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn create_user_database(&self, target: &DbConnection) -> Result<bool> {
        if target.engine != DbEngine::Postgres {
            return Err(GatewayError::provision(format!(
                "cannot create a {} account through a Postgres session",
                target.engine
            )));
        }
        let database = target
            .database
            .as_deref()
            .ok_or_else(|| GatewayError::provision("target connection has no database name"))?;
        let database = validate_identifier(database)?;
        let username = validate_identifier(&target.username)?;
        let password = quote_literal(&target.password);

        let mut conn = self.conn.lock().await;

        // CREATE ROLE/DATABASE have no IF NOT EXISTS form, so probe the
        // catalogs first. An existing role keeps its current password.
        let role_exists = sqlx::query("SELECT 1 FROM pg_roles WHERE rolname = $1")
            .bind(username)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| GatewayError::provision(e.to_string()))?
            .is_some();
        if !role_exists {
            sqlx::query(&format!("CREATE ROLE \"{username}\" LOGIN PASSWORD {password}"))
                .execute(&mut *conn)
                .await
                .map_err(|e| GatewayError::provision(e.to_string()))?;
        }

        let db_exists = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(database)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| GatewayError::provision(e.to_string()))?
            .is_some();
        if !db_exists {
            sqlx::query(&format!("CREATE DATABASE \"{database}\" OWNER \"{username}\""))
                .execute(&mut *conn)
                .await
                .map_err(|e| GatewayError::provision(e.to_string()))?;
        }

        sqlx::query(&format!(
            "GRANT ALL PRIVILEGES ON DATABASE \"{database}\" TO \"{username}\""
        ))
        .execute(&mut *conn)
        .await
        .map_err(|e| GatewayError::provision(e.to_string()))?;

        info!(%database, %username, "Postgres user database provisioned");
        Ok(true)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let conn = self.conn.into_inner();
        conn.close()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))
    }
}
