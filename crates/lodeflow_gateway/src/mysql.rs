//! MySQL adapter: the only place MySQL-specific SQL lives.

use crate::error::{GatewayError, Result};
use crate::guard::{quote_literal_mysql, validate_identifier};
use crate::{ColumnDescriptor, DatabaseSession, DbConnection, DbEngine};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub(crate) struct MySqlSession {
    conn: Mutex<MySqlConnection>,
}

impl MySqlSession {
    pub(crate) async fn open(conn: &DbConnection) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&conn.server)
            .port(conn.port_or_default())
            .username(&conn.username)
            .password(&conn.password);
        if let Some(database) = &conn.database {
            options = options.database(database);
        }

        let session = options
            .connect()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
        debug!(server = %conn.server, user = %conn.username, "MySQL session opened");

        Ok(Self {
            conn: Mutex::new(session),
        })
    }
}

#[async_trait]
impl DatabaseSession for MySqlSession {
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut conn = self.conn.lock().await;

        let rows = sqlx::query(
            r#"
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| GatewayError::Schema(e.to_string()))?;

        if rows.is_empty() {
            // A table always has at least one column: nothing back means the
            // table itself is missing.
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
        if target.engine != DbEngine::MySql {
            return Err(GatewayError::provision(format!(
                "cannot create a {} account through a MySQL session",
                target.engine
            )));
        }
        let database = target
            .database
            .as_deref()
            .ok_or_else(|| GatewayError::provision("target connection has no database name"))?;
        let database = validate_identifier(database)?;
        let username = validate_identifier(&target.username)?;
        let password = quote_literal_mysql(&target.password);

        let mut conn = self.conn.lock().await;

        // IF NOT EXISTS makes re-provisioning a no-op: an existing account
        // keeps its data and its current password.
        let statements = [
            format!("CREATE DATABASE IF NOT EXISTS `{database}`"),
            format!("CREATE USER IF NOT EXISTS '{username}'@'%' IDENTIFIED BY {password}"),
            format!("GRANT ALL PRIVILEGES ON `{database}`.* TO '{username}'@'%'"),
            "FLUSH PRIVILEGES".to_string(),
        ];
        for sql in &statements {
            sqlx::query(sql)
                .execute(&mut *conn)
                .await
                .map_err(|e| GatewayError::provision(e.to_string()))?;
        }

        info!(%database, %username, "MySQL user database provisioned");
        Ok(true)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let conn = self.conn.into_inner();
        conn.close()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))
    }
}
