//! Catalog schema creation.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::Catalog;
use tracing::info;

impl Catalog {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // WAL for concurrent readers; foreign keys drive the column cascade
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS datasources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                engine TEXT NOT NULL,
                db_name TEXT NOT NULL,
                db_username TEXT NOT NULL,
                db_password TEXT NOT NULL,
                db_server TEXT NOT NULL,
                db_port INTEGER,
                db_table TEXT,
                user_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Columns: one row per live column, unique by name within a source.
        // The unique index doubles as the upsert target so two overlapping
        // reconciliations cannot double-create a record.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS datasource_columns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                datasource_id INTEGER NOT NULL REFERENCES datasources(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                format_id INTEGER,
                UNIQUE(datasource_id, name)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_datasources_user ON datasources(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_columns_datasource ON datasource_columns(datasource_id)",
        )
        .execute(&self.pool)
        .await?;

        info!("Catalog schema verified");
        Ok(())
    }
}
