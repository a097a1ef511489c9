//! Repository traits and their SQLite implementations.
//!
//! The core service depends only on these traits; the SQLite-backed
//! `Catalog` is one implementation of both.

use crate::error::{CatalogError, Result};
use crate::types::*;
use crate::Catalog;
use async_trait::async_trait;
use lodeflow_gateway::DbEngine;
use sqlx::Row;

/// Narrow store interface for the data-source collection.
#[async_trait]
pub trait DatasourceStore: Send + Sync {
    /// Look up a data source by id.
    async fn find(&self, id: DatasourceId) -> Result<Option<Datasource>>;

    /// All data sources owned by the given user.
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Datasource>>;

    /// Insert (id = None) or update (id = Some) a data source.
    async fn persist(&self, datasource: &Datasource) -> Result<DatasourceId>;

    /// Delete a data source, cascading to its column records.
    ///
    /// Returns the number of data sources deleted (0 or 1).
    async fn delete(&self, id: DatasourceId) -> Result<u64>;
}

/// Narrow store interface for the data-source-column collection.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Cached column records for one data source, ordered by name.
    async fn columns_for(&self, datasource_id: DatasourceId) -> Result<Vec<DatasourceColumn>>;

    /// Insert-or-update a column record.
    ///
    /// Inserts upsert on `(datasource_id, name)` so a concurrent insert of
    /// the same name collapses into one record.
    async fn persist(&self, column: &DatasourceColumn) -> Result<ColumnId>;

    /// Delete a column record by id. Returns the number deleted (0 or 1).
    async fn delete(&self, id: ColumnId) -> Result<u64>;
}

#[async_trait]
impl DatasourceStore for Catalog {
    async fn find(&self, id: DatasourceId) -> Result<Option<Datasource>> {
        let row = sqlx::query(
            "SELECT id, engine, db_name, db_username, db_password, db_server, db_port, db_table, user_id \
             FROM datasources WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_datasource(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Datasource>> {
        let rows = sqlx::query(
            "SELECT id, engine, db_name, db_username, db_password, db_server, db_port, db_table, user_id \
             FROM datasources WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_datasource).collect()
    }

    async fn persist(&self, datasource: &Datasource) -> Result<DatasourceId> {
        let now = Self::now_millis();

        match datasource.id {
            Some(id) => {
                let result = sqlx::query(
                    r#"
                    UPDATE datasources SET
                        engine = ?, db_name = ?, db_username = ?, db_password = ?,
                        db_server = ?, db_port = ?, db_table = ?, user_id = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(datasource.engine.as_str())
                .bind(&datasource.db_name)
                .bind(&datasource.db_username)
                .bind(&datasource.db_password)
                .bind(&datasource.db_server)
                .bind(datasource.db_port.map(|p| p as i64))
                .bind(&datasource.db_table)
                .bind(datasource.user_id.0)
                .bind(now)
                .bind(id.0)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(CatalogError::not_found(format!("datasource {id}")));
                }
                Ok(id)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO datasources
                        (engine, db_name, db_username, db_password, db_server, db_port, db_table, user_id, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(datasource.engine.as_str())
                .bind(&datasource.db_name)
                .bind(&datasource.db_username)
                .bind(&datasource.db_password)
                .bind(&datasource.db_server)
                .bind(datasource.db_port.map(|p| p as i64))
                .bind(&datasource.db_table)
                .bind(datasource.user_id.0)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await?;

                Ok(DatasourceId(result.last_insert_rowid()))
            }
        }
    }

    async fn delete(&self, id: DatasourceId) -> Result<u64> {
        // Delete columns first (cascade); the FK would do it too, but an
        // explicit pass keeps the contract visible.
        sqlx::query("DELETE FROM datasource_columns WHERE datasource_id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM datasources WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ColumnStore for Catalog {
    async fn columns_for(&self, datasource_id: DatasourceId) -> Result<Vec<DatasourceColumn>> {
        let rows = sqlx::query(
            "SELECT id, datasource_id, name, format_id \
             FROM datasource_columns WHERE datasource_id = ? ORDER BY name",
        )
        .bind(datasource_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DatasourceColumn {
                id: Some(ColumnId(row.get("id"))),
                datasource_id: DatasourceId(row.get("datasource_id")),
                name: row.get("name"),
                format_id: row.get("format_id"),
            })
            .collect())
    }

    async fn persist(&self, column: &DatasourceColumn) -> Result<ColumnId> {
        match column.id {
            Some(id) => {
                let result = sqlx::query(
                    "UPDATE datasource_columns SET name = ?, format_id = ? WHERE id = ?",
                )
                .bind(&column.name)
                .bind(column.format_id)
                .bind(id.0)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(CatalogError::not_found(format!("datasource column {id}")));
                }
                Ok(id)
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO datasource_columns (datasource_id, name, format_id)
                    VALUES (?, ?, ?)
                    ON CONFLICT(datasource_id, name) DO UPDATE SET
                        format_id = excluded.format_id
                    "#,
                )
                .bind(column.datasource_id.0)
                .bind(&column.name)
                .bind(column.format_id)
                .execute(&self.pool)
                .await?;

                let row = sqlx::query(
                    "SELECT id FROM datasource_columns WHERE datasource_id = ? AND name = ?",
                )
                .bind(column.datasource_id.0)
                .bind(&column.name)
                .fetch_one(&self.pool)
                .await?;

                Ok(ColumnId(row.get("id")))
            }
        }
    }

    async fn delete(&self, id: ColumnId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM datasource_columns WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_datasource(row: &sqlx::sqlite::SqliteRow) -> Result<Datasource> {
    let engine: String = row.get("engine");
    let engine: DbEngine = engine
        .parse()
        .map_err(CatalogError::invalid_record)?;
    let db_port: Option<i64> = row.get("db_port");
    let db_port = db_port
        .map(|p| {
            u16::try_from(p)
                .map_err(|_| CatalogError::invalid_record(format!("db_port out of range: {p}")))
        })
        .transpose()?;

    Ok(Datasource {
        id: Some(DatasourceId(row.get("id"))),
        engine,
        db_name: row.get("db_name"),
        db_username: row.get("db_username"),
        db_password: row.get("db_password"),
        db_server: row.get("db_server"),
        db_port,
        db_table: row.get("db_table"),
        user_id: UserId(row.get("user_id")),
    })
}
