//! CLI command implementations.

use anyhow::{Context, Result};
use lodeflow_catalog::{Datasource, DatasourceId, UserId};
use lodeflow_core::{DatasourceService, User};
use lodeflow_gateway::DbEngine;

fn print_datasource(datasource: &Datasource, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(datasource)?);
        return Ok(());
    }
    let id = datasource
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{id}  {engine}://{user}@{server}:{port}/{db}  table={table}  owner={owner}",
        engine = datasource.engine,
        user = datasource.db_username,
        server = datasource.db_server,
        port = datasource.connection().port_or_default(),
        db = datasource.db_name,
        table = datasource.db_table.as_deref().unwrap_or("-"),
        owner = datasource.user_id,
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn prepare(
    service: &DatasourceService,
    user_id: i64,
    secret: String,
    engine: &str,
    table: Option<String>,
    save: bool,
    json: bool,
) -> Result<()> {
    let engine: DbEngine = engine.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let user = User {
        user_id: UserId(user_id),
        db_secret: secret,
    };

    let mut datasource = service
        .prepare_new_datasource_for_user(&user, engine)
        .await
        .context("Failed to prepare data source")?;
    datasource.db_table = table;

    if save {
        datasource = service
            .save_datasource(datasource, true)
            .await
            .context("Failed to save data source")?;
    }

    print_datasource(&datasource, json)
}

pub async fn list(service: &DatasourceService, user_id: i64, json: bool) -> Result<()> {
    let datasources = service.find_datasources_by_user(UserId(user_id)).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&datasources)?);
        return Ok(());
    }
    for datasource in &datasources {
        print_datasource(datasource, false)?;
    }
    Ok(())
}

pub async fn show(service: &DatasourceService, id: i64, json: bool) -> Result<()> {
    let datasource = service.find_datasource(DatasourceId(id)).await?;
    print_datasource(&datasource, json)
}

pub async fn set_table(
    service: &DatasourceService,
    id: i64,
    table: String,
    json: bool,
) -> Result<()> {
    let mut datasource = service.find_datasource(DatasourceId(id)).await?;
    datasource.db_table = Some(table);
    let saved = service
        .save_datasource(datasource, true)
        .await
        .context("Failed to save data source")?;
    print_datasource(&saved, json)
}

pub async fn reconcile(service: &DatasourceService, id: i64, json: bool) -> Result<()> {
    let datasource = service.find_datasource(DatasourceId(id)).await?;
    let refreshed = service
        .reconcile_columns(&datasource)
        .await
        .context("Reconciliation failed")?;
    print_datasource(&refreshed, json)
}

pub async fn check(service: &DatasourceService, id: i64, reload: bool) -> Result<()> {
    let mapped = service
        .check_datasource_columns_format_mappings(DatasourceId(id), reload)
        .await?;
    println!("{}", if mapped { "mapped" } else { "unmapped" });
    Ok(())
}

pub async fn delete(service: &DatasourceService, id: i64) -> Result<()> {
    let deleted = service.delete_datasource(DatasourceId(id)).await?;
    println!("deleted {deleted}");
    Ok(())
}
