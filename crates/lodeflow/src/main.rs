//! Lodeflow command-line entry point.
//!
//! Thin surrounding layer over the core service: loads the engines
//! configuration, opens the metadata catalog, and dispatches subcommands.
//! Authorization and localization belong to whatever embeds the core, not
//! here.

mod commands;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lodeflow_catalog::Catalog;
use lodeflow_core::{DatasourceService, EnginesConfig};
use lodeflow_gateway::SqlGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "lodeflow", version, about = "Per-user data-source provisioning and reconciliation")]
struct Cli {
    /// Path to the metadata catalog (default: ~/.lodeflow/catalog.sqlite3)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Path to the engines configuration (default: ~/.lodeflow/engines.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prepare a data source for a user, provisioning the backing account on demand
    Prepare {
        #[arg(long)]
        user_id: i64,
        /// The user's base secret for password derivation
        #[arg(long, env = "LODEFLOW_USER_SECRET")]
        secret: String,
        /// Engine type (mysql, postgres)
        #[arg(long)]
        engine: String,
        /// Backing table to designate
        #[arg(long)]
        table: Option<String>,
        /// Persist the prepared data source (reconciles columns when a table is set)
        #[arg(long)]
        save: bool,
        #[arg(long)]
        json: bool,
    },
    /// List a user's data sources
    List {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Show one data source
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Designate the backing table of a data source and reconcile its columns
    SetTable {
        id: i64,
        /// Table inside the data source's own database
        table: String,
        #[arg(long)]
        json: bool,
    },
    /// Reconcile cached column metadata against the live schema
    Reconcile {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Check that every column has a format mapping
    Check {
        id: i64,
        /// Reconcile first so the check reflects the live schema
        #[arg(long)]
        reload: bool,
    },
    /// Delete a data source and its column records
    Delete { id: i64 },
}

fn lodeflow_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("LODEFLOW_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".lodeflow"))
        .context("Could not determine home directory")
}

async fn build_service(cli: &Cli) -> Result<DatasourceService> {
    let home = lodeflow_home()?;
    let catalog_path = cli
        .catalog
        .clone()
        .unwrap_or_else(|| home.join("catalog.sqlite3"));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| home.join("engines.toml"));

    let engines = if config_path.exists() {
        EnginesConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        debug!(path = %config_path.display(), "No engines config, starting empty");
        EnginesConfig::default()
    };

    let catalog = Arc::new(
        Catalog::open(&catalog_path)
            .await
            .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?,
    );

    Ok(DatasourceService::new(
        catalog.clone(),
        catalog,
        Arc::new(SqlGateway::new()),
        engines,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_logging(cli.verbose);

    let service = build_service(&cli).await?;

    match cli.command {
        Command::Prepare {
            user_id,
            ref secret,
            ref engine,
            ref table,
            save,
            json,
        } => {
            commands::prepare(
                &service,
                user_id,
                secret.clone(),
                engine,
                table.clone(),
                save,
                json,
            )
            .await
        }
        Command::List { user_id, json } => commands::list(&service, user_id, json).await,
        Command::Show { id, json } => commands::show(&service, id, json).await,
        Command::SetTable { id, ref table, json } => {
            commands::set_table(&service, id, table.clone(), json).await
        }
        Command::Reconcile { id, json } => commands::reconcile(&service, id, json).await,
        Command::Check { id, reload } => commands::check(&service, id, reload).await,
        Command::Delete { id } => commands::delete(&service, id).await,
    }
}
