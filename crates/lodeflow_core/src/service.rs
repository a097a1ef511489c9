//! Provisioning and reconciliation of per-user data sources.
//!
//! The service coordinates two sources of truth: the metadata catalog and
//! the live external databases. The live schema is authoritative for column
//! existence; the catalog is authoritative for format mappings.

use crate::config::EnginesConfig;
use crate::credentials::derive_db_password;
use crate::error::{Result, ServiceError};
use lodeflow_catalog::{
    ColumnStore, Datasource, DatasourceColumn, DatasourceId, DatasourceStore, UserId,
};
use lodeflow_gateway::{DatabaseGateway, DatabaseSession, DbEngine, GatewayError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A user of the platform, as seen by this core.
///
/// External entity: only the stable id and the per-user base secret are
/// needed here. The base secret is required to be non-empty by contract.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub db_secret: String,
}

impl From<&User> for UserId {
    fn from(user: &User) -> Self {
        user.user_id
    }
}

/// Either a loaded data-source record or a bare id.
///
/// Lookup operations accept both and normalize before querying.
#[derive(Debug, Clone)]
pub enum DatasourceHandle {
    Id(DatasourceId),
    Record(Box<Datasource>),
}

impl From<DatasourceId> for DatasourceHandle {
    fn from(id: DatasourceId) -> Self {
        Self::Id(id)
    }
}

impl From<Datasource> for DatasourceHandle {
    fn from(datasource: Datasource) -> Self {
        Self::Record(Box::new(datasource))
    }
}

impl From<&Datasource> for DatasourceHandle {
    fn from(datasource: &Datasource) -> Self {
        Self::Record(Box::new(datasource.clone()))
    }
}

/// Per-datasource-id reconciliation locks.
///
/// Two overlapping reconciliations of the same data source would race on
/// the cached column set; one mutex per id serializes them.
#[derive(Default)]
struct ReconcileLocks {
    inner: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReconcileLocks {
    fn for_id(&self, id: DatasourceId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(id.0).or_default().clone()
    }
}

/// The data-source service: provisioning, persistence, and column
/// reconciliation.
pub struct DatasourceService {
    datasources: Arc<dyn DatasourceStore>,
    columns: Arc<dyn ColumnStore>,
    gateway: Arc<dyn DatabaseGateway>,
    engines: EnginesConfig,
    reconcile_locks: ReconcileLocks,
}

impl DatasourceService {
    pub fn new(
        datasources: Arc<dyn DatasourceStore>,
        columns: Arc<dyn ColumnStore>,
        gateway: Arc<dyn DatabaseGateway>,
        engines: EnginesConfig,
    ) -> Self {
        Self {
            datasources,
            columns,
            gateway,
            engines,
            reconcile_locks: ReconcileLocks::default(),
        }
    }

    /// Prepare a new data source for a user on the given engine.
    ///
    /// Builds the candidate from the engine's name templates and the derived
    /// password, then confirms access: either the account already exists and
    /// opens, or it is provisioned on the spot through the administrative
    /// connection. The returned record is NOT persisted; `save_datasource`
    /// is the explicit persistence step.
    ///
    /// After a successful administrative creation the connection is not
    /// re-verified by reopening; one round trip is saved at the cost of
    /// trusting the engine's account creation.
    pub async fn prepare_new_datasource_for_user(
        &self,
        user: &User,
        engine: DbEngine,
    ) -> Result<Datasource> {
        if !self.gateway.supported_engines().contains(&engine) {
            return Err(ServiceError::UnsupportedEngine(engine));
        }
        let config = self
            .engines
            .get(engine)
            .ok_or(ServiceError::UnsupportedEngine(engine))?;

        let candidate = Datasource {
            id: None,
            engine,
            db_name: config.database_template.render(user.user_id),
            db_username: config.username_template.render(user.user_id),
            db_password: derive_db_password(&user.db_secret, user.user_id)?,
            db_server: config.server.clone(),
            db_port: config.port,
            db_table: None,
            user_id: user.user_id,
        };

        match self.gateway.open_database(&candidate.connection()).await {
            Ok(session) => {
                self.close_session(session).await;
                debug!(user = %user.user_id, %engine, db = %candidate.db_name,
                       "Existing account is reachable");
                Ok(candidate)
            }
            Err(GatewayError::Connection(reason)) => {
                debug!(user = %user.user_id, %engine, %reason,
                       "Direct connection failed, provisioning");
                self.provision(&candidate).await?;
                Ok(candidate)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Create the candidate's database and account through the
    /// administrative connection. Single attempt; both it and the earlier
    /// direct connection failing is terminal.
    async fn provision(&self, candidate: &Datasource) -> Result<()> {
        let admin = self
            .engines
            .admin_connection(candidate.engine)
            .ok_or(ServiceError::UnsupportedEngine(candidate.engine))?;

        let session = self
            .gateway
            .open_database(&admin)
            .await
            .map_err(|e| ServiceError::ProvisioningFailed(e.to_string()))?;

        let created = match session.create_user_database(&candidate.connection()).await {
            Ok(created) => created,
            Err(e) => {
                self.close_session(session).await;
                return Err(ServiceError::ProvisioningFailed(e.to_string()));
            }
        };
        self.close_session(session).await;

        if !created {
            return Err(ServiceError::ProvisioningFailed(format!(
                "engine reported no database created for {}",
                candidate.db_name
            )));
        }

        info!(user = %candidate.user_id, engine = %candidate.engine,
              db = %candidate.db_name, "User database provisioned");
        Ok(())
    }

    /// Persist a data source and return it with its assigned id.
    ///
    /// With `reload_columns` the column metadata is reconciled right after,
    /// so it is never stale after a save that could have changed the backing
    /// table. A source with no backing table yet has nothing to reconcile
    /// and is returned as persisted.
    pub async fn save_datasource(
        &self,
        mut datasource: Datasource,
        reload_columns: bool,
    ) -> Result<Datasource> {
        let id = self.datasources.persist(&datasource).await?;
        datasource.id = Some(id);

        if reload_columns && datasource.db_table.is_some() {
            return self.reconcile_columns(&datasource).await;
        }
        Ok(datasource)
    }

    /// Reconcile cached column metadata against the live schema.
    ///
    /// Returns a freshly fetched record rather than mutating the argument.
    /// Live columns missing from the cache are added with no format mapping;
    /// cached columns gone from the live table are deleted; columns present
    /// on both sides keep their `format_id`. Deletions only start once the
    /// live-schema pass has completed, so a mid-pass schema read error
    /// cannot cost cached records.
    ///
    /// The pass assumes the live schema is stable for its duration; it is
    /// serialized per data source, not against external schema changes.
    pub async fn reconcile_columns(&self, datasource: &Datasource) -> Result<Datasource> {
        let id = datasource.id.ok_or(ServiceError::Unpersisted)?;
        let table = datasource
            .db_table
            .as_deref()
            .ok_or(ServiceError::NoBackingTable(id))?;

        let lock = self.reconcile_locks.for_id(id);
        let _guard = lock.lock().await;

        // Cached state first: a catalog error here must not leave a session
        // behind to clean up.
        let mut cached: HashMap<String, DatasourceColumn> = self
            .columns
            .columns_for(id)
            .await?
            .into_iter()
            .map(|column| (column.name.clone(), column))
            .collect();

        // The data source's own connection, never the administrative one
        let session = self.gateway.open_database(&datasource.connection()).await?;

        let live = match session.list_columns(table).await {
            Ok(live) => live,
            Err(e) => {
                self.close_session(session).await;
                return Err(e.into());
            }
        };
        self.close_session(session).await;

        let mut added = 0usize;
        for descriptor in &live {
            if cached.remove(&descriptor.name).is_none() {
                self.columns
                    .persist(&DatasourceColumn {
                        id: None,
                        datasource_id: id,
                        name: descriptor.name.clone(),
                        format_id: None,
                    })
                    .await?;
                added += 1;
            }
        }

        // Whatever the live pass did not confirm no longer exists
        let removed = cached.len();
        for column in cached.into_values() {
            if let Some(column_id) = column.id {
                self.columns.delete(column_id).await?;
            }
        }

        debug!(datasource = %id, %table, live = live.len(), added, removed,
               "Columns reconciled");

        self.datasources
            .find(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Whether every column of the data source is mapped to a format.
    ///
    /// Short-circuits false on the first unmapped column. Whether the
    /// referenced format id still exists in the knowledge base is not
    /// checked here; that lives with the format workflow.
    pub async fn check_datasource_columns_format_mappings(
        &self,
        datasource: impl Into<DatasourceHandle>,
        reload_columns: bool,
    ) -> Result<bool> {
        let datasource = self.resolve(datasource.into()).await?;
        let datasource = if reload_columns {
            self.reconcile_columns(&datasource).await?
        } else {
            datasource
        };
        let id = datasource.id.ok_or(ServiceError::Unpersisted)?;

        for column in self.columns.columns_for(id).await? {
            if column.format_id.is_none() {
                debug!(datasource = %id, column = %column.name, "Column has no format mapping");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete a data source. Column records go with it (catalog contract).
    ///
    /// Returns the number of data sources deleted.
    pub async fn delete_datasource(&self, datasource: impl Into<DatasourceHandle>) -> Result<u64> {
        let id = match datasource.into() {
            DatasourceHandle::Id(id) => id,
            DatasourceHandle::Record(record) => record.id.ok_or(ServiceError::Unpersisted)?,
        };
        let deleted = self.datasources.delete(id).await?;
        info!(datasource = %id, deleted, "Datasource deleted");
        Ok(deleted)
    }

    /// Look up a data source by id.
    pub async fn find_datasource(&self, id: DatasourceId) -> Result<Datasource> {
        self.datasources
            .find(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// All data sources owned by a user (accepts a `&User` or a bare id).
    pub async fn find_datasources_by_user(
        &self,
        user: impl Into<UserId>,
    ) -> Result<Vec<Datasource>> {
        Ok(self.datasources.find_by_user(user.into()).await?)
    }

    async fn resolve(&self, handle: DatasourceHandle) -> Result<Datasource> {
        match handle {
            DatasourceHandle::Id(id) => self.find_datasource(id).await,
            DatasourceHandle::Record(record) => Ok(*record),
        }
    }

    async fn close_session(&self, session: Box<dyn DatabaseSession>) {
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close database session");
        }
    }
}
