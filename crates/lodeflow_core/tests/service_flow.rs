//! End-to-end service behavior against an in-memory catalog and a scripted
//! fake gateway.

use async_trait::async_trait;
use lodeflow_catalog::{
    Catalog, CatalogError, ColumnId, ColumnStore, DatasourceColumn, DatasourceId, UserId,
};
use lodeflow_core::{derive_db_password, DatasourceService, EnginesConfig, ServiceError, User};
use lodeflow_gateway::{
    ColumnDescriptor, DatabaseGateway, DatabaseSession, DbConnection, DbEngine, GatewayError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const CONFIG: &str = r#"
    [engines.mysql]
    server = "db.internal"
    port = 3307
    username = "root"
    password = "admin-pw"
    database_template = "app_*"
    username_template = "app_*"
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CreateBehavior {
    /// Create the account and make it reachable
    #[default]
    Succeed,
    /// Report `false` without creating anything
    ReportFalse,
    /// Fail with a provisioning error
    Fail,
}

#[derive(Default)]
struct FakeState {
    /// Database names reachable with the user's own credentials
    reachable: HashSet<String>,
    admin_reachable: bool,
    /// Live schema: table name -> column names
    tables: HashMap<String, Vec<String>>,
    create: CreateBehavior,
    /// (database, username) pairs passed to create_user_database
    created: Vec<(String, String)>,
    /// Audit of open attempts; administrative opens record "<admin>"
    opened: Vec<String>,
}

#[derive(Clone)]
struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGateway {
    fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl DatabaseGateway for FakeGateway {
    async fn open_database(
        &self,
        conn: &DbConnection,
    ) -> Result<Box<dyn DatabaseSession>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        match &conn.database {
            None => {
                state.opened.push("<admin>".into());
                if !state.admin_reachable {
                    return Err(GatewayError::connection("admin account rejected"));
                }
            }
            Some(db) => {
                state.opened.push(db.clone());
                if !state.reachable.contains(db) {
                    return Err(GatewayError::connection(format!("unknown database {db}")));
                }
            }
        }
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }

    fn supported_engines(&self) -> &'static [DbEngine] {
        &[DbEngine::MySql]
    }
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, GatewayError> {
        let state = self.state.lock().unwrap();
        let columns = state
            .tables
            .get(table)
            .ok_or_else(|| GatewayError::TableNotFound(table.to_string()))?;
        Ok(columns
            .iter()
            .map(|name| ColumnDescriptor {
                name: name.clone(),
                data_type: "text".into(),
            })
            .collect())
    }

    async fn create_user_database(&self, target: &DbConnection) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().unwrap();
        match state.create {
            CreateBehavior::Succeed => {
                let db = target.database.clone().unwrap();
                state.created.push((db.clone(), target.username.clone()));
                state.reachable.insert(db);
                Ok(true)
            }
            CreateBehavior::ReportFalse => Ok(false),
            CreateBehavior::Fail => Err(GatewayError::provision("engine refused")),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Column store that can be switched to reject reads, for exercising the
/// catalog-error path of reconciliation.
struct FlakyColumns {
    inner: Arc<Catalog>,
    fail_reads: AtomicBool,
}

#[async_trait]
impl ColumnStore for FlakyColumns {
    async fn columns_for(
        &self,
        datasource_id: DatasourceId,
    ) -> Result<Vec<DatasourceColumn>, CatalogError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CatalogError::invalid_record("column read rejected"));
        }
        self.inner.columns_for(datasource_id).await
    }

    async fn persist(&self, column: &DatasourceColumn) -> Result<ColumnId, CatalogError> {
        ColumnStore::persist(self.inner.as_ref(), column).await
    }

    async fn delete(&self, id: ColumnId) -> Result<u64, CatalogError> {
        ColumnStore::delete(self.inner.as_ref(), id).await
    }
}

async fn service_with(state: FakeState) -> (DatasourceService, Arc<Catalog>, FakeGateway) {
    let catalog = Arc::new(Catalog::open_in_memory().await.unwrap());
    let gateway = FakeGateway::new(state);
    let engines = EnginesConfig::from_toml(CONFIG).unwrap();
    let service = DatasourceService::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(gateway.clone()),
        engines,
    );
    (service, catalog, gateway)
}

fn user() -> User {
    User {
        user_id: UserId(42),
        db_secret: "super-secret".into(),
    }
}

fn column_names(columns: &[DatasourceColumn]) -> Vec<&str> {
    columns.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn prepare_uses_templates_and_derived_password() {
    let (service, catalog, gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        ..Default::default()
    })
    .await;

    let candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();

    assert_eq!(candidate.db_name, "app_42");
    assert_eq!(candidate.db_username, "app_42");
    assert_eq!(candidate.db_server, "db.internal");
    assert_eq!(candidate.db_port, Some(3307));
    assert_eq!(
        candidate.db_password,
        derive_db_password("super-secret", UserId(42)).unwrap()
    );
    assert_eq!(candidate.id, None);

    // Not persisted, and no provisioning happened
    assert!(service.find_datasources_by_user(UserId(42)).await.unwrap().is_empty());
    let state = gateway.state.lock().unwrap();
    assert!(state.created.is_empty());
    assert_eq!(state.opened, vec!["app_42"]);
    drop(state);
    drop(catalog);
}

#[tokio::test]
async fn prepare_rejects_unsupported_engine_before_io() {
    let (service, _catalog, gateway) = service_with(FakeState {
        admin_reachable: true,
        ..Default::default()
    })
    .await;

    let err = service
        .prepare_new_datasource_for_user(&user(), DbEngine::Postgres)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnsupportedEngine(DbEngine::Postgres)));
    assert!(gateway.state.lock().unwrap().opened.is_empty());
}

#[tokio::test]
async fn prepare_falls_back_to_provisioning() {
    let (service, _catalog, gateway) = service_with(FakeState {
        admin_reachable: true,
        ..Default::default()
    })
    .await;

    let candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    assert_eq!(candidate.db_name, "app_42");

    let state = gateway.state.lock().unwrap();
    assert_eq!(state.created, vec![("app_42".to_string(), "app_42".to_string())]);
    // Direct attempt first, administrative connection only after it failed
    assert_eq!(state.opened, vec!["app_42", "<admin>"]);
    assert!(state.reachable.contains("app_42"));
}

#[tokio::test]
async fn prepare_fails_terminally_when_admin_unreachable() {
    let (service, catalog, _gateway) = service_with(FakeState::default()).await;

    let err = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ProvisioningFailed(_)));
    assert!(service.find_datasources_by_user(UserId(42)).await.unwrap().is_empty());
    drop(catalog);
}

#[tokio::test]
async fn prepare_fails_terminally_when_creation_reports_false() {
    let (service, _catalog, _gateway) = service_with(FakeState {
        admin_reachable: true,
        create: CreateBehavior::ReportFalse,
        ..Default::default()
    })
    .await;

    let err = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ProvisioningFailed(_)));
}

#[tokio::test]
async fn prepare_fails_terminally_when_creation_errors() {
    let (service, _catalog, _gateway) = service_with(FakeState {
        admin_reachable: true,
        create: CreateBehavior::Fail,
        ..Default::default()
    })
    .await;

    let err = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ProvisioningFailed(_)));
}

#[tokio::test]
async fn save_with_reload_populates_columns() {
    let (service, catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string(), "income".to_string()])]
            .into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());

    let saved = service.save_datasource(candidate, true).await.unwrap();
    let id = saved.id.unwrap();

    let columns = catalog.columns_for(id).await.unwrap();
    assert_eq!(column_names(&columns), vec!["age", "income"]);
    assert!(columns.iter().all(|c| c.format_id.is_none()));
}

#[tokio::test]
async fn save_without_table_skips_reconciliation() {
    let (service, catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        ..Default::default()
    })
    .await;

    let candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    let saved = service.save_datasource(candidate, true).await.unwrap();

    let id = saved.id.unwrap();
    assert!(catalog.columns_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let (service, catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string(), "income".to_string()])]
            .into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, true).await.unwrap();

    let first = catalog.columns_for(saved.id.unwrap()).await.unwrap();
    service.reconcile_columns(&saved).await.unwrap();
    let second = catalog.columns_for(saved.id.unwrap()).await.unwrap();

    // Identical record set: same ids, names, and format mappings
    assert_eq!(first, second);
}

#[tokio::test]
async fn reconcile_tracks_live_schema_and_preserves_formats() {
    let (service, catalog, gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string(), "income".to_string()])]
            .into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, true).await.unwrap();
    let id = saved.id.unwrap();

    // Map "income" to a format
    let income = catalog
        .columns_for(id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "income")
        .unwrap();
    ColumnStore::persist(
        catalog.as_ref(),
        &DatasourceColumn {
            format_id: Some(7),
            ..income
        },
    )
    .await
    .unwrap();

    // Live schema changes: "age" dropped, "score" added
    gateway.state.lock().unwrap().tables.insert(
        "transactions".into(),
        vec!["income".to_string(), "score".to_string()],
    );

    service.reconcile_columns(&saved).await.unwrap();

    let columns = catalog.columns_for(id).await.unwrap();
    assert_eq!(column_names(&columns), vec!["income", "score"]);
    let by_name: HashMap<_, _> = columns.iter().map(|c| (c.name.as_str(), c)).collect();
    assert_eq!(by_name["income"].format_id, Some(7));
    assert_eq!(by_name["score"].format_id, None);
}

#[tokio::test]
async fn reconcile_opens_no_session_when_column_read_fails() {
    let catalog = Arc::new(Catalog::open_in_memory().await.unwrap());
    let gateway = FakeGateway::new(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string()])].into(),
        ..Default::default()
    });
    let columns = Arc::new(FlakyColumns {
        inner: catalog.clone(),
        fail_reads: AtomicBool::new(false),
    });
    let service = DatasourceService::new(
        catalog.clone(),
        columns.clone(),
        Arc::new(gateway.clone()),
        EnginesConfig::from_toml(CONFIG).unwrap(),
    );

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, false).await.unwrap();
    assert_eq!(gateway.state.lock().unwrap().opened, vec!["app_42"]);

    columns.fail_reads.store(true, Ordering::SeqCst);
    let err = service.reconcile_columns(&saved).await.unwrap_err();
    assert!(matches!(err, ServiceError::Catalog(_)));
    // The pass failed before any live connection was opened, so there is no
    // session left to close
    assert_eq!(gateway.state.lock().unwrap().opened, vec!["app_42"]);
}

#[tokio::test]
async fn designating_a_table_later_reconciles_columns() {
    let (service, catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string(), "income".to_string()])]
            .into(),
        ..Default::default()
    })
    .await;

    let candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    let saved = service.save_datasource(candidate, false).await.unwrap();
    let id = saved.id.unwrap();
    assert!(catalog.columns_for(id).await.unwrap().is_empty());

    // The table is chosen after the fact; resaving with reload fills in the
    // column metadata on the same record
    let mut saved = saved;
    saved.db_table = Some("transactions".into());
    let resaved = service.save_datasource(saved, true).await.unwrap();

    assert_eq!(resaved.id, Some(id));
    assert_eq!(resaved.db_table.as_deref(), Some("transactions"));
    let columns = catalog.columns_for(id).await.unwrap();
    assert_eq!(column_names(&columns), vec!["age", "income"]);
}

#[tokio::test]
async fn reconcile_requires_persisted_record_and_table() {
    let (service, _catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        ..Default::default()
    })
    .await;

    let candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    let err = service.reconcile_columns(&candidate).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unpersisted));

    let saved = service.save_datasource(candidate, false).await.unwrap();
    let err = service.reconcile_columns(&saved).await.unwrap_err();
    assert!(matches!(err, ServiceError::NoBackingTable(_)));
}

#[tokio::test]
async fn reconcile_failure_leaves_cached_columns_alone() {
    let (service, catalog, gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string(), "income".to_string()])]
            .into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, true).await.unwrap();
    let id = saved.id.unwrap();

    // The backing table disappears: the pass must fail before any deletion
    gateway.state.lock().unwrap().tables.clear();

    let err = service.reconcile_columns(&saved).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Gateway(GatewayError::TableNotFound(_))
    ));
    assert_eq!(catalog.columns_for(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn check_mappings_short_circuits_on_unmapped_column() {
    let (service, catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string(), "income".to_string()])]
            .into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, true).await.unwrap();
    let id = saved.id.unwrap();

    // income mapped, age not
    let income = catalog
        .columns_for(id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "income")
        .unwrap();
    ColumnStore::persist(
        catalog.as_ref(),
        &DatasourceColumn {
            format_id: Some(7),
            ..income
        },
    )
    .await
    .unwrap();

    assert!(!service
        .check_datasource_columns_format_mappings(id, false)
        .await
        .unwrap());

    // Map the rest: the check flips
    let age = catalog
        .columns_for(id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "age")
        .unwrap();
    ColumnStore::persist(
        catalog.as_ref(),
        &DatasourceColumn {
            format_id: Some(3),
            ..age
        },
    )
    .await
    .unwrap();

    assert!(service
        .check_datasource_columns_format_mappings(id, false)
        .await
        .unwrap());
}

#[tokio::test]
async fn check_mappings_with_reload_sees_new_live_columns() {
    let (service, catalog, gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string()])].into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, true).await.unwrap();
    let id = saved.id.unwrap();

    let age = catalog.columns_for(id).await.unwrap().remove(0);
    ColumnStore::persist(
        catalog.as_ref(),
        &DatasourceColumn {
            format_id: Some(3),
            ..age
        },
    )
    .await
    .unwrap();
    assert!(service
        .check_datasource_columns_format_mappings(id, false)
        .await
        .unwrap());

    // A column appears live; without reload the stale cache still passes
    gateway
        .state
        .lock()
        .unwrap()
        .tables
        .get_mut("transactions")
        .unwrap()
        .push("score".to_string());
    assert!(service
        .check_datasource_columns_format_mappings(id, false)
        .await
        .unwrap());
    assert!(!service
        .check_datasource_columns_format_mappings(id, true)
        .await
        .unwrap());
}

#[tokio::test]
async fn delete_removes_datasource_and_columns() {
    let (service, catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        tables: [("transactions".to_string(), vec!["age".to_string()])].into(),
        ..Default::default()
    })
    .await;

    let mut candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    candidate.db_table = Some("transactions".into());
    let saved = service.save_datasource(candidate, true).await.unwrap();
    let id = saved.id.unwrap();

    let deleted = service.delete_datasource(saved).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(catalog.columns_for(id).await.unwrap().is_empty());
    assert!(matches!(
        service.find_datasource(id).await.unwrap_err(),
        ServiceError::NotFound(_)
    ));
}

#[tokio::test]
async fn find_by_user_accepts_user_or_id() {
    let (service, _catalog, _gateway) = service_with(FakeState {
        reachable: ["app_42".to_string()].into(),
        ..Default::default()
    })
    .await;

    let candidate = service
        .prepare_new_datasource_for_user(&user(), DbEngine::MySql)
        .await
        .unwrap();
    service.save_datasource(candidate, false).await.unwrap();

    let owner = user();
    assert_eq!(service.find_datasources_by_user(&owner).await.unwrap().len(), 1);
    assert_eq!(service.find_datasources_by_user(UserId(42)).await.unwrap().len(), 1);
    assert!(service.find_datasources_by_user(UserId(7)).await.unwrap().is_empty());
}
