//! Per-engine provisioning configuration.
//!
//! Maps each supported engine to its server coordinates, administrative
//! credentials, and the name templates used to stamp out per-user database
//! and account names.

use lodeflow_catalog::UserId;
use lodeflow_gateway::{DbConnection, DbEngine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Placeholder replaced by the numeric user id when a template is rendered.
pub const TEMPLATE_PLACEHOLDER: char = '*';

/// A declarative name template containing the `*` placeholder.
///
/// Construction rejects templates without the placeholder, so a config that
/// would give every user the same database name fails at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NameTemplate(String);

impl NameTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, String> {
        let template = template.into();
        if !template.contains(TEMPLATE_PLACEHOLDER) {
            return Err(format!(
                "name template {template:?} has no {TEMPLATE_PLACEHOLDER:?} placeholder"
            ));
        }
        Ok(Self(template))
    }

    /// Substitute the user's numeric id for the placeholder.
    pub fn render(&self, user_id: UserId) -> String {
        self.0
            .replace(TEMPLATE_PLACEHOLDER, &user_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NameTemplate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NameTemplate> for String {
    fn from(value: NameTemplate) -> Self {
        value.0
    }
}

/// Configuration entry for one engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server host
    pub server: String,
    /// Server port; engine default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// Administrative account name
    pub username: String,
    /// Administrative account password
    pub password: String,
    /// Template for per-user database names, e.g. `app_*`
    pub database_template: NameTemplate,
    /// Template for per-user account names
    pub username_template: NameTemplate,
}

/// Engine-type to configuration mapping, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub engines: HashMap<DbEngine, EngineConfig>,
}

impl EnginesConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::ServiceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::ServiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::ServiceError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| crate::ServiceError::Config(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    /// Configuration for one engine, if present.
    pub fn get(&self, engine: DbEngine) -> Option<&EngineConfig> {
        self.engines.get(&engine)
    }

    /// Administrative connection for the given engine.
    ///
    /// Opens without selecting a database; the administrative account is the
    /// one capable of creating new databases and accounts.
    pub fn admin_connection(&self, engine: DbEngine) -> Option<DbConnection> {
        let config = self.get(engine)?;
        Some(DbConnection {
            engine,
            server: config.server.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            database: None,
        })
    }
}
