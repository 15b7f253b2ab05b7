//! Workspace configuration for seopilot

use crate::backup::BackupPolicy;
use crate::site::{Actor, ProviderRegistry, Role};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace state directory
pub const WORKSPACE_DIR: &str = ".seopilot";

/// Database file inside the workspace directory
pub const DATABASE_FILE: &str = "seopilot.db";

const CONFIG_FILE: &str = "config.toml";

/// Configuration for a seopilot workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Principal the pipeline acts as
    #[serde(default)]
    pub actor: ActorConfig,

    /// Enabled SEO metadata providers
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Backup capture and retention
    #[serde(default)]
    pub backup: BackupConfig,

    /// Audit log retention
    #[serde(default)]
    pub audit: AuditConfig,

    /// Batch implementation settings
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Site-level settings
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    #[serde(default = "default_actor_id")]
    pub id: i64,

    #[serde(default = "default_role")]
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider names: yoast, rank_math, aioseo
    #[serde(default = "default_providers")]
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Backups older than this many days are removed by cleanup
    #[serde(default = "default_backup_retention")]
    pub retention_days: u32,

    /// Metadata key prefixes captured in addition to the provider namespaces
    #[serde(default = "default_meta_prefixes")]
    pub meta_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_retention")]
    pub retention_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Maximum approved changes pulled per run
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Seconds between runs in `run` mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Prefix of the plugin's own site options
    #[serde(default = "default_option_prefix")]
    pub option_prefix: String,
}

fn default_actor_id() -> i64 {
    1
}

fn default_role() -> Role {
    Role::Administrator
}

fn default_providers() -> Vec<String> {
    vec!["yoast".to_string()]
}

fn default_backup_retention() -> u32 {
    30
}

fn default_meta_prefixes() -> Vec<String> {
    crate::backup::DEFAULT_META_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_audit_retention() -> u32 {
    90
}

fn default_batch_limit() -> usize {
    crate::automation::DEFAULT_BATCH_LIMIT
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_option_prefix() -> String {
    crate::backup::DEFAULT_OPTION_PREFIX.to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            id: default_actor_id(),
            role: default_role(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: default_providers(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_backup_retention(),
            meta_prefixes: default_meta_prefixes(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: default_audit_retention(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            option_prefix: default_option_prefix(),
        }
    }
}

impl Config {
    /// Path of the workspace configuration file
    pub fn workspace_path(root: &Path) -> PathBuf {
        root.join(WORKSPACE_DIR).join(CONFIG_FILE)
    }

    /// Path of the per-user configuration file, if the platform has one
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seopilot").join(CONFIG_FILE))
    }

    /// Load the workspace config, then the user config, else defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let workspace = Self::workspace_path(root);
        if workspace.exists() {
            return Self::load(&workspace);
        }

        if let Some(user) = Self::user_path() {
            if user.exists() {
                return Self::load(&user);
            }
        }

        Ok(Self::default())
    }

    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Save configuration into the workspace
    pub fn save(&self, root: &Path) -> Result<()> {
        let workspace_dir = root.join(WORKSPACE_DIR);
        std::fs::create_dir_all(&workspace_dir)?;

        let config_path = workspace_dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Look up a single value by dotted key, e.g. `backup.retention_days`
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "actor.id" => self.actor.id.to_string(),
            "actor.role" => self.actor.role.to_string(),
            "providers.enabled" => self.providers.enabled.join(","),
            "backup.retention_days" => self.backup.retention_days.to_string(),
            "backup.meta_prefixes" => self.backup.meta_prefixes.join(","),
            "audit.retention_days" => self.audit.retention_days.to_string(),
            "automation.batch_limit" => self.automation.batch_limit.to_string(),
            "automation.interval_secs" => self.automation.interval_secs.to_string(),
            "site.option_prefix" => self.site.option_prefix.clone(),
            _ => return None,
        };
        Some(value)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.actor.id, self.actor.role)
    }

    /// Build the provider registry from `providers.enabled`
    pub fn provider_registry(&self) -> Result<ProviderRegistry> {
        ProviderRegistry::from_names(&self.providers.enabled)
            .context("Invalid [providers] configuration")
    }

    /// Backup capture policy, including provider namespaces
    pub fn backup_policy(&self, providers: &ProviderRegistry) -> BackupPolicy {
        BackupPolicy {
            meta_prefixes: self.backup.meta_prefixes.clone(),
            option_prefix: self.site.option_prefix.clone(),
            settings_options: Vec::new(),
        }
        .with_providers(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.actor(), Actor::administrator());
        assert_eq!(config.providers.enabled, vec!["yoast"]);
        assert_eq!(config.automation.batch_limit, 50);
        assert_eq!(config.site.option_prefix, "seopilot_");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [actor]
            role = "editor"

            [providers]
            enabled = ["rank_math", "aioseo"]
            "#,
        )
        .unwrap();

        assert_eq!(config.actor.id, 1);
        assert_eq!(config.actor.role, Role::Editor);
        assert_eq!(config.backup.retention_days, 30);
        assert_eq!(config.provider_registry().unwrap().len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.audit.retention_days = 7;
        config.save(dir.path()).unwrap();

        let loaded = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.get("audit.retention_days").as_deref(), Some("7"));
        assert_eq!(loaded.get("nope"), None);
    }

    #[test]
    fn test_backup_policy_includes_providers() {
        let config = Config::default();
        let providers = config.provider_registry().unwrap();
        let policy = config.backup_policy(&providers);
        assert!(policy.meta_prefixes.iter().any(|p| p == "_seopilot_"));
        assert!(policy.meta_prefixes.len() > 2);
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = Config::default();
        config.providers.enabled = vec!["moz".to_string()];
        assert!(config.provider_registry().is_err());
    }
}
