//! Startup configuration
//!
//! Read once from YAML, then overridden from `REQHUB_*` environment
//! variables. A missing file means defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::ReferenceIdStrategy;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "REQHUB_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://path`, `sqlite::memory:` or a bare path
    pub dsn: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    pub reference_ids: ReferenceIdStrategy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite://reqhub.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 5_000,
            reference_ids: ReferenceIdStrategy::Trigger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    /// No admin is created while this is unset
    pub password: Option<String>,
}

impl Default for BootstrapAdmin {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            email: "admin@localhost".to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub kdf: KdfConfig,
    pub session_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub pat_prefix: String,
    pub bootstrap_admin: BootstrapAdmin,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            kdf: KdfConfig::default(),
            session_ttl_secs: 900,
            refresh_ttl_secs: 2_592_000,
            pat_prefix: "mcp_pat_".to_string(),
            bootstrap_admin: BootstrapAdmin::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Use the FTS5 index; substring matching otherwise
    pub full_text: bool,
    pub max_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            full_text: true,
            max_limit: 100,
        }
    }
}

impl Config {
    /// Loads the config from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let content = fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                Self::from_yaml(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p))?
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies `REQHUB_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dsn) = lookup("REQHUB_DATABASE_DSN") {
            self.database.dsn = dsn;
        }
        if let Some(size) = lookup("REQHUB_DATABASE_POOL_SIZE") {
            match size.trim().parse() {
                Ok(size) => self.database.pool_size = size,
                Err(_) => tracing::warn!(value = %size, "ignoring invalid REQHUB_DATABASE_POOL_SIZE"),
            }
        }
        if let Some(addr) = lookup("REQHUB_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(prefix) = lookup("REQHUB_PAT_PREFIX") {
            self.auth.pat_prefix = prefix;
        }
        if let Some(password) = lookup("REQHUB_ADMIN_PASSWORD") {
            self.auth.bootstrap_admin.password = Some(password);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            bail!("database.pool_size must be at least 1");
        }
        if self.auth.pat_prefix.trim().is_empty() {
            bail!("auth.pat_prefix must not be empty");
        }
        if self.auth.session_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            bail!("auth session and refresh TTLs must be positive");
        }
        if self.search.max_limit == 0 {
            bail!("search.max_limit must be at least 1");
        }
        let kdf = self.auth.kdf;
        argon2::Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, None)
            .map_err(|e| anyhow::anyhow!("auth.kdf parameters rejected: {}", e))?;
        Ok(())
    }

    /// Writes the config as YAML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;
        Ok(())
    }
}

/// `$REQHUB_CONFIG`, else `<config dir>/reqhub/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("reqhub").join("config.yaml"))
}
