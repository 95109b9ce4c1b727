//! Configuration management for the rollback copy engine.
//!
//! Layers, lowest first: built-in defaults, an optional TOML file,
//! `ROLLBACK_COPY__<SECTION>__<KEY>` environment variables and finally the
//! variables the etcd static pod already exports (`ETCD_NAME`,
//! `ETCDCTL_CERT`, `ETCDCTL_KEY`, `ETCDCTL_CACERT`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::{ResourceSet, DEFAULT_RESOURCE_PREFIXES};
use crate::utils::{Result, RollbackError};

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "ROLLBACK_COPY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub etcd: EtcdConfig,
    #[serde(default)]
    pub member: MemberConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    /// Client endpoints used for the member list, key reads and snapshots
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Client certificate (PEM)
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Client key (PEM)
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Trusted CA bundle (PEM)
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Name of the local etcd member, used for the leadership check
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory holding `static-pod-resources/` and `rollbackcopy/`
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// How often a non-leader re-checks leadership
    #[serde(default = "default_leadership_check_interval_secs")]
    pub leadership_check_interval_secs: u64,

    /// How often the leader takes a backup
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,

    /// Revision directory prefixes archived with every snapshot
    #[serde(default = "default_resource_prefixes")]
    pub resource_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_endpoints() -> Vec<String> {
    vec!["https://localhost:2379".to_string()]
}

fn default_dial_timeout_secs() -> u64 {
    2
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/kubernetes")
}

fn default_leadership_check_interval_secs() -> u64 {
    5 * 60
}

fn default_backup_interval_secs() -> u64 {
    60 * 60
}

fn default_resource_prefixes() -> Vec<String> {
    DEFAULT_RESOURCE_PREFIXES.iter().map(|p| p.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EtcdConfig {
    fn default() -> Self {
        EtcdConfig {
            endpoints: default_endpoints(),
            cert_file: None,
            key_file: None,
            ca_file: None,
            dial_timeout_secs: default_dial_timeout_secs(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            config_dir: default_config_dir(),
            leadership_check_interval_secs: default_leadership_check_interval_secs(),
            backup_interval_secs: default_backup_interval_secs(),
            resource_prefixes: default_resource_prefixes(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the layered configuration, reading `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_sources(path, true)?;
        config.apply_operator_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_sources(path: Option<&Path>, with_env: bool) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        if with_env {
            builder = builder.add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("etcd.endpoints")
                    .with_list_parse_key("backup.resource_prefixes")
                    .try_parsing(true),
            );
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)
    }

    /// Apply the variables exported to the etcd static pod.
    fn apply_operator_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = non_empty("ETCD_NAME") {
            self.member.name = name;
        }
        if let Some(cert) = non_empty("ETCDCTL_CERT") {
            self.etcd.cert_file = Some(PathBuf::from(cert));
        }
        if let Some(key) = non_empty("ETCDCTL_KEY") {
            self.etcd.key_file = Some(PathBuf::from(key));
        }
        if let Some(ca) = non_empty("ETCDCTL_CACERT") {
            self.etcd.ca_file = Some(PathBuf::from(ca));
        }
    }

    /// Apply command line flags; an absent flag keeps the configured value.
    pub fn apply_cli_overrides(&mut self, config_dir: Option<PathBuf>, log_level: Option<String>) {
        if let Some(dir) = config_dir {
            self.backup.config_dir = dir;
        }
        if let Some(level) = log_level {
            self.log.level = level;
        }
    }

    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.member.name.trim().is_empty() {
            return Err(RollbackError::Config(
                "local etcd member name is not set (ETCD_NAME)".into(),
            ));
        }
        if self.etcd.endpoints.is_empty() {
            return Err(RollbackError::Config("no etcd endpoints configured".into()));
        }
        let backup = &self.backup;
        if backup.leadership_check_interval_secs == 0 || backup.backup_interval_secs == 0 {
            return Err(RollbackError::Config("intervals must be greater than zero".into()));
        }
        if self.backup.resource_prefixes.is_empty() {
            return Err(RollbackError::Config("no resource prefixes configured".into()));
        }
        let tls = [&self.etcd.cert_file, &self.etcd.key_file, &self.etcd.ca_file];
        let set = tls.iter().filter(|f| f.is_some()).count();
        if set != 0 && set != tls.len() {
            return Err(RollbackError::Config(
                "etcd TLS needs all of cert_file, key_file and ca_file".into(),
            ));
        }
        Ok(())
    }

    pub fn leadership_check_interval(&self) -> Duration {
        Duration::from_secs(self.backup.leadership_check_interval_secs)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup.backup_interval_secs)
    }

    pub fn resources(&self) -> ResourceSet {
        ResourceSet::new(self.backup.resource_prefixes.iter().cloned())
    }
}

fn config_error(e: ::config::ConfigError) -> RollbackError {
    RollbackError::Config(e.to_string())
}
