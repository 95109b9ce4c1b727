//! Backup cycle executor - captures one rollback copy and retains it.
//!
//! A cycle reads the cluster version, fills the scratch directory with a
//! snapshot, a resource archive and a descriptor, and hands the result to
//! [`rotate`]. The scratch directory is removed afterwards whatever happened.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::archive::{archive_latest_resources, ResourceSet};
use crate::config::Config;
use crate::etcd::cluster_version::read_cluster_version;
use crate::etcd::snapshot::save_snapshot;
use crate::etcd::{ClusterVersionInfo, EtcdStore};
use crate::fs::ops::{recreate_dir, remove_path};
use crate::fs::BackupDescriptor;
use crate::rotation::{rotate, RotationDecision, ROLLBACK_COPY_DIR, SCRATCH_DIR};
use crate::utils::Result;

/// Name of the snapshot file captured at `timestamp`.
pub fn snapshot_file_name(timestamp: &str) -> String {
    format!("snapshot_{timestamp}.db")
}

/// Name of the resource archive captured at `timestamp`.
pub fn archive_file_name(timestamp: &str) -> String {
    format!("static_kuberesources_{timestamp}.tar.gz")
}

/// Runs capture cycles against a config dir.
#[derive(Debug, Clone)]
pub struct BackupExecutor {
    config_dir: PathBuf,
    resources: ResourceSet,
}

impl BackupExecutor {
    pub fn new(config_dir: impl Into<PathBuf>, resources: ResourceSet) -> Self {
        Self {
            config_dir: config_dir.into(),
            resources,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backup.config_dir.clone(), config.resources())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// `<config_dir>/rollbackcopy`
    pub fn rollback_dir(&self) -> PathBuf {
        self.config_dir.join(ROLLBACK_COPY_DIR)
    }

    /// `<config_dir>/rollbackcopy/tmp`
    pub fn scratch_dir(&self) -> PathBuf {
        self.rollback_dir().join(SCRATCH_DIR)
    }

    /// Capture one backup from `store` and rotate it into the retention slots.
    ///
    /// Nothing under the slots is touched unless the snapshot, the archive
    /// and the descriptor were all written.
    pub async fn run_cycle<S: EtcdStore>(&self, store: &mut S) -> Result<RotationDecision> {
        let started = Instant::now();
        let cluster = read_cluster_version(store).await?;

        let scratch = self.scratch_dir();
        let result = self.capture_and_rotate(store, &scratch, &cluster).await;

        if let Err(e) = remove_path(&scratch) {
            warn!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }

        if let Ok(decision) = &result {
            info!(
                decision = ?decision,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Backup cycle finished"
            );
        }
        result
    }

    async fn capture_and_rotate<S: EtcdStore>(
        &self,
        store: &mut S,
        scratch: &Path,
        cluster: &ClusterVersionInfo,
    ) -> Result<RotationDecision> {
        recreate_dir(scratch)?;

        let descriptor = BackupDescriptor::captured_at(cluster.version.clone(), &Local::now());
        let timestamp = descriptor.timestamp.clone();

        save_snapshot(store, &scratch.join(snapshot_file_name(&timestamp))).await?;

        let config_dir = self.config_dir.clone();
        let resources = self.resources.clone();
        let archive = scratch.join(archive_file_name(&timestamp));
        tokio::task::spawn_blocking(move || {
            archive_latest_resources(&config_dir, &resources, &archive)
        })
        .await??;

        descriptor.write(scratch)?;

        rotate(&self.rollback_dir(), scratch, cluster.upgrading)
    }
}
