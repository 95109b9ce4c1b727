//! Backup descriptor stored as `backupenv.yaml` inside every backup directory.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::fs::ops::file_exists;
use crate::utils::Result;

/// File name of the descriptor inside a backup directory.
pub const DESCRIPTOR_FILE: &str = "backupenv.yaml";

/// Timestamp layout used in descriptors and backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Version metadata of one captured backup. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    /// Cluster software version active when the capture was taken.
    #[serde(rename = "ClusterVersion")]
    pub cluster_version: String,

    /// Capture time, `YYYY-MM-DD_HHMMSS`.
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
}

impl BackupDescriptor {
    pub fn new(cluster_version: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            cluster_version: cluster_version.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Descriptor for a capture taken at `at`.
    pub fn captured_at<Tz>(cluster_version: impl Into<String>, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self::new(cluster_version, at.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Read the descriptor of the backup directory `dir`.
    pub fn read(dir: &Path) -> Result<Self> {
        let raw = fs::read(dir.join(DESCRIPTOR_FILE))?;
        let descriptor = serde_yaml::from_slice(&raw)?;
        Ok(descriptor)
    }

    /// Read the descriptor of `dir`, logging and discarding any failure.
    pub fn read_optional(dir: &Path) -> Option<Self> {
        if !file_exists(&dir.join(DESCRIPTOR_FILE)) {
            debug!(dir = %dir.display(), "Backup directory has no descriptor");
            return None;
        }
        match Self::read(dir) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "No readable backup descriptor");
                None
            }
        }
    }

    /// Write this descriptor into the backup directory `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(dir.join(DESCRIPTOR_FILE), yaml)?;
        Ok(())
    }
}
