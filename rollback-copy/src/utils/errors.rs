//! Custom error types for the rollback copy engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backup descriptor error: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    /// The local member is registered but has not published a client URL yet.
    #[error("etcd member {0} has not started")]
    MemberNotStarted(String),

    /// No member with the local name is part of the cluster.
    #[error("etcd member {0} not found in member list, leadership unknown")]
    LeadershipUnknown(String),

    #[error("Cluster version unavailable: {0}")]
    ClusterVersion(String),

    #[error("Source directory {} does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("No revision starting with {prefix} found in {}", dir.display())]
    ResourceNotFound { prefix: String, dir: PathBuf },

    #[error("Could not add {} to archive: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, RollbackError>;
