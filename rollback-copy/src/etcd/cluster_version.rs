//! Reads the cluster version record stored in etcd by the API server.

use serde::Deserialize;
use tracing::{debug, info};

use super::EtcdStore;
use crate::utils::{Result, RollbackError};

/// Key of the `ClusterVersion` resource named `version`.
pub const CLUSTER_VERSION_KEY: &str = "/kubernetes.io/config.openshift.io/clusterversions/version";

/// Version of the running cluster and whether it is being upgraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterVersionInfo {
    /// Version of the most recent history entry.
    pub version: String,
    /// The desired version differs from the most recent history entry.
    pub upgrading: bool,
}

#[derive(Debug, Deserialize)]
struct ClusterVersionResource {
    status: ClusterVersionStatus,
}

#[derive(Debug, Deserialize)]
struct ClusterVersionStatus {
    desired: Release,
    #[serde(default)]
    history: Vec<UpdateHistory>,
}

#[derive(Debug, Deserialize)]
struct Release {
    version: String,
}

#[derive(Debug, Deserialize)]
struct UpdateHistory {
    version: String,
    #[serde(default)]
    state: Option<String>,
}

impl ClusterVersionInfo {
    /// Parse the JSON encoded `ClusterVersion` resource.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let resource: ClusterVersionResource = serde_json::from_slice(raw)?;
        let status = resource.status;

        let latest = status
            .history
            .first()
            .ok_or_else(|| RollbackError::ClusterVersion("empty update history".into()))?;

        debug!(
            desired = %status.desired.version,
            latest = %latest.version,
            state = latest.state.as_deref().unwrap_or("unknown"),
            "Parsed cluster version"
        );

        Ok(Self {
            upgrading: status.desired.version != latest.version,
            version: latest.version.clone(),
        })
    }
}

/// Read the current cluster version and upgrade status from `store`.
///
/// Anything other than exactly one stored value is an error.
pub async fn read_cluster_version<S: EtcdStore>(store: &mut S) -> Result<ClusterVersionInfo> {
    let values = store.get(CLUSTER_VERSION_KEY).await?;
    let [value] = values.as_slice() else {
        return Err(RollbackError::ClusterVersion(format!(
            "expected a single value for {CLUSTER_VERSION_KEY}, got {}",
            values.len()
        )));
    };

    let info = ClusterVersionInfo::from_json(value)?;
    info!(version = %info.version, upgrading = info.upgrading, "Read cluster version");
    Ok(info)
}
