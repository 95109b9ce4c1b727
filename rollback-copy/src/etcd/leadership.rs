//! Leadership gate: only the etcd leader takes backups.

use tracing::{debug, error, info, warn};

use super::EtcdStore;
use crate::utils::{Result, RollbackError};

/// Outcome of a leadership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipStatus {
    /// The local member is the cluster leader.
    Leader,
    /// Another member leads the cluster.
    Follower,
    /// The local member is registered but has no client URL yet.
    MemberNotStarted,
    /// The local member is not in the member list.
    Unknown,
}

impl LeadershipStatus {
    pub fn is_leader(self) -> bool {
        self == LeadershipStatus::Leader
    }
}

/// Determine whether the member called `name` currently leads the cluster.
///
/// RPC failures are returned as errors; the two "cannot tell" conditions are
/// reported as [`LeadershipStatus::MemberNotStarted`] and
/// [`LeadershipStatus::Unknown`].
pub async fn leadership_status<S: EtcdStore>(
    store: &mut S,
    name: &str,
) -> Result<LeadershipStatus> {
    let members = store.member_list().await?;

    let Some(member) = members.into_iter().find(|m| m.name == name) else {
        return Ok(LeadershipStatus::Unknown);
    };

    let Some(endpoint) = member.client_urls.first() else {
        return Ok(LeadershipStatus::MemberNotStarted);
    };

    let status = store.status(endpoint).await?;
    debug!(
        member = %name,
        id = member.id,
        responder = status.member_id,
        leader = status.leader,
        "Member status"
    );
    if status.member_id == status.leader {
        Ok(LeadershipStatus::Leader)
    } else {
        Ok(LeadershipStatus::Follower)
    }
}

/// Boolean form of [`leadership_status`] used by the scheduler: anything but
/// a confirmed leader, errors included, means "skip this cycle".
pub async fn is_leader<S: EtcdStore>(store: &mut S, name: &str) -> bool {
    match leadership_status(store, name).await {
        Ok(LeadershipStatus::Leader) => true,
        Ok(LeadershipStatus::Follower) => {
            info!(member = %name, "Member is not the leader");
            false
        }
        Ok(LeadershipStatus::MemberNotStarted) => {
            let error = RollbackError::MemberNotStarted(name.to_string());
            warn!(error = %error, "Failed to check leadership");
            false
        }
        Ok(LeadershipStatus::Unknown) => {
            let error = RollbackError::LeadershipUnknown(name.to_string());
            warn!(error = %error, "Failed to check leadership");
            false
        }
        Err(e) => {
            error!(member = %name, error = %e, "Failed to check leadership");
            false
        }
    }
}
