//! In-memory etcd fakes shared by the unit tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::cluster_version::CLUSTER_VERSION_KEY;
use super::{EtcdStore, MemberInfo, MemberStatus, SnapshotStream, StoreFactory};
use crate::utils::{Result, RollbackError};

fn rpc_error(msg: &str) -> RollbackError {
    RollbackError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, msg.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct FakeStore {
    pub members: Vec<MemberInfo>,
    pub statuses: HashMap<String, MemberStatus>,
    pub values: HashMap<String, Vec<Vec<u8>>>,
    pub snapshot_chunks: Vec<Vec<u8>>,
    /// Fail the snapshot stream after this many chunks.
    pub snapshot_fail_after: Option<usize>,
    pub fail_member_list: bool,
    pub status_calls: Vec<String>,
}

impl FakeStore {
    /// A single-member cluster in which `name` is the leader.
    pub fn leader(name: &str) -> Self {
        let endpoint = format!("https://{name}:2379");
        let mut store = FakeStore::default();
        store.members.push(MemberInfo {
            id: 7,
            name: name.to_string(),
            client_urls: vec![endpoint.clone()],
        });
        store.statuses.insert(endpoint, MemberStatus { member_id: 7, leader: 7 });
        store
    }

    /// A cluster in which `name` is a follower.
    pub fn follower(name: &str) -> Self {
        let mut store = Self::leader(name);
        for status in store.statuses.values_mut() {
            status.leader = 8;
        }
        store
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.as_bytes().to_vec());
        self
    }

    /// Store the cluster version record with `current` as the latest history
    /// entry and `desired` as the target release.
    pub fn with_cluster_version(self, desired: &str, current: &str) -> Self {
        let value = serde_json::json!({
            "status": {
                "desired": { "version": desired },
                "history": [{ "version": current, "state": "Completed" }],
            }
        });
        self.with_value(CLUSTER_VERSION_KEY, &value.to_string())
    }

    pub fn with_snapshot(mut self, chunks: &[&[u8]]) -> Self {
        self.snapshot_chunks = chunks.iter().map(|c| c.to_vec()).collect();
        self
    }
}

pub struct FakeSnapshot {
    chunks: std::vec::IntoIter<Vec<u8>>,
    served: usize,
    fail_after: Option<usize>,
}

impl SnapshotStream for FakeSnapshot {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.fail_after == Some(self.served) {
            return Err(rpc_error("snapshot stream broken"));
        }
        self.served += 1;
        Ok(self.chunks.next())
    }
}

impl EtcdStore for FakeStore {
    type Snapshot = FakeSnapshot;

    async fn member_list(&mut self) -> Result<Vec<MemberInfo>> {
        if self.fail_member_list {
            return Err(rpc_error("member list unavailable"));
        }
        Ok(self.members.clone())
    }

    async fn status(&mut self, endpoint: &str) -> Result<MemberStatus> {
        self.status_calls.push(endpoint.to_string());
        self.statuses
            .get(endpoint)
            .copied()
            .ok_or_else(|| rpc_error("endpoint unreachable"))
    }

    async fn get(&mut self, key: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.values.get(key).cloned().unwrap_or_default())
    }

    async fn snapshot(&mut self) -> Result<FakeSnapshot> {
        Ok(FakeSnapshot {
            chunks: self.snapshot_chunks.clone().into_iter(),
            served: 0,
            fail_after: self.snapshot_fail_after,
        })
    }
}

/// Hands out clones of a template store and counts connections.
#[derive(Debug, Default)]
pub struct FakeFactory {
    pub template: FakeStore,
    pub connects: AtomicUsize,
}

impl FakeFactory {
    pub fn new(template: FakeStore) -> Self {
        Self {
            template,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl StoreFactory for FakeFactory {
    type Store = FakeStore;

    async fn connect(&self) -> Result<FakeStore> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.template.clone())
    }
}
