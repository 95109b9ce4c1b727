//! Access to the etcd cluster.
//!
//! The engine only needs a narrow slice of the etcd API, captured by the
//! [`EtcdStore`] trait: the member list, per-endpoint status, a single key
//! read and the snapshot stream. [`client::EtcdClient`] implements it on top
//! of `etcd-client`; tests use in-memory fakes.

pub mod client;
pub mod cluster_version;
pub mod leadership;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use crate::utils::Result;

pub use client::{EtcdClient, EtcdClientFactory};
pub use cluster_version::ClusterVersionInfo;
pub use leadership::LeadershipStatus;

/// One entry of the etcd member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: u64,
    pub name: String,
    pub client_urls: Vec<String>,
}

/// Status reported by a single etcd endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStatus {
    /// Id of the member that answered.
    pub member_id: u64,
    /// Id of the member that member considers the leader.
    pub leader: u64,
}

/// A stream of snapshot bytes.
pub trait SnapshotStream {
    /// Next chunk of the snapshot, `None` once the stream is complete.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>>;
}

/// The operations the engine performs against etcd.
pub trait EtcdStore {
    type Snapshot: SnapshotStream;

    fn member_list(&mut self) -> impl Future<Output = Result<Vec<MemberInfo>>>;

    /// Status as reported by the member serving `endpoint`.
    fn status(&mut self, endpoint: &str) -> impl Future<Output = Result<MemberStatus>>;

    /// All values stored under `key`.
    fn get(&mut self, key: &str) -> impl Future<Output = Result<Vec<Vec<u8>>>>;

    /// Start streaming a consistent snapshot of the keyspace.
    fn snapshot(&mut self) -> impl Future<Output = Result<Self::Snapshot>>;
}

/// Produces a fresh [`EtcdStore`] for every backup cycle.
pub trait StoreFactory {
    type Store: EtcdStore;

    fn connect(&self) -> impl Future<Output = Result<Self::Store>>;
}
