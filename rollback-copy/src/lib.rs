//! Rollback copy engine
//!
//! Keeps point-in-time copies of the etcd keyspace and the control-plane
//! static-pod resources on the etcd leader, retained for the two most recent
//! cluster versions.

pub mod archive;
pub mod config;
pub mod daemon;
pub mod etcd;
pub mod executor;
pub mod fs;
pub mod rotation;
pub mod scheduler;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::RollbackError;
