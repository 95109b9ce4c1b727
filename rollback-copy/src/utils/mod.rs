//! Utility modules for the rollback copy engine.

pub mod errors;
pub mod logger;

pub use errors::{Result, RollbackError};
