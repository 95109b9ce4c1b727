//! Filesystem primitives: existence checks, crash-safe directory replace,
//! backup descriptors and regular-file traversal.

pub mod descriptor;
pub mod ops;
pub mod walker;

pub use descriptor::BackupDescriptor;
pub use ops::{dir_exists, file_exists, recreate_dir, remove_path, safe_dir_rename};
