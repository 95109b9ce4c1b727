//! Directory primitives used by capture and rotation.
//!
//! The central operation is [`safe_dir_rename`], a rename sequence that never
//! leaves an occupied destination empty when the replacement fails.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::utils::{Result, RollbackError};

/// Suffix of the staging name an existing destination is moved to while it
/// is being replaced.
pub const TO_BE_REMOVED_SUFFIX: &str = ".to_be_removed";

/// Returns true if `path` exists and is not a directory.
pub fn file_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| !m.is_dir()).unwrap_or(false)
}

/// Returns true if `path` exists and is a directory.
pub fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Remove whatever is at `dir` and create it again, empty.
pub fn recreate_dir(dir: &Path) -> io::Result<()> {
    if fs::symlink_metadata(dir).is_ok() {
        remove_path(dir)?;
    }
    fs::create_dir_all(dir)
}

/// Remove a file or a directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Staging path used while replacing `dest`.
pub fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(TO_BE_REMOVED_SUFFIX);
    PathBuf::from(name)
}

/// Move the directory `src` to `dest`, replacing any existing `dest`.
///
/// An existing `dest` is first renamed aside to `dest.to_be_removed`. If the
/// rename of `src` then fails, the staged directory is put back before the
/// error is returned. A missing `src` is a no-op when `src_optional` is set.
pub fn safe_dir_rename(src: &Path, dest: &Path, src_optional: bool) -> Result<()> {
    replace_dir_with(src, dest, src_optional, |from, to| fs::rename(from, to))
}

/// [`safe_dir_rename`] with the final `src -> dest` rename supplied by the
/// caller. Staging and restore always use [`fs::rename`].
pub(crate) fn replace_dir_with<F>(
    src: &Path,
    dest: &Path,
    src_optional: bool,
    mut rename_src: F,
) -> Result<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    if !dir_exists(src) {
        if src_optional {
            return Ok(());
        }
        return Err(RollbackError::MissingSource(src.to_path_buf()));
    }

    let staged = staging_path(dest);
    let dest_existed = dir_exists(dest);
    if dest_existed {
        if fs::symlink_metadata(&staged).is_ok() {
            warn!(path = %staged.display(), "Removing stale staging directory");
            remove_path(&staged)?;
        }
        fs::rename(dest, &staged)?;
    }

    if let Err(e) = rename_src(src, dest) {
        error!(
            src = %src.display(),
            dest = %dest.display(),
            error = %e,
            "Failed to move directory"
        );
        if dest_existed {
            if let Err(restore) = fs::rename(&staged, dest) {
                error!(
                    path = %dest.display(),
                    error = %restore,
                    "Failed to restore directory from staging, manual cleanup of {} required",
                    staged.display()
                );
            }
        }
        return Err(e.into());
    }

    info!(src = %src.display(), dest = %dest.display(), "Moved directory");
    if dest_existed {
        if let Err(e) = remove_path(&staged) {
            warn!(path = %staged.display(), error = %e, "Failed to remove replaced directory");
        }
    }
    Ok(())
}
