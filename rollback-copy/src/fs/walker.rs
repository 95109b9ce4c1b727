//! Directory traversal for archive building.
//!
//! Only regular files are reported. Directories, symlinks, sockets and
//! devices are walked past without being returned.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A regular file discovered during walking.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

/// Walk `root` recursively and collect every regular file, in a stable
/// (name-sorted) order.
///
/// Symlinks are never followed. A `root` that is itself a regular file is
/// returned as the only entry.
pub fn walk_regular_files(root: &Path) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata()?;
        files.push(FileInfo {
            path: entry.into_path(),
            size: metadata.len(),
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_regular_files(temp_dir.path())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content22")?;

        let files = walk_regular_files(temp_dir.path())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, temp_dir.path().join("file1.txt"));
        assert_eq!(files[1].path, temp_dir.path().join("subdir/file2.txt"));
        assert_eq!(files[1].size, 9);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_are_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("real.txt"), b"real")?;
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("link.txt"),
        )?;

        let files = walk_regular_files(temp_dir.path())?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, temp_dir.path().join("real.txt"));

        Ok(())
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(walk_regular_files(&temp_dir.path().join("missing")).is_err());
    }
}
