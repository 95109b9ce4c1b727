//! Archive builder for static-pod resources.
//!
//! Produces a gzip-compressed tarball of every regular file below a list of
//! source directories, with entry names made relative to a stripped prefix.
//! The tarball is written to `<dest>.part` and only renamed to `<dest>` once
//! it is complete.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::fs::ops::remove_path;
use crate::fs::walker::walk_regular_files;
use crate::utils::{Result, RollbackError};

/// Directory below the config dir holding one subdirectory per static-pod revision.
pub const STATIC_POD_RESOURCES_DIR: &str = "static-pod-resources";

/// Control-plane components whose latest revision is preserved by default.
pub const DEFAULT_RESOURCE_PREFIXES: [&str; 4] = [
    "kube-apiserver-pod",
    "kube-controller-manager-pod",
    "kube-scheduler-pod",
    "etcd-pod",
];

/// The resource kinds that make up one archive, identified by the name
/// prefix of their revision directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSet {
    prefixes: Vec<String>,
}

impl ResourceSet {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Default for ResourceSet {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_PREFIXES)
    }
}

/// Find the most recently modified subdirectory of `dir` whose name starts
/// with `prefix`.
///
/// Entries are compared in name order and a later entry only wins with a
/// strictly newer modification time.
pub fn latest_revision(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified().unwrap_or(UNIX_EPOCH);
        match &latest {
            Some((best, _)) if modified <= *best => {}
            _ => latest = Some((modified, entry.path())),
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| RollbackError::ResourceNotFound {
            prefix: prefix.to_string(),
            dir: dir.to_path_buf(),
        })
}

/// Archive the latest revision of every resource kind in `resources` found
/// under `<config_dir>/static-pod-resources` into `dest`.
///
/// All-or-nothing: a kind without any revision fails the whole build.
pub fn archive_latest_resources(
    config_dir: &Path,
    resources: &ResourceSet,
    dest: &Path,
) -> Result<()> {
    let resources_dir = config_dir.join(STATIC_POD_RESOURCES_DIR);

    let mut sources = Vec::with_capacity(resources.prefixes().len());
    for prefix in resources.prefixes() {
        let revision = latest_revision(&resources_dir, prefix)?;
        info!(resource = %prefix, path = %revision.display(), "Adding latest revision");
        sources.push(revision);
    }

    create_tarball(dest, &sources, config_dir)
}

/// Build a `.tar.gz` at `dest` from every regular file under `sources`, with
/// `prefix` stripped from entry names.
pub fn create_tarball(dest: &Path, sources: &[PathBuf], prefix: &Path) -> Result<()> {
    let start = Instant::now();
    let part = part_path(dest);

    let written = match write_tarball(&part, sources, prefix) {
        Ok(count) => count,
        Err(e) => {
            let _ = remove_path(&part);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&part, dest) {
        let _ = remove_path(&part);
        return Err(e.into());
    }

    info!(
        path = %dest.display(),
        files = written,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Created resource archive"
    );
    Ok(())
}

fn write_tarball(part: &Path, sources: &[PathBuf], prefix: &Path) -> Result<usize> {
    let file = File::create(part)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut written = 0;
    for source in sources {
        let archive_err = |e: std::io::Error| RollbackError::Archive {
            path: source.clone(),
            source: e,
        };

        let files = walk_regular_files(source).map_err(archive_err)?;
        for file in files {
            let name = entry_name(&file.path, prefix);
            debug!(entry = %name.display(), size = file.size, "Archiving file");
            builder
                .append_path_with_name(&file.path, &name)
                .map_err(archive_err)?;
            written += 1;
        }
    }

    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()?;
    Ok(written)
}

/// Entry name of `path` inside the archive: `path` without `prefix`, with
/// any root or `..` components dropped.
fn entry_name(path: &Path, prefix: &Path) -> PathBuf {
    let relative = path.strip_prefix(prefix).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry_names(archive: &Path) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn set_mtime(dir: &Path, secs: u64) {
        File::open(dir)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_entry_name_strips_prefix() {
        assert_eq!(
            entry_name(Path::new("/etc/kubernetes/a/b.yaml"), Path::new("/etc/kubernetes")),
            PathBuf::from("a/b.yaml")
        );
        assert_eq!(
            entry_name(Path::new("/etc/kubernetes/a/b.yaml"), Path::new("/etc/kubernetes/")),
            PathBuf::from("a/b.yaml")
        );
        assert_eq!(
            entry_name(Path::new("/other/c.yaml"), Path::new("/etc/kubernetes")),
            PathBuf::from("other/c.yaml")
        );
    }

    #[test]
    fn test_tarball_contains_only_regular_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let source = root.join("pod-1");
        fs::create_dir_all(source.join("secrets/empty")).unwrap();
        fs::write(source.join("pod.yaml"), b"kind: Pod").unwrap();
        fs::write(source.join("secrets/tls.key"), b"key").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(source.join("pod.yaml"), source.join("link.yaml")).unwrap();

        let dest = temp.path().join("out.tar.gz");
        create_tarball(&dest, &[source], &root).unwrap();

        assert_eq!(
            entry_names(&dest),
            vec!["pod-1/pod.yaml".to_string(), "pod-1/secrets/tls.key".to_string()]
        );
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_tarball_preserves_content() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.txt"), b"hello").unwrap();

        let dest = temp.path().join("out.tar.gz");
        create_tarball(&dest, &[source], temp.path()).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut content = String::new();
        std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
        assert_eq!(content, "hello");
        assert_eq!(entry.header().size().unwrap(), 5);
    }

    #[test]
    fn test_missing_source_fails_without_output() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("a.txt"), b"a").unwrap();
        let missing = temp.path().join("missing");

        let dest = temp.path().join("out.tar.gz");
        let err = create_tarball(&dest, &[good, missing.clone()], temp.path()).unwrap_err();

        match err {
            RollbackError::Archive { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_latest_revision_picks_newest() {
        let temp = TempDir::new().unwrap();
        for (name, mtime) in [
            ("etcd-pod-1", 100),
            ("etcd-pod-3", 300),
            ("etcd-pod-2", 200),
            ("kube-apiserver-pod-9", 900),
        ] {
            let dir = temp.path().join(name);
            fs::create_dir(&dir).unwrap();
            set_mtime(&dir, mtime);
        }
        fs::write(temp.path().join("etcd-pod-file"), b"not a dir").unwrap();

        let latest = latest_revision(temp.path(), "etcd-pod").unwrap();
        assert_eq!(latest, temp.path().join("etcd-pod-3"));
    }

    #[test]
    fn test_latest_revision_not_found() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("etcd-pod-1")).unwrap();

        let err = latest_revision(temp.path(), "kube-scheduler-pod").unwrap_err();
        assert!(matches!(err, RollbackError::ResourceNotFound { .. }));
    }

    #[test]
    fn test_archive_latest_resources() {
        let temp = TempDir::new().unwrap();
        let resources_dir = temp.path().join(STATIC_POD_RESOURCES_DIR);
        for (name, mtime) in [("a-pod-1", 10), ("a-pod-2", 20), ("b-pod-1", 10)] {
            let dir = resources_dir.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("pod.yaml"), name).unwrap();
            set_mtime(&dir, mtime);
        }

        let dest = temp.path().join("resources.tar.gz");
        let resources = ResourceSet::new(["a-pod", "b-pod"]);
        archive_latest_resources(temp.path(), &resources, &dest).unwrap();

        assert_eq!(
            entry_names(&dest),
            vec![
                "static-pod-resources/a-pod-2/pod.yaml".to_string(),
                "static-pod-resources/b-pod-1/pod.yaml".to_string(),
            ]
        );
    }

    #[test]
    fn test_archive_requires_every_resource_kind() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(STATIC_POD_RESOURCES_DIR).join("a-pod-1")).unwrap();

        let dest = temp.path().join("resources.tar.gz");
        let resources = ResourceSet::new(["a-pod", "b-pod"]);
        let err = archive_latest_resources(temp.path(), &resources, &dest).unwrap_err();

        assert!(matches!(
            err,
            RollbackError::ResourceNotFound { ref prefix, .. } if prefix == "b-pod"
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_default_resource_set() {
        let set = ResourceSet::default();
        assert_eq!(set.prefixes().len(), 4);
        assert!(set.prefixes().iter().any(|p| p == "etcd-pod"));
    }
}
