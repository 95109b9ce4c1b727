//! Snapshot capture: stream the etcd snapshot into `<dest>.part`, then
//! rename it into place.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{EtcdStore, SnapshotStream};
use crate::utils::Result;

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Save a consistent snapshot of `store` at `dest`.
///
/// Either `dest` holds the complete snapshot afterwards, or the call fails
/// and neither `dest` nor `<dest>.part` was created.
pub async fn save_snapshot<S: EtcdStore>(store: &mut S, dest: &Path) -> Result<u64> {
    let part = part_path(dest);
    let result = stream_to_part(store, &part, dest).await;

    if let Err(e) = tokio::fs::remove_file(&part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %part.display(), error = %e, "Failed to remove partial snapshot");
        }
    }
    result
}

async fn stream_to_part<S: EtcdStore>(store: &mut S, part: &Path, dest: &Path) -> Result<u64> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(part).await?;

    let started = Instant::now();
    let mut stream = store.snapshot().await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next_chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    info!(
        bytes = written,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fetched snapshot"
    );

    tokio::fs::rename(part, dest).await?;
    info!(path = %dest.display(), "Saved snapshot");
    Ok(written)
}
