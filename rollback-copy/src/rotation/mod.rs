//! Generational retention of captured backups.
//!
//! Four named slots hold at most two backups for each of the two most recent
//! cluster versions:
//!
//! ```text
//! rollbackcopy/
//!   currentVersion.latest   newest backup of the running version
//!   currentVersion.prev     the one before it
//!   olderVersion.latest     newest backup of the previous version
//!   olderVersion.prev       the one before it
//! ```
//!
//! Every successful capture is promoted into `currentVersion.latest` by
//! [`rotate`]. When the cluster version changed since the last retained
//! backup, the `currentVersion.*` pair first becomes the `olderVersion.*`
//! pair; otherwise only `currentVersion.latest` shifts to
//! `currentVersion.prev`. Every move is a [`safe_dir_rename`].

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fs::ops::{dir_exists, remove_path, safe_dir_rename};
use crate::fs::BackupDescriptor;
use crate::utils::Result;

/// Directory below the config dir that holds the slots and the scratch area.
pub const ROLLBACK_COPY_DIR: &str = "rollbackcopy";

/// Name of the scratch directory inside [`ROLLBACK_COPY_DIR`].
pub const SCRATCH_DIR: &str = "tmp";

/// One of the four retention slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    CurrentLatest,
    CurrentPrev,
    OlderLatest,
    OlderPrev,
}

impl Slot {
    pub const ALL: [Slot; 4] = [
        Slot::CurrentLatest,
        Slot::CurrentPrev,
        Slot::OlderLatest,
        Slot::OlderPrev,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Slot::CurrentLatest => "currentVersion.latest",
            Slot::CurrentPrev => "currentVersion.prev",
            Slot::OlderLatest => "olderVersion.latest",
            Slot::OlderPrev => "olderVersion.prev",
        }
    }

    pub fn path(self, base: &Path) -> PathBuf {
        base.join(self.dir_name())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// What a rotation does with the existing slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    /// An upgrade is in progress; no slot is touched and the scratch backup
    /// is not retained.
    Skip,
    /// Same cluster version: `currentVersion.latest` becomes `currentVersion.prev`.
    SameGeneration,
    /// Version changed, or there is no readable current backup: the
    /// `currentVersion.*` pair replaces the `olderVersion.*` pair.
    NewGeneration,
}

impl RotationDecision {
    /// Decide how to rotate `incoming` into the slots under `base`.
    ///
    /// Only the descriptor of `currentVersion.latest` identifies the retained
    /// generation. Without a readable one the rotation starts a new generation.
    pub fn decide(base: &Path, incoming: &BackupDescriptor, upgrading: bool) -> Self {
        if upgrading {
            return RotationDecision::Skip;
        }
        let latest = Slot::CurrentLatest.path(base);
        let current = if dir_exists(&latest) {
            BackupDescriptor::read_optional(&latest)
        } else {
            None
        };
        match current {
            Some(current) if current.cluster_version == incoming.cluster_version => {
                RotationDecision::SameGeneration
            }
            _ => RotationDecision::NewGeneration,
        }
    }

    /// Slot-to-slot moves performed before the scratch backup is promoted,
    /// in order. Sources are optional.
    pub fn moves(self) -> &'static [(Slot, Slot)] {
        match self {
            RotationDecision::Skip => &[],
            RotationDecision::SameGeneration => &[(Slot::CurrentLatest, Slot::CurrentPrev)],
            RotationDecision::NewGeneration => &[
                (Slot::CurrentPrev, Slot::OlderPrev),
                (Slot::CurrentLatest, Slot::OlderLatest),
            ],
        }
    }
}

/// Promote the freshly captured backup in `scratch` into the slots under
/// `base`.
///
/// The scratch directory must carry a valid descriptor. With `upgrading` set
/// nothing is moved and the scratch directory is left for its owner to
/// discard.
pub fn rotate(base: &Path, scratch: &Path, upgrading: bool) -> Result<RotationDecision> {
    let incoming = BackupDescriptor::read(scratch)?;
    let decision = RotationDecision::decide(base, &incoming, upgrading);

    match decision {
        RotationDecision::Skip => {
            info!(
                version = %incoming.cluster_version,
                "Cluster upgrade in progress, not retaining backup"
            );
            return Ok(decision);
        }
        RotationDecision::SameGeneration => {
            for (from, to) in decision.moves() {
                safe_dir_rename(&from.path(base), &to.path(base), true)?;
            }
        }
        RotationDecision::NewGeneration => {
            info!(version = %incoming.cluster_version, "Cluster version changed");
            demote_current_pair(base)?;
        }
    }

    let latest = Slot::CurrentLatest.path(base);
    safe_dir_rename(scratch, &latest, false)?;
    info!(
        path = %latest.display(),
        version = %incoming.cluster_version,
        timestamp = %incoming.timestamp,
        "Backed up resources and snapshot"
    );
    Ok(decision)
}

/// Replace the `olderVersion.*` pair with the `currentVersion.*` pair.
///
/// The pair moves as a unit: an older slot whose current counterpart is
/// empty is cleared rather than kept. With both current slots empty there is
/// nothing to demote and the older pair stays.
fn demote_current_pair(base: &Path) -> Result<()> {
    let has_current = [Slot::CurrentLatest, Slot::CurrentPrev]
        .iter()
        .any(|slot| dir_exists(&slot.path(base)));
    if !has_current {
        return Ok(());
    }

    for (from, to) in RotationDecision::NewGeneration.moves() {
        let from_path = from.path(base);
        let to_path = to.path(base);
        if dir_exists(&from_path) {
            safe_dir_rename(&from_path, &to_path, false)?;
        } else if dir_exists(&to_path) {
            info!(slot = %to, "Discarding backup of superseded version");
            remove_path(&to_path)?;
        }
    }
    Ok(())
}
