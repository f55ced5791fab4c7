//! Named, observable events for the paths where the engine swallows a failure or recovers.
//!
//! Each event is counted per [`crate::Storage`] instance and logged with an `event` field, so
//! tests and operators can see degraded-but-successful operations instead of silence.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageEvent {
    /// An invalid main was renamed to its `.bad` sibling.
    Quarantined,
    /// Renaming an invalid main to `.bad` failed.
    QuarantineFailed,
    /// A key was served from its backup after the main was missing or invalid.
    RestoredFromBackup,
    /// Copying a validated backup over the main failed; the loaded content was still returned.
    BackupCopyFailed,
    /// Rotating the current main into the backup slot failed during a save.
    BackupRotateFailed,
    /// Removing a stale backup (main was absent) failed during a save.
    StaleBackupRemoveFailed,
    /// Removing a backup, temp or bad sibling failed during a delete.
    SiblingRemoveFailed,
    /// Syncing a namespace directory after a save failed.
    DirectorySyncFailed,
    /// A stale orphaned temp file was removed while opening the engine.
    StaleTempPurged,
}

impl StorageEvent {
    pub const ALL: [Self; 9] = [
        Self::Quarantined,
        Self::QuarantineFailed,
        Self::RestoredFromBackup,
        Self::BackupCopyFailed,
        Self::BackupRotateFailed,
        Self::StaleBackupRemoveFailed,
        Self::SiblingRemoveFailed,
        Self::DirectorySyncFailed,
        Self::StaleTempPurged,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quarantined => "quarantined",
            Self::QuarantineFailed => "quarantine_failed",
            Self::RestoredFromBackup => "restored_from_backup",
            Self::BackupCopyFailed => "backup_copy_failed",
            Self::BackupRotateFailed => "backup_rotate_failed",
            Self::StaleBackupRemoveFailed => "stale_backup_remove_failed",
            Self::SiblingRemoveFailed => "sibling_remove_failed",
            Self::DirectorySyncFailed => "directory_sync_failed",
            Self::StaleTempPurged => "stale_temp_purged",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    /// Recovery events are expected; everything else marks a swallowed failure.
    const fn is_failure(self) -> bool {
        !matches!(self, Self::Quarantined | Self::RestoredFromBackup | Self::StaleTempPurged)
    }
}

impl fmt::Display for StorageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub(crate) struct EventCounters {
    counts: [AtomicU64; StorageEvent::ALL.len()],
}

impl EventCounters {
    /// Counts `event` and logs it with the affected path and the underlying error, if any.
    pub(crate) fn record(
        &self,
        event: StorageEvent,
        path: &std::path::Path,
        error: Option<&dyn std::error::Error>,
    ) {
        self.counts[event.index()].fetch_add(1, Ordering::Relaxed);

        match error {
            Some(err) if event.is_failure() => {
                warn!(event = %event, path = %path.display(), error = %err, "Storage degraded");
            },
            _ if event.is_failure() => {
                warn!(event = %event, path = %path.display(), "Storage degraded");
            },
            _ => info!(event = %event, path = %path.display(), "Storage recovered"),
        }
    }

    pub(crate) fn snapshot(&self) -> EventSnapshot {
        let mut counts = [0; StorageEvent::ALL.len()];
        for (slot, counter) in counts.iter_mut().zip(&self.counts) {
            *slot = counter.load(Ordering::Relaxed);
        }
        EventSnapshot { counts }
    }
}

/// Point-in-time copy of the event counters of a [`crate::Storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSnapshot {
    counts: [u64; StorageEvent::ALL.len()],
}

impl EventSnapshot {
    #[must_use]
    pub const fn count(&self, event: StorageEvent) -> u64 {
        self.counts[event.index()]
    }

    /// Total number of swallowed failures, excluding expected recoveries.
    #[must_use]
    pub fn failures(&self) -> u64 {
        StorageEvent::ALL.iter().filter(|e| e.is_failure()).map(|e| self.count(*e)).sum()
    }

    /// Iterates over every event with a non-zero count.
    pub fn iter(&self) -> impl Iterator<Item = (StorageEvent, u64)> + '_ {
        StorageEvent::ALL.into_iter().map(|e| (e, self.count(e))).filter(|(_, n)| *n > 0)
    }
}
