use crate::events::{EventCounters, StorageEvent};
use crate::paths::TEMP_SUFFIX;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Removes `<namespace>/<key>.tmp` files under `storage_root` older than `threshold`.
///
/// Orphaned temps only appear after a crash or a failed save; a young one may belong to a save
/// that is still running in another process, so it is left alone.
pub(crate) fn purge_stale_tmp(storage_root: &Path, threshold: Duration, events: &EventCounters) {
    let now = SystemTime::now();
    let (removed, failed) = remove_stale(storage_root, now, threshold, events);

    if removed > 0 || failed > 0 {
        info!(removed, failed, "Cleaned up temporary files");
    } else {
        debug!(path = %storage_root.display(), "No stale temporary files");
    }
}

fn remove_stale(
    root: &Path,
    now: SystemTime,
    threshold: Duration,
    events: &EventCounters,
) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .flatten()
        .filter(|entry| is_tmp(entry) && is_stale(entry, now, threshold))
        .for_each(|entry| {
            let path = entry.path();
            match std::fs::remove_file(path) {
                Ok(()) => {
                    events.record(StorageEvent::StaleTempPurged, path, None);
                    removed += 1;
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to remove stale temp");
                    failed += 1;
                },
            }
        });

    (removed, failed)
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry.file_name().to_str().is_some_and(|name| name.ends_with(TEMP_SUFFIX))
}

fn is_stale(entry: &DirEntry, now: SystemTime, threshold: Duration) -> bool {
    entry
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_none_or(|age| age > threshold)
}
