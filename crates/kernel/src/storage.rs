use crate::config::StorageConfig;
use barton_storage::{Storage, StorageError};
use std::time::Duration;
use tracing::info;

/// Opens the key/value store described by `config`.
///
/// Call once during startup and share the returned handle by cloning it.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if the root cannot be created or resolved.
pub fn open_storage(config: &StorageConfig) -> Result<Storage, StorageError> {
    let storage = Storage::builder()
        .root(&config.root)
        .create(config.create)
        .sync_mode(config.sync)
        .reserved_keys(config.reserved_keys.iter().cloned())
        .purge_stale_tmp(config.purge_stale_tmp)
        .stale_tmp_after(Duration::from_secs(config.stale_tmp_after_secs))
        .open()?;

    info!(root = %storage.root().display(), sync = ?config.sync, "Storage opened");
    Ok(storage)
}
