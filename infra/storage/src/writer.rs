use crate::backup::safe_file_save;
use crate::error::{StorageError, StorageErrorExt};
use crate::events::{EventCounters, StorageEvent};
use crate::paths::StorageFilePaths;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// How a staged file is pushed to stable storage before it is swapped in.
///
/// Implementations must only return `Ok` once the file content is durable.
pub trait SyncStrategy: fmt::Debug + Send + Sync {
    /// # Errors
    ///
    /// Returns the error of the underlying sync call.
    fn sync(&self, file: &File) -> std::io::Result<()>;
}

/// `fsync`: content and metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullSync;

impl SyncStrategy for FullSync {
    fn sync(&self, file: &File) -> std::io::Result<()> {
        file.sync_all()
    }
}

/// `fdatasync`: content only, skipping metadata that is not needed to read it back.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataSync;

impl SyncStrategy for DataSync {
    fn sync(&self, file: &File) -> std::io::Result<()> {
        file.sync_data()
    }
}

/// Configurable choice between the built-in strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Full,
    Data,
}

impl SyncMode {
    pub(crate) fn strategy(self) -> Arc<dyn SyncStrategy> {
        match self {
            Self::Full => Arc::new(FullSync),
            Self::Data => Arc::new(DataSync),
        }
    }
}

/// Writes `value` to the temp file and swaps it in as the new main.
///
/// Nothing is swapped unless the write, flush and sync all succeed; on failure the temp file is
/// left behind and main/backup are untouched.
pub(crate) fn write_atomically(
    paths: &StorageFilePaths,
    value: &str,
    sync: &dyn SyncStrategy,
    events: &EventCounters,
) -> Result<(), StorageError> {
    stage(&paths.temp, value, sync)?;

    safe_file_save(&paths.temp, &paths.main, &paths.backup, events).context(format!(
        "Atomic swap failed: {} -> {}",
        paths.temp.display(),
        paths.main.display()
    ))?;

    if let Some(parent) = paths.main.parent() {
        sync_dir(parent, events);
    }

    Ok(())
}

fn stage(temp: &Path, value: &str, sync: &dyn SyncStrategy) -> Result<(), StorageError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp)
        .context(format!("Temp creation failed: {}", temp.display()))?;

    let mut writer = BufWriter::new(file);
    writer
        .write_all(value.as_bytes())
        .context(format!("Failed to store value at {}", temp.display()))?;
    writer.flush().context(format!("Flush failed: {}", temp.display()))?;

    sync.sync(writer.get_ref()).context(format!("Hardware sync failed: {}", temp.display()))
}

fn sync_dir(path: &Path, events: &EventCounters) {
    match File::open(path).and_then(|dir| dir.sync_all()) {
        Ok(()) => {},
        Err(err) => events.record(StorageEvent::DirectorySyncFailed, path, Some(&err)),
    }
}

/// Creates the namespace directory if it does not exist yet.
pub(crate) fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(path).context(format!("Failed to create directory {}", path.display()))
}
