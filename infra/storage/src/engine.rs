//! Core storage engine: the [`Storage`] handle and every per-key and per-namespace operation.
//!
//! Every public operation takes the engine lock for its whole duration, except while a
//! [`Validator`] runs.

use crate::backup::{FileToRead, choose_file_to_read};
use crate::builder::StorageBuilder;
use crate::error::{RestoreError, StorageError, StorageErrorExt};
use crate::events::{EventCounters, EventSnapshot, StorageEvent};
use crate::guard::StorageLock;
use crate::loader::load_locked;
use crate::namespace::NamespacedStorage;
use crate::paths::{BACKUP_SUFFIX, BAD_SUFFIX, Layout, StorageFilePaths, TEMP_SUFFIX};
use crate::validator::{Json, ValidationError, Validator, Xml, XmlDocument};
use crate::writer::{SyncStrategy, ensure_dir, write_atomically};
use fxhash::FxHashSet;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// The internal shared state of a [`Storage`] instance.
#[derive(Debug)]
pub struct StorageInner {
    /// The canonicalized configuration root.
    pub(crate) root: PathBuf,
    pub(crate) layout: Layout,
    pub(crate) lock: StorageLock,
    pub(crate) sync: Arc<dyn SyncStrategy>,
    pub(crate) events: EventCounters,
    /// File names hidden from key enumeration.
    pub(crate) reserved_keys: FxHashSet<String>,
}

/// A thread-safe handle to the durable key/value store.
///
/// Every key is backed by a main file and the previous version as a `.bak` sibling. Saves are
/// atomic; loads validate the main, quarantine it to `.bad` when it does not validate and fall
/// back to the backup.
///
/// The handle is reference-counted and cheap to clone. All clones share one lock, so every
/// operation is serialized across threads.
///
/// # Example
///
/// ```rust
/// use barton_storage::{Storage, StorageError};
///
/// # fn main() -> Result<(), StorageError> {
/// # let tmp = tempfile::tempdir().unwrap();
/// let storage = Storage::builder().root(tmp.path()).open()?;
///
/// storage.save("devices", "thermostat", r#"{"setpoint":21}"#)?;
/// storage.save("devices", "thermostat", r#"{"setpoint":22}"#)?;
///
/// let current = storage.load_json("devices", "thermostat")?;
/// assert_eq!(current["setpoint"], 22);
///
/// let paths = storage.file_paths("devices", "thermostat")?;
/// assert_eq!(std::fs::read_to_string(paths.backup).unwrap(), r#"{"setpoint":21}"#);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    pub(crate) inner: Arc<StorageInner>,
}

impl Deref for Storage {
    type Target = StorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Storage {
    #[must_use = "The storage engine is not initialized until you call .open()"]
    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    /// The canonical configuration root this engine was opened with.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a view scoped to one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidName`] if `namespace` is not a valid directory name.
    pub fn namespace(&self, namespace: impl Into<String>) -> Result<NamespacedStorage, StorageError> {
        let namespace = namespace.into();
        self.layout.namespace_dir(&namespace)?;
        Ok(NamespacedStorage::new(self.clone(), namespace))
    }

    /// Computes the main, backup, temp and bad paths of a key without touching the disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidName`] for an invalid namespace or key.
    pub fn file_paths(&self, namespace: &str, key: &str) -> Result<StorageFilePaths, StorageError> {
        self.layout.file_paths(namespace, key)
    }

    /// Counters of every degraded or recovered path taken since the engine was opened.
    #[must_use]
    pub fn events(&self) -> EventSnapshot {
        self.events.snapshot()
    }

    /// Atomically replaces the value of `key`, keeping the previous value as its backup.
    ///
    /// The namespace directory is created if needed. The value is written to the temp file,
    /// flushed and synced before the swap, so a crash leaves either the old or the new value as
    /// main.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created, the value cannot be
    /// written or synced, or the final rename fails. Main and backup are untouched unless the
    /// final rename was reached.
    pub fn save(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let paths = self.layout.file_paths(namespace, key)?;
        let started = Instant::now();
        let _guard = self.lock.acquire("save")?;

        let result = paths
            .main
            .parent()
            .map_or(Ok(()), ensure_dir)
            .and_then(|()| write_atomically(&paths, value, self.sync.as_ref(), &self.events));

        match &result {
            Ok(()) => debug!(
                namespace,
                key,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Value saved"
            ),
            Err(err) => error!(namespace, key, error = %err, "Failed to save value"),
        }

        result
    }

    /// Returns the stored string, recovering from the backup if the main cannot be read.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyNotFound`] if neither the main nor the backup exists, or
    /// [`StorageError::Unparseable`] if neither could be read, carrying the last content tried.
    pub fn load(&self, namespace: &str, key: &str) -> Result<String, StorageError> {
        self.parse(namespace, key, &|content: &str| -> Result<String, ValidationError> {
            Ok(content.to_owned())
        })
    }

    /// Loads `key` through `validator`.
    ///
    /// If the main does not validate it is moved to `<key>.bad` and the backup is tried; a
    /// backup that validates is copied back over the main. The validator is called without the
    /// engine lock held and may use this handle.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyNotFound`] if neither file exists, or
    /// [`StorageError::Unparseable`] if no candidate validated.
    pub fn parse<V>(&self, namespace: &str, key: &str, validator: &V) -> Result<V::Output, StorageError>
    where
        V: Validator + ?Sized,
    {
        let paths = self.layout.file_paths(namespace, key)?;
        let mut guard = self.lock.acquire("parse")?;

        load_locked(&mut guard, &paths, validator, &self.events).into_result(&paths)
    }

    /// Gives a quarantined main another chance, typically with a more permissive validator.
    ///
    /// The `.bad` file is copied, never moved, into a freshly created main and the normal load
    /// runs. An existing main is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyNotFound`] if there is no `.bad` file, [`StorageError::Io`] if a
    /// main already exists or the copy fails, and any error of [`Storage::parse`].
    pub fn parse_bad<V>(
        &self,
        namespace: &str,
        key: &str,
        validator: &V,
    ) -> Result<V::Output, StorageError>
    where
        V: Validator + ?Sized,
    {
        let paths = self.layout.file_paths(namespace, key)?;
        let mut guard = self.lock.acquire("parse_bad")?;

        if let Err(err) = restore_bad(&paths) {
            error!(namespace, key, error = %err, "Unable to restore quarantined value");
            return Err(err);
        }

        load_locked(&mut guard, &paths, validator, &self.events)
            .into_result(&paths)
            .inspect_err(|err| error!(namespace, key, error = %err, "Unable to restore"))
    }

    /// Loads `key` as any JSON value.
    ///
    /// # Errors
    ///
    /// See [`Storage::parse`].
    pub fn load_json(&self, namespace: &str, key: &str) -> Result<serde_json::Value, StorageError> {
        self.parse(namespace, key, &Json::<serde_json::Value>::new())
    }

    /// Loads `key` as JSON deserialized into `T`. Content that does not deserialize into `T`
    /// counts as invalid.
    ///
    /// # Errors
    ///
    /// See [`Storage::parse`].
    pub fn load_json_as<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<T, StorageError> {
        self.parse(namespace, key, &Json::<T>::new())
    }

    /// Loads `key` as a well-formed XML document.
    ///
    /// # Errors
    ///
    /// See [`Storage::parse`].
    pub fn load_xml(&self, namespace: &str, key: &str) -> Result<XmlDocument, StorageError> {
        self.parse(namespace, key, &Xml)
    }

    /// Removes `key` with its backup, temp and bad siblings.
    ///
    /// A missing main is not an error. Sibling removal is best effort.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the main exists but cannot be removed.
    pub fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let paths = self.layout.file_paths(namespace, key)?;
        let _guard = self.lock.acquire("delete")?;

        match fs::remove_file(&paths.main) {
            Ok(()) => {},
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(namespace, key, "Main already absent");
            },
            Err(err) => {
                error!(namespace, key, error = %err, "Failed to delete value");
                return Err(StorageError::Io {
                    source: err,
                    context: Some(format!("Failed to delete: {}", paths.main.display()).into()),
                });
            },
        }

        for sibling in [&paths.backup, &paths.temp, &paths.bad] {
            match fs::remove_file(sibling) {
                Ok(()) => {},
                Err(err) if err.kind() == ErrorKind::NotFound => {},
                Err(err) => self.events.record(StorageEvent::SiblingRemoveFailed, sibling, Some(&err)),
            }
        }

        debug!(namespace, key, "Key deleted");
        Ok(())
    }

    /// Recursively removes a namespace and every key in it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NamespaceNotFound`] if the directory does not exist, or
    /// [`StorageError::Io`] if it cannot be removed.
    pub fn delete_namespace(&self, namespace: &str) -> Result<(), StorageError> {
        let dir = self.layout.namespace_dir(namespace)?;
        let _guard = self.lock.acquire("delete_namespace")?;

        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(namespace, "Namespace deleted");
                Ok(())
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Err(namespace_not_found(namespace)),
            Err(err) => {
                error!(namespace, error = %err, "Failed to delete namespace");
                Err(StorageError::Io {
                    source: err,
                    context: Some(format!("Failed to delete: {}", dir.display()).into()),
                })
            },
        }
    }

    /// Lists the keys of a namespace.
    ///
    /// Temp and bad files are skipped. A backup whose main is gone still reports its key, so a
    /// key is listed whenever [`Storage::load`] could recover it. Reserved names are never
    /// listed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NamespaceNotFound`] if the namespace directory does not exist, or
    /// [`StorageError::Io`] if it cannot be read.
    pub fn get_keys(&self, namespace: &str) -> Result<FxHashSet<String>, StorageError> {
        let dir = self.layout.namespace_dir(namespace)?;
        let _guard = self.lock.acquire("get_keys")?;

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(namespace_not_found(namespace));
            },
            Err(err) => {
                return Err(StorageError::Io {
                    source: err,
                    context: Some(format!("Failed to list: {}", dir.display()).into()),
                });
            },
        };

        let mut keys = FxHashSet::default();
        for entry in entries {
            let entry = entry.context(format!("Failed to list: {}", dir.display()))?;
            if entry.file_type().context("Failed to stat directory entry")?.is_dir() {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                warn!(namespace, path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };

            if name.ends_with(TEMP_SUFFIX) || name.ends_with(BAD_SUFFIX) {
                continue;
            }

            let key = match name.strip_suffix(BACKUP_SUFFIX) {
                Some(stem) => stem.to_owned(),
                None => name,
            };

            if !key.is_empty() && !self.reserved_keys.contains(&key) {
                keys.insert(key);
            }
        }

        Ok(keys)
    }

    /// Reports which file a load of `key` would start from.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidName`] for an invalid namespace or key.
    pub fn has_key(&self, namespace: &str, key: &str) -> Result<FileToRead, StorageError> {
        let paths = self.layout.file_paths(namespace, key)?;
        let _guard = self.lock.acquire("has_key")?;

        Ok(choose_file_to_read(&paths.main, &paths.backup))
    }

    /// Modification time of the main file. The backup is not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyNotFound`] if there is no main file.
    pub fn get_mtime(&self, namespace: &str, key: &str) -> Result<SystemTime, StorageError> {
        let paths = self.layout.file_paths(namespace, key)?;
        let _guard = self.lock.acquire("get_mtime")?;

        match fs::metadata(&paths.main) {
            Ok(meta) => meta
                .modified()
                .context(format!("Failed to read mtime: {}", paths.main.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::KeyNotFound {
                message: paths.main.display().to_string().into(),
                context: None,
            }),
            Err(err) => Err(StorageError::Io {
                source: err,
                context: Some(format!("Failed to get metadata: {}", paths.main.display()).into()),
            }),
        }
    }

    /// Replaces a namespace with the one found under `donor_root`, laid out like this engine's
    /// root (`<donor_root>/storage/<namespace>`).
    ///
    /// The current namespace is deleted first and the donor copied in. Contents are never
    /// merged.
    ///
    /// # Errors
    ///
    /// - [`RestoreError::NewDirMissing`] if the donor namespace does not exist. Nothing changes.
    /// - [`RestoreError::OldConfigDeleteFailed`] if the current namespace cannot be removed.
    ///   Nothing is copied.
    /// - [`RestoreError::FailedCopy`] if the copy fails partway.
    pub fn restore_namespace(
        &self,
        namespace: &str,
        donor_root: impl AsRef<Path>,
    ) -> Result<(), RestoreError> {
        let dir = self.layout.namespace_dir(namespace)?;
        let donor = Layout::new(donor_root.as_ref()).namespace_dir(namespace)?;
        let _guard = self.lock.acquire("restore_namespace")?;

        if !donor.is_dir() {
            warn!(namespace, donor = %donor.display(), "Restore source missing");
            return Err(RestoreError::NewDirMissing { path: donor });
        }

        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!(namespace, "Removed current namespace before restore"),
            Err(err) if err.kind() == ErrorKind::NotFound => {},
            Err(source) => {
                error!(namespace, error = %source, "Failed to delete current namespace");
                return Err(RestoreError::OldConfigDeleteFailed { path: dir, source });
            },
        }

        copy_tree(&donor, &dir).map_err(|err| {
            error!(namespace, error = %err, "Failed to copy namespace");
            RestoreError::FailedCopy {
                source: Box::new(err),
                context: Some(format!("{} -> {}", donor.display(), dir.display()).into()),
            }
        })?;

        info!(namespace, donor = %donor.display(), "Namespace restored");
        Ok(())
    }
}

fn namespace_not_found(namespace: &str) -> StorageError {
    StorageError::NamespaceNotFound { message: namespace.to_owned().into(), context: None }
}

/// Copies `<key>.bad` into a newly created main, leaving the `.bad` file as it was.
fn restore_bad(paths: &StorageFilePaths) -> Result<(), StorageError> {
    let mut bad = match File::open(&paths.bad) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StorageError::KeyNotFound {
                message: paths.bad.display().to_string().into(),
                context: Some("no quarantined value".into()),
            });
        },
        Err(err) => {
            return Err(StorageError::Io {
                source: err,
                context: Some(format!("Failed to open: {}", paths.bad.display()).into()),
            });
        },
    };

    let mut main = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&paths.main)
        .context(format!("Can't create restored main: {}", paths.main.display()))?;

    if let Err(err) = io::copy(&mut bad, &mut main).and_then(|_| main.sync_all()) {
        drop(main);
        if let Err(err) = fs::remove_file(&paths.main) {
            warn!(path = %paths.main.display(), error = %err, "Failed to remove partial main");
        }
        return Err(StorageError::Io {
            source: err,
            context: Some(format!("Failed to copy {}", paths.bad.display()).into()),
        });
    }

    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), StorageError> {
    for entry in WalkDir::new(from) {
        let entry = entry.context(format!("Failed to walk {}", from.display()))?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            fs::copy(entry.path(), &target).context(format!(
                "Failed to copy {} -> {}",
                entry.path().display(),
                target.display()
            ))?;
        }
    }

    Ok(())
}
