//! Crash-safe, namespaced key/value storage for the gateway's configuration data.
//!
//! Each key is a small text file under `<root>/storage/<namespace>/`, accompanied by up to three
//! siblings:
//!
//! | File | Role |
//! |------|------|
//! | `<key>` | the current value (main) |
//! | `<key>.bak` | the value before the last save (backup) |
//! | `<key>.tmp` | staging file of a save in progress |
//! | `<key>.bad` | a main that failed validation (quarantine) |
//!
//! # Core Features
//!
//! - **Atomic Writes**: temp write + flush + `fsync` + rename, rotating the previous main into
//!   the backup slot.
//! - **Recovery-Aware Loads**: an injected [`Validator`] decides whether the main is usable; a
//!   bad main is quarantined and the backup is served and put back into service.
//! - **Serialized Access**: one error-checking lock per engine; validators run with the lock
//!   released and may call back into the engine.
//! - **Observable Degradation**: every swallowed failure and every recovery is a
//!   [`StorageEvent`] with a counter.
//! - **Self-Healing**: stale orphaned temp files are removed when the engine opens.
//!
//! # Examples
//!
//! ```rust
//! use barton_storage::{FileToRead, Storage, StorageError};
//!
//! # fn main() -> Result<(), StorageError> {
//! # let tmp = tempfile::tempdir().unwrap();
//! let storage = Storage::builder().root(tmp.path()).open()?;
//! let devices = storage.namespace("devices")?;
//!
//! devices.save("lamp", r#"{"on":true}"#)?;
//! assert_eq!(devices.has_key("lamp")?, FileToRead::Original);
//!
//! // A corrupt main is quarantined and the previous value is served from the backup.
//! devices.save("lamp", r#"{"on":false}"#)?;
//! std::fs::write(storage.file_paths("devices", "lamp")?.main, "{ truncated").unwrap();
//!
//! let recovered = devices.load_json("lamp")?;
//! assert_eq!(recovered["on"], true);
//! # Ok(())
//! # }
//! ```

mod backup;
mod builder;
mod engine;
mod error;
mod events;
mod guard;
mod loader;
mod maintenance;
mod namespace;
mod paths;
mod validator;
mod writer;

pub use backup::{FileToRead, choose_file_to_read, choose_valid_file_to_read};
pub use builder::{DEFAULT_RESERVED_KEY, DEFAULT_STALE_TMP_AFTER, NoRoot, StorageBuilder, WithRoot};
pub use engine::Storage;
pub use error::{RestoreError, StorageError, StorageErrorExt};
pub use events::{EventSnapshot, StorageEvent};
pub use namespace::NamespacedStorage;
pub use paths::{STORAGE_DIR, StorageFilePaths};
pub use validator::{AnyContent, FileFormat, Json, ValidationError, Validator, Xml, XmlDocument};
pub use writer::{DataSync, FullSync, SyncMode, SyncStrategy};
