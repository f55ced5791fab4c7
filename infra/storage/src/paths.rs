use crate::error::StorageError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Name of the directory under the configured root that holds every namespace.
pub const STORAGE_DIR: &str = "storage";

pub(crate) const BACKUP_SUFFIX: &str = ".bak";
pub(crate) const TEMP_SUFFIX: &str = ".tmp";
pub(crate) const BAD_SUFFIX: &str = ".bad";

/// The four physical files backing one key's durable state.
///
/// All four live in the same namespace directory and share the key stem. They are never
/// persisted on their own; every operation recomputes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFilePaths {
    /// The authoritative record.
    pub main: PathBuf,
    /// The previous main, rotated in by every save.
    pub backup: PathBuf,
    /// The staging file a save writes before swapping it in.
    pub temp: PathBuf,
    /// Where a main that failed validation is quarantined.
    pub bad: PathBuf,
}

impl StorageFilePaths {
    pub(crate) fn new(namespace_dir: &Path, key: &str) -> Self {
        let main = namespace_dir.join(key);
        Self {
            backup: with_suffix(&main, BACKUP_SUFFIX),
            temp: with_suffix(&main, TEMP_SUFFIX),
            bad: with_suffix(&main, BAD_SUFFIX),
            main,
        }
    }
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Resolves namespaces and keys below `<root>/storage`.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    storage_root: PathBuf,
}

impl Layout {
    pub(crate) fn new(root: &Path) -> Self {
        Self { storage_root: root.join(STORAGE_DIR) }
    }

    pub(crate) fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// `<root>/storage/<namespace>`.
    pub(crate) fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, StorageError> {
        validate_name(namespace, "namespace")?;
        Ok(self.storage_root.join(namespace))
    }

    /// Computes the four sibling paths for `namespace`/`key`. No I/O is performed.
    pub(crate) fn file_paths(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<StorageFilePaths, StorageError> {
        let dir = self.namespace_dir(namespace)?;
        validate_key(key)?;
        Ok(StorageFilePaths::new(&dir, key))
    }
}

/// Rejects names that would leave the namespace directory or alias another file.
fn validate_name(name: &str, kind: &'static str) -> Result<(), StorageError> {
    let reason = if name.is_empty() {
        Some("cannot be empty")
    } else if name == "." || name == ".." {
        Some("cannot be a relative directory reference")
    } else if name.contains(['/', '\\', '\0']) {
        Some("cannot contain path separators or NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidName {
            message: name.to_owned().into(),
            context: Some(format!("{kind} {reason}").into()),
        }),
        None => Ok(()),
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    validate_name(key, "key")?;

    if [BACKUP_SUFFIX, TEMP_SUFFIX, BAD_SUFFIX].iter().any(|suffix| key.ends_with(suffix)) {
        return Err(StorageError::InvalidName {
            message: key.to_owned().into(),
            context: Some("key cannot end in a reserved sibling suffix".into()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_share_the_key_stem() {
        let layout = Layout::new(Path::new("/etc/barton"));
        let paths = layout.file_paths("devices", "abc123").unwrap();

        assert_eq!(paths.main, Path::new("/etc/barton/storage/devices/abc123"));
        assert_eq!(paths.backup, Path::new("/etc/barton/storage/devices/abc123.bak"));
        assert_eq!(paths.temp, Path::new("/etc/barton/storage/devices/abc123.tmp"));
        assert_eq!(paths.bad, Path::new("/etc/barton/storage/devices/abc123.bad"));
        assert!(
            [&paths.backup, &paths.temp, &paths.bad]
                .iter()
                .all(|p| p.parent() == paths.main.parent())
        );
    }

    #[test]
    fn dotted_keys_keep_their_full_name() {
        let layout = Layout::new(Path::new("/data"));
        let paths = layout.file_paths("ns", "system.properties").unwrap();

        assert_eq!(paths.backup, Path::new("/data/storage/ns/system.properties.bak"));
    }

    #[test]
    fn traversal_and_separators_are_rejected() {
        let layout = Layout::new(Path::new("/data"));

        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(layout.file_paths(bad, "key"), Err(StorageError::InvalidName { .. })),
                "namespace {bad:?} should be rejected"
            );
            assert!(
                matches!(layout.file_paths("ns", bad), Err(StorageError::InvalidName { .. })),
                "key {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn sibling_suffixes_are_not_valid_keys() {
        let layout = Layout::new(Path::new("/data"));

        for bad in ["device.bak", "device.tmp", "device.bad"] {
            assert!(layout.file_paths("ns", bad).is_err(), "{bad} should be rejected");
        }
        assert!(layout.file_paths("ns", "device.json").is_ok());
    }
}
