use crate::backup::FileToRead;
use crate::engine::Storage;
use crate::error::{RestoreError, StorageError};
use crate::validator::{Validator, XmlDocument};
use fxhash::FxHashSet;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// A view of [`Storage`] bound to one namespace.
///
/// Every call is forwarded to the parent engine with the namespace filled in, so it shares the
/// engine's lock, settings and event counters. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct NamespacedStorage {
    storage: Storage,
    namespace: Arc<str>,
}

impl NamespacedStorage {
    pub(crate) fn new(storage: Storage, namespace: impl Into<Arc<str>>) -> Self {
        Self { storage, namespace: namespace.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.namespace
    }

    /// # Errors
    ///
    /// See [`Storage::save`].
    pub fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage.save(&self.namespace, key, value)
    }

    /// # Errors
    ///
    /// See [`Storage::load`].
    pub fn load(&self, key: &str) -> Result<String, StorageError> {
        self.storage.load(&self.namespace, key)
    }

    /// # Errors
    ///
    /// See [`Storage::parse`].
    pub fn parse<V>(&self, key: &str, validator: &V) -> Result<V::Output, StorageError>
    where
        V: Validator + ?Sized,
    {
        self.storage.parse(&self.namespace, key, validator)
    }

    /// # Errors
    ///
    /// See [`Storage::parse_bad`].
    pub fn parse_bad<V>(&self, key: &str, validator: &V) -> Result<V::Output, StorageError>
    where
        V: Validator + ?Sized,
    {
        self.storage.parse_bad(&self.namespace, key, validator)
    }

    /// # Errors
    ///
    /// See [`Storage::load_json`].
    pub fn load_json(&self, key: &str) -> Result<serde_json::Value, StorageError> {
        self.storage.load_json(&self.namespace, key)
    }

    /// # Errors
    ///
    /// See [`Storage::load_json_as`].
    pub fn load_json_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        self.storage.load_json_as(&self.namespace, key)
    }

    /// # Errors
    ///
    /// See [`Storage::load_xml`].
    pub fn load_xml(&self, key: &str) -> Result<XmlDocument, StorageError> {
        self.storage.load_xml(&self.namespace, key)
    }

    /// # Errors
    ///
    /// See [`Storage::delete`].
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.storage.delete(&self.namespace, key)
    }

    /// # Errors
    ///
    /// See [`Storage::get_keys`].
    pub fn keys(&self) -> Result<FxHashSet<String>, StorageError> {
        self.storage.get_keys(&self.namespace)
    }

    /// # Errors
    ///
    /// See [`Storage::has_key`].
    pub fn has_key(&self, key: &str) -> Result<FileToRead, StorageError> {
        self.storage.has_key(&self.namespace, key)
    }

    /// # Errors
    ///
    /// See [`Storage::get_mtime`].
    pub fn mtime(&self, key: &str) -> Result<SystemTime, StorageError> {
        self.storage.get_mtime(&self.namespace, key)
    }

    /// Removes the whole namespace. The view stays usable; the next save recreates it.
    ///
    /// # Errors
    ///
    /// See [`Storage::delete_namespace`].
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.delete_namespace(&self.namespace)
    }

    /// # Errors
    ///
    /// See [`Storage::restore_namespace`].
    pub fn restore_from(&self, donor_root: impl AsRef<Path>) -> Result<(), RestoreError> {
        self.storage.restore_namespace(&self.namespace, donor_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn view_forwards_to_its_namespace() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::builder().root(dir.path()).open().unwrap();
        let devices = storage.namespace("devices").unwrap();

        devices.save("lamp", "on").unwrap();

        assert_eq!(devices.name(), "devices");
        assert_eq!(storage.load("devices", "lamp").unwrap(), "on");
        assert!(devices.keys().unwrap().contains("lamp"));

        devices.clear().unwrap();
        assert!(matches!(devices.keys(), Err(StorageError::NamespaceNotFound { .. })));
    }

    #[test]
    fn invalid_namespace_names_are_rejected_up_front() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::builder().root(dir.path()).open().unwrap();

        assert!(matches!(storage.namespace("../etc"), Err(StorageError::InvalidName { .. })));
    }
}
