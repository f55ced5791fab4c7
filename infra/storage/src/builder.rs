use crate::engine::{Storage, StorageInner};
use crate::error::{StorageError, StorageErrorExt};
use crate::events::EventCounters;
use crate::guard::StorageLock;
use crate::maintenance;
use crate::paths::Layout;
use crate::writer::{SyncMode, SyncStrategy};
use fxhash::FxHashSet;
use private::Sealed;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// File name of the key-ring record that shares the namespace directory with regular keys.
pub const DEFAULT_RESERVED_KEY: &str = "store";

/// Orphaned temps younger than this are assumed to belong to a save still in flight.
pub const DEFAULT_STALE_TMP_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Settings {
    create: bool,
    sync: Arc<dyn SyncStrategy>,
    reserved_keys: FxHashSet<String>,
    purge_stale_tmp: bool,
    stale_tmp_after: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            create: true,
            sync: SyncMode::default().strategy(),
            reserved_keys: std::iter::once(DEFAULT_RESERVED_KEY.to_owned()).collect(),
            purge_stale_tmp: true,
            stale_tmp_after: DEFAULT_STALE_TMP_AFTER,
        }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

/// Fluent configuration for [`Storage`].
///
/// [`StorageBuilder::open`] only exists once a root has been set, so an engine without a root
/// cannot be built.
#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct StorageBuilder<S: Sealed = NoRoot> {
    state: S,
    settings: Settings,
}

#[allow(private_bounds)]
impl<S: Sealed> StorageBuilder<S> {
    #[must_use = "Sets whether the root directory should be created if it does not exist"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.settings.create = enable;
        self
    }

    #[must_use = "Selects one of the built-in sync strategies"]
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.settings.sync = mode.strategy();
        self
    }

    #[must_use = "Installs a custom sync strategy"]
    pub fn sync_strategy(mut self, strategy: impl SyncStrategy + 'static) -> Self {
        self.settings.sync = Arc::new(strategy);
        self
    }

    /// Replaces the set of file names hidden from [`Storage::get_keys`].
    #[must_use = "Sets the reserved key names"]
    pub fn reserved_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.settings.reserved_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use = "Sets whether stale temp files are removed on open"]
    pub const fn purge_stale_tmp(mut self, enable: bool) -> Self {
        self.settings.purge_stale_tmp = enable;
        self
    }

    #[must_use = "Sets the age after which an orphaned temp file is considered stale"]
    pub const fn stale_tmp_after(mut self, age: Duration) -> Self {
        self.settings.stale_tmp_after = age;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> StorageBuilder<N> {
        StorageBuilder { state, settings: self.settings }
    }
}

impl StorageBuilder<NoRoot> {
    #[must_use = "Creates a new storage builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration root. Namespaces live under `<root>/storage`.
    #[must_use = "Sets the root directory path for the storage engine"]
    pub fn root(self, path: impl Into<PathBuf>) -> StorageBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }
}

impl StorageBuilder<WithRoot> {
    /// Consumes the configuration and opens the storage engine.
    ///
    /// 1. Creates the root directory if `create(true)` was set.
    /// 2. Resolves the root to its canonical path.
    /// 3. Removes stale orphaned `.tmp` files left by interrupted saves, if enabled.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the root does not exist and `create` is false, or if the
    /// process cannot create or resolve it.
    pub fn open(self) -> Result<Storage, StorageError> {
        let root = &self.state.0;
        let settings = self.settings;

        if settings.create {
            fs::create_dir_all(root)
                .context(format!("Failed to bootstrap storage root: {}", root.display()))?;
            info!(path = %root.display(), "Bootstrapped storage root directory");
        }

        let canonical = fs::canonicalize(root)
            .context(format!("Failed to resolve storage root: {}", root.display()))?;

        let storage = Storage {
            inner: Arc::new(StorageInner {
                layout: Layout::new(&canonical),
                root: canonical,
                lock: StorageLock::default(),
                sync: settings.sync,
                events: EventCounters::default(),
                reserved_keys: settings.reserved_keys,
            }),
        };

        if settings.purge_stale_tmp {
            maintenance::purge_stale_tmp(
                storage.layout.storage_root(),
                settings.stale_tmp_after,
                &storage.events,
            );
        }

        Ok(storage)
    }
}
