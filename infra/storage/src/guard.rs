//! The single lock that serializes every operation of a [`crate::Storage`].
//!
//! It behaves like an error-checking mutex: a thread that already holds the lock and asks for
//! it again gets [`StorageError::Reentrant`] instead of deadlocking.

use crate::error::StorageError;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

const UNOWNED: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

#[derive(Debug, Default)]
pub(crate) struct StorageLock {
    mutex: Mutex<()>,
    owner: AtomicU64,
}

impl StorageLock {
    /// Blocks until the lock is acquired by the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Reentrant`] if the calling thread already holds it.
    pub(crate) fn acquire(&self, operation: &'static str) -> Result<StorageGuard<'_>, StorageError> {
        let token = current_token();

        if self.owner.load(Ordering::Acquire) == token {
            return Err(StorageError::Reentrant {
                message: operation.into(),
                context: Some("storage API called while the same thread holds the lock".into()),
            });
        }

        let inner = self.mutex.lock();
        self.owner.store(token, Ordering::Release);

        Ok(StorageGuard { inner, owner: &self.owner, token })
    }
}

#[derive(Debug)]
pub(crate) struct StorageGuard<'a> {
    inner: MutexGuard<'a, ()>,
    owner: &'a AtomicU64,
    token: u64,
}

impl StorageGuard<'_> {
    /// Releases the lock while `f` runs and re-acquires it before returning.
    ///
    /// Used to call validators, which may themselves use the storage API.
    pub(crate) fn unlocked<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.owner.store(UNOWNED, Ordering::Release);
        let result = MutexGuard::unlocked(&mut self.inner, f);
        self.owner.store(self.token, Ordering::Release);
        result
    }
}

impl Drop for StorageGuard<'_> {
    fn drop(&mut self) {
        self.owner.store(UNOWNED, Ordering::Release);
    }
}
