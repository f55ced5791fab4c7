use barton_error::{format_context, source_variant};
use std::borrow::Cow;
use std::path::PathBuf;

/// A specialized [`StorageError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid storage name{}: {message}", format_context(.context))]
    InvalidName { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Key not found{}: {message}", format_context(.context))]
    KeyNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Neither the main nor the backup validated. `last_attempted` holds the content of the last
    /// candidate that could be read, for forensic recovery.
    #[error("No valid content{}: {message}", format_context(.context))]
    Unparseable {
        message: Cow<'static, str>,
        last_attempted: Option<String>,
        context: Option<Cow<'static, str>>,
    },

    #[error("Namespace not found{}: {message}", format_context(.context))]
    NamespaceNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Storage lock re-entered by its owner{}: {message}", format_context(.context))]
    Reentrant { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Directory walk failure{}: {source}", format_context(.context))]
    Walk { source: walkdir::Error, context: Option<Cow<'static, str>> },
}

/// Outcome codes of [`crate::Storage::restore_namespace`] other than success.
///
/// Callers need to tell "nothing to restore" apart from "restore blocked by existing data" and
/// "copy failed partway", so these stay distinct from [`StorageError`].
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The donor namespace directory does not exist.
    #[error("Restore source missing: {}", .path.display())]
    NewDirMissing { path: PathBuf },

    /// The existing namespace directory could not be removed; nothing was copied.
    #[error("Failed to delete current namespace {}: {source}", .path.display())]
    OldConfigDeleteFailed { path: PathBuf, source: std::io::Error },

    /// Copying the donor tree into place failed partway.
    #[error("Failed to copy namespace{}: {source}", format_context(.context))]
    FailedCopy { source: Box<StorageError>, context: Option<Cow<'static, str>> },

    /// The request was refused before touching the filesystem (bad name, lock re-entry).
    #[error("Restore refused: {source}")]
    Refused { source: Box<StorageError> },
}

impl From<StorageError> for RestoreError {
    fn from(source: StorageError) -> Self {
        Self::Refused { source: Box::new(source) }
    }
}

pub trait StorageErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError>;
}

impl<T> StorageErrorExt<T> for Result<T, StorageError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                StorageError::InvalidName { context: c, .. }
                | StorageError::KeyNotFound { context: c, .. }
                | StorageError::Unparseable { context: c, .. }
                | StorageError::NamespaceNotFound { context: c, .. }
                | StorageError::Reentrant { context: c, .. }
                | StorageError::Io { context: c, .. }
                | StorageError::Walk { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

source_variant!(StorageError::Io, std::io::Error, StorageErrorExt);
source_variant!(StorageError::Walk, walkdir::Error, StorageErrorExt);

impl StorageError {
    /// Returns `true` when the error means "key effectively absent": nothing on disk, or nothing
    /// on disk that validates.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::Unparseable { .. })
    }
}
