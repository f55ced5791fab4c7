//! Recovery-aware reading of a key: validate the main, quarantine it when it is corrupt, fall
//! back to the backup and put the backup back into service.

use crate::backup::{FileToRead, choose_file_to_read};
use crate::error::StorageError;
use crate::events::{EventCounters, StorageEvent};
use crate::guard::StorageGuard;
use crate::paths::StorageFilePaths;
use crate::validator::{ValidationError, Validator};
use std::fs;
use std::path::Path;
use tracing::{debug, error, warn};

/// How many times a load starts over because a writer changed the key while a validator ran.
const MAX_ATTEMPTS: usize = 8;

/// Result of a locked load attempt.
#[derive(Debug)]
pub(crate) enum LoadOutcome<T> {
    /// A candidate validated. `source` tells which file it came from.
    Loaded { source: FileToRead, value: T },
    /// Neither the main nor the backup existed.
    NotPresent,
    /// At least one candidate existed, none validated. Holds the content of the last candidate
    /// that could be read.
    Invalid { last_attempted: Option<String> },
}

impl<T> LoadOutcome<T> {
    pub(crate) fn into_result(self, paths: &StorageFilePaths) -> Result<T, StorageError> {
        match self {
            Self::Loaded { source, value } => {
                debug!(path = %paths.main.display(), ?source, "Value loaded");
                Ok(value)
            },
            Self::NotPresent => Err(StorageError::KeyNotFound {
                message: paths.main.display().to_string().into(),
                context: None,
            }),
            Self::Invalid { last_attempted } => Err(StorageError::Unparseable {
                message: paths.main.display().to_string().into(),
                last_attempted,
                context: Some("neither main nor backup passed validation".into()),
            }),
        }
    }
}

/// Loads `paths` through `validator` while holding `guard`.
///
/// The guard is released around every validator call and re-acquired afterwards. When the
/// main or the backup changed in the meantime, nothing is quarantined or copied and the choice
/// starts over.
pub(crate) fn load_locked<V>(
    guard: &mut StorageGuard<'_>,
    paths: &StorageFilePaths,
    validator: &V,
    events: &EventCounters,
) -> LoadOutcome<V::Output>
where
    V: Validator + ?Sized,
{
    let mut last_attempted = None;

    for _ in 0..MAX_ATTEMPTS {
        match try_load(guard, paths, validator, events) {
            Step::Done(outcome) => return outcome,
            Step::Changed(content) => {
                debug!(path = %paths.main.display(), "Key changed during validation, choosing again");
                last_attempted = content;
            },
        }
    }

    warn!(path = %paths.main.display(), "Key kept changing during validation, leaving it untouched");
    LoadOutcome::Invalid { last_attempted }
}

enum Step<T> {
    Done(LoadOutcome<T>),
    /// A writer committed while the validator ran. Carries the content that was validated.
    Changed(Option<String>),
}

fn try_load<V>(
    guard: &mut StorageGuard<'_>,
    paths: &StorageFilePaths,
    validator: &V,
    events: &EventCounters,
) -> Step<V::Output>
where
    V: Validator + ?Sized,
{
    let mut last_attempted = None;

    match choose_file_to_read(&paths.main, &paths.backup) {
        FileToRead::NotPresent => return Step::Done(LoadOutcome::NotPresent),
        FileToRead::Original => {
            let attempt = read_and_validate(guard, paths, &paths.main, validator);
            match attempt.verdict {
                Ok(value) => {
                    return Step::Done(LoadOutcome::Loaded { source: FileToRead::Original, value });
                },
                Err(_) if attempt.changed => return Step::Changed(attempt.content),
                Err(err) => {
                    warn!(path = %paths.main.display(), error = %err, "Main failed validation");
                    quarantine(paths, events);
                    last_attempted = attempt.content;
                },
            }
        },
        FileToRead::Backup => {},
    }

    let attempt = read_and_validate(guard, paths, &paths.backup, validator);
    if attempt.changed {
        return Step::Changed(attempt.content);
    }

    match attempt.verdict {
        Ok(value) => {
            match fs::copy(&paths.backup, &paths.main) {
                Ok(_) => debug!(path = %paths.main.display(), "Main restored from backup"),
                Err(err) => events.record(StorageEvent::BackupCopyFailed, &paths.main, Some(&err)),
            }
            events.record(StorageEvent::RestoredFromBackup, &paths.backup, None);
            Step::Done(LoadOutcome::Loaded { source: FileToRead::Backup, value })
        },
        Err(err) => {
            error!(path = %paths.backup.display(), error = %err, "Backup failed validation");
            Step::Done(LoadOutcome::Invalid { last_attempted: attempt.content.or(last_attempted) })
        },
    }
}

struct Attempt<T> {
    verdict: Result<T, ValidationError>,
    /// The text handed to the validator, `None` if the file could not be read.
    content: Option<String>,
    /// Main or backup differ from what they were when the lock was released.
    changed: bool,
}

/// Bytes of a key's main and backup, `None` where a file cannot be read.
#[derive(PartialEq, Eq)]
struct Snapshot {
    main: Option<Vec<u8>>,
    backup: Option<Vec<u8>>,
}

impl Snapshot {
    fn take(paths: &StorageFilePaths) -> Self {
        Self { main: fs::read(&paths.main).ok(), backup: fs::read(&paths.backup).ok() }
    }
}

/// Reads `path` and validates it with the lock released.
///
/// A file that cannot be read as UTF-8 text is treated as invalid without asking the validator.
fn read_and_validate<V>(
    guard: &mut StorageGuard<'_>,
    paths: &StorageFilePaths,
    path: &Path,
    validator: &V,
) -> Attempt<V::Output>
where
    V: Validator + ?Sized,
{
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            return Attempt {
                verdict: Err(ValidationError::from(format!("unreadable {}: {err}", path.display()))),
                content: None,
                changed: false,
            };
        },
    };

    let before = Snapshot::take(paths);
    let verdict = guard.unlocked(|| validator.validate(&content));
    let changed = Snapshot::take(paths) != before;

    Attempt { verdict, content: Some(content), changed }
}

fn quarantine(paths: &StorageFilePaths, events: &EventCounters) {
    match fs::rename(&paths.main, &paths.bad) {
        Ok(()) => events.record(StorageEvent::Quarantined, &paths.bad, None),
        Err(err) => events.record(StorageEvent::QuarantineFailed, &paths.main, Some(&err)),
    }
}
