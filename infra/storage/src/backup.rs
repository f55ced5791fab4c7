//! Helpers for choosing between a file and its backup, and for swapping a freshly written file
//! into service while keeping the previous version as backup.

use crate::events::{EventCounters, StorageEvent};
use crate::paths::{BAD_SUFFIX, with_suffix};
use crate::validator::FileFormat;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Which of a key's files should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileToRead {
    /// The main file exists and is usable.
    Original,
    /// The main file is missing or unusable, the backup is usable.
    Backup,
    /// Neither file is usable.
    NotPresent,
}

impl FileToRead {
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::NotPresent)
    }
}

/// Prefers `original` if it exists as a regular file, then `backup` under the same condition.
///
/// An empty file counts as present: an empty value is a value.
#[must_use]
pub fn choose_file_to_read(original: &Path, backup: &Path) -> FileToRead {
    if is_regular_file(original) {
        debug!(path = %original.display(), "File is safe to read");
        FileToRead::Original
    } else if is_regular_file(backup) {
        debug!(path = %backup.display(), "Original missing, using backup");
        FileToRead::Backup
    } else {
        debug!(path = %original.display(), "Original and backup files are not present");
        FileToRead::NotPresent
    }
}

/// Like [`choose_file_to_read`], but a candidate must also parse as `format`.
///
/// A candidate that exists but does not parse is renamed to `<candidate>.bad` so it is not
/// parsed again.
#[must_use]
pub fn choose_valid_file_to_read(original: &Path, backup: &Path, format: FileFormat) -> FileToRead {
    if is_regular_file(original) && is_valid_for_format(original, format) {
        trace!(path = %original.display(), "Original file is valid");
        return FileToRead::Original;
    }

    if is_regular_file(backup) && is_valid_for_format(backup, format) {
        trace!(path = %backup.display(), "Backup file is valid");
        return FileToRead::Backup;
    }

    warn!(path = %original.display(), ?format, "Neither original nor backup is valid");
    FileToRead::NotPresent
}

fn is_valid_for_format(path: &Path, format: FileFormat) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return false;
    };

    match format.check(&content) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), ?format, error = %err, "File is not valid, moving aside");
            let bad = with_suffix(path, BAD_SUFFIX);
            if let Err(err) = fs::rename(path, &bad) {
                trace!(from = %path.display(), to = %bad.display(), error = %err, "Rename failed");
            }
            false
        },
    }
}

fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file())
}

/// Puts `temp` into service as `original`, keeping the previous `original` as `backup`.
///
/// - If `original` exists it is renamed over `backup`.
/// - If it does not, any `backup` is stale and gets removed.
/// - Any other rotate failure is counted and the new file is put into service anyway.
///
/// # Errors
///
/// Returns the I/O error of the final `temp` -> `original` rename.
pub(crate) fn safe_file_save(
    temp: &Path,
    original: &Path,
    backup: &Path,
    events: &EventCounters,
) -> std::io::Result<()> {
    match fs::rename(original, backup) {
        Ok(()) => {},
        Err(err) if err.kind() == ErrorKind::NotFound => match fs::remove_file(backup) {
            Ok(()) => debug!(path = %backup.display(), "Removed stale backup"),
            Err(err) if err.kind() == ErrorKind::NotFound => {},
            Err(err) => events.record(StorageEvent::StaleBackupRemoveFailed, backup, Some(&err)),
        },
        Err(err) => events.record(StorageEvent::BackupRotateFailed, original, Some(&err)),
    }

    fs::rename(temp, original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const VALID_JSON: &str = r#"{ "a": "1234", "b": "9932" }"#;
    const BAD_JSON: &str = r#"{ "a": "1234", garbage goes here"#;
    const VALID_XML: &str =
        r#"<?xml version="1.0" encoding="UTF-8"?><testConfig><rootNode></rootNode></testConfig>"#;
    const BAD_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><testConfig><lots of garbage here"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn plain_chooser_prefers_any_regular_main() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main", "");
        let backup = write(&dir, "main.bak", "v1");

        assert_eq!(choose_file_to_read(&main, &backup), FileToRead::Original);

        fs::remove_file(&main).unwrap();
        fs::create_dir(&main).unwrap();
        assert_eq!(choose_file_to_read(&main, &backup), FileToRead::Backup);
        fs::remove_dir(&main).unwrap();

        fs::remove_file(&main).unwrap();
        fs::remove_file(&backup).unwrap();
        assert_eq!(choose_file_to_read(&main, &backup), FileToRead::NotPresent);
    }

    #[test]
    fn valid_chooser_prefers_the_parseable_json() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.json", VALID_JSON);
        let bad = write(&dir, "bad.json", BAD_JSON);

        assert_eq!(choose_valid_file_to_read(&good, &bad, FileFormat::Json), FileToRead::Original);
        assert_eq!(choose_valid_file_to_read(&bad, &good, FileFormat::Json), FileToRead::Backup);
    }

    #[test]
    fn valid_chooser_prefers_the_parseable_xml() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.xml", VALID_XML);
        let bad = write(&dir, "bad.xml", BAD_XML);

        assert_eq!(choose_valid_file_to_read(&good, &bad, FileFormat::Xml), FileToRead::Original);
        assert_eq!(choose_valid_file_to_read(&bad, &good, FileFormat::Xml), FileToRead::Backup);
    }

    #[test]
    fn valid_chooser_moves_invalid_candidates_aside() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "conf.json", BAD_JSON);
        let missing = dir.path().join("conf.json.bak");

        assert_eq!(choose_valid_file_to_read(&bad, &missing, FileFormat::Json), FileToRead::NotPresent);
        assert!(!bad.exists());
        assert_eq!(fs::read_to_string(dir.path().join("conf.json.bad")).unwrap(), BAD_JSON);
    }

    #[test]
    fn safe_save_rotates_the_previous_version() {
        let dir = TempDir::new().unwrap();
        let events = EventCounters::default();
        let main = write(&dir, "k", "v1");
        let backup = dir.path().join("k.bak");
        let temp = write(&dir, "k.tmp", "v2");

        safe_file_save(&temp, &main, &backup, &events).unwrap();

        assert_eq!(fs::read_to_string(&main).unwrap(), "v2");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "v1");
        assert!(!temp.exists());
        assert_eq!(events.snapshot().failures(), 0);
    }

    #[test]
    fn safe_save_drops_a_stale_backup_when_main_is_missing() {
        let dir = TempDir::new().unwrap();
        let events = EventCounters::default();
        let main = dir.path().join("k");
        let backup = write(&dir, "k.bak", "ancient");
        let temp = write(&dir, "k.tmp", "fresh");

        safe_file_save(&temp, &main, &backup, &events).unwrap();

        assert_eq!(fs::read_to_string(&main).unwrap(), "fresh");
        assert!(!backup.exists());
    }

    #[test]
    fn safe_save_reports_a_missing_temp() {
        let dir = TempDir::new().unwrap();
        let events = EventCounters::default();
        let main = write(&dir, "k", "v1");
        let backup = dir.path().join("k.bak");
        let temp = dir.path().join("k.tmp");

        assert!(safe_file_save(&temp, &main, &backup, &events).is_err());
    }
}
