use crate::error::{ConfigError, ConfigErrorExt};
use barton_storage::{DEFAULT_RESERVED_KEY, DEFAULT_STALE_TMP_AFTER, SyncMode};
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Prefix of environment overrides, e.g. `BARTON__STORAGE__ROOT`.
pub const ENV_PREFIX: &str = "BARTON";

const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_FILE: &str = "barton";

/// Top-level gateway configuration.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfigInner {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(flatten, default)]
    inner: Arc<GatewayConfigInner>,
}

impl Deref for GatewayConfig {
    type Target = GatewayConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for GatewayConfig {
    fn deref_mut(&mut self) -> &mut GatewayConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// Settings of the durable key/value store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Configuration root; namespaces live under `<root>/storage`.
    pub root: PathBuf,
    /// Create the root when it does not exist.
    pub create: bool,
    pub sync: SyncMode,
    /// Remove orphaned temp files when the store opens.
    pub purge_stale_tmp: bool,
    pub stale_tmp_after_secs: u64,
    /// File names hidden from key enumeration.
    pub reserved_keys: Vec<String>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Prefix of rolling log file names.
    pub name: String,
    pub console: bool,
    /// Default level when no filter matches (`trace`, `debug`, `info`, `warn`, `error`, `off`).
    pub level: String,
    /// Module directives such as `barton_storage=debug`. `RUST_LOG` applies when unset.
    pub filter: Option<String>,
    /// Directory of rolling log files. No file output when unset.
    pub path: Option<PathBuf>,
    pub json: bool,
    pub rotation: LogRotation,
    pub max_files: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

// --- Default ---

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            create: true,
            sync: SyncMode::default(),
            purge_stale_tmp: true,
            stale_tmp_after_secs: DEFAULT_STALE_TMP_AFTER.as_secs(),
            reserved_keys: vec![DEFAULT_RESERVED_KEY.to_owned()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            name: "barton".to_owned(),
            console: true,
            level: "info".to_owned(),
            filter: None,
            path: None,
            json: false,
            rotation: LogRotation::default(),
            max_files: 10,
        }
    }
}

/// Loads `T` from a file with environment overrides layered on top.
///
/// 1. **Base File**: the given path, or `barton` in the working directory. The format follows
///    the extension (TOML, JSON, YAML); without one every supported extension is tried.
/// 2. **Environment Overrides**: variables prefixed with `BARTON__`, nesting with `__`
///    (`BARTON__STORAGE__ROOT` maps to `storage.root`). `BARTON__STORAGE__RESERVED_KEYS` is a
///    comma separated list.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file is missing or unreadable, or the merged values do not
/// deserialize into `T`.
///
/// # Example
///
/// ```rust
/// use barton_kernel::config::{GatewayConfig, load_config};
///
/// let cfg: GatewayConfig = load_config(Some("/etc/barton/absent")).unwrap_or_default();
/// assert!(cfg.storage.create);
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    load_layered(path, None)
}

fn load_layered<T>(path: Option<impl AsRef<Path>>, env: Option<Map<String, String>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let effective_path =
        path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), |p| p.as_ref().to_path_buf());

    let environment = Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("storage.reserved_keys")
        .source(env);

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(true))
        .add_source(environment);

    info!(path = %effective_path.display(), "Loading config");

    let config = builder
        .build()
        .context(format!("Failed to build config from {}", effective_path.display()))?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const GATEWAY_TOML: &str = r#"
[storage]
root = "/opt/etc"
sync = "data"
stale_tmp_after_secs = 60

[logging]
level = "debug"
rotation = "hourly"
"#;

    fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "barton.toml", "");

        let cfg: GatewayConfig = load_layered(Some(path), Some(Map::new())).unwrap();

        assert_eq!(cfg.storage.root, PathBuf::from("."));
        assert_eq!(cfg.storage.sync, SyncMode::Full);
        assert_eq!(cfg.storage.reserved_keys, [DEFAULT_RESERVED_KEY]);
        assert_eq!(cfg.logging.rotation, LogRotation::Daily);
        assert!(cfg.logging.console);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "barton.toml", GATEWAY_TOML);

        let cfg: GatewayConfig = load_layered(Some(path), Some(Map::new())).unwrap();

        assert_eq!(cfg.storage.root, PathBuf::from("/opt/etc"));
        assert_eq!(cfg.storage.sync, SyncMode::Data);
        assert_eq!(cfg.storage.stale_tmp_after_secs, 60);
        assert!(cfg.storage.purge_stale_tmp);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.rotation, LogRotation::Hourly);
    }

    #[test]
    fn environment_overrides_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "barton.toml", GATEWAY_TOML);
        let env: Map<String, String> = [
            ("BARTON__STORAGE__ROOT", "/data/barton"),
            ("BARTON__STORAGE__PURGE_STALE_TMP", "false"),
            ("BARTON__STORAGE__RESERVED_KEYS", "store,keyring"),
            ("BARTON__LOGGING__JSON", "true"),
            ("UNRELATED__STORAGE__ROOT", "/ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        let cfg: GatewayConfig = load_layered(Some(path), Some(env)).unwrap();

        assert_eq!(cfg.storage.root, PathBuf::from("/data/barton"));
        assert!(!cfg.storage.purge_stale_tmp);
        assert_eq!(cfg.storage.reserved_keys, ["store", "keyring"]);
        assert_eq!(cfg.storage.sync, SyncMode::Data);
        assert!(cfg.logging.json);
    }

    #[test]
    fn json_files_are_supported() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "barton.json", r#"{ "storage": { "create": false } }"#);

        let cfg: GatewayConfig = load_layered(Some(path), Some(Map::new())).unwrap();

        assert!(!cfg.storage.create);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result: Result<GatewayConfig, _> =
            load_layered(Some(dir.path().join("absent.toml")), Some(Map::new()));

        assert!(matches!(result, Err(ConfigError::Config { .. })));
    }

    #[test]
    fn config_clones_share_until_mutated() {
        let original = GatewayConfig::default();
        let mut copy = original.clone();
        copy.storage.create = false;

        assert!(original.storage.create);
        assert!(!copy.storage.create);
    }
}
