use barton_kernel::config::{GatewayConfig, load_config};
use barton_kernel::open_storage;
use barton_storage::SyncMode;
use std::fs;
use tempfile::TempDir;

#[test]
fn config_file_drives_the_storage_engine() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("etc");
    let config_path = dir.path().join("gateway.toml");
    fs::write(
        &config_path,
        format!(
            "[storage]\nroot = {:?}\nsync = \"data\"\nreserved_keys = [\"store\", \"keyring\"]\n",
            root.display().to_string()
        ),
    )
    .unwrap();

    let cfg: GatewayConfig = load_config(Some(&config_path)).unwrap();
    assert_eq!(cfg.storage.sync, SyncMode::Data);

    let storage = open_storage(&cfg.storage).unwrap();
    storage.save("devices", "abc123", r#"{"id":1}"#).unwrap();
    storage.save("devices", "keyring", "secret").unwrap();

    let keys = storage.get_keys("devices").unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys.contains("abc123"));
    assert!(root.join("storage").join("devices").join("abc123").exists());
}
