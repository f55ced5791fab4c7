use barton_kernel::config::LoggingConfig;
use barton_kernel::logging::Logger;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn json_file_logging_captures_storage_events() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let log_dir = tmp_dir.path().join("logs");

    let logger = Logger::init(&LoggingConfig {
        name: "integration-file-logging".to_owned(),
        console: false,
        filter: Some("debug".to_owned()),
        path: Some(log_dir.clone()),
        json: true,
        ..LoggingConfig::default()
    })?;
    assert!(logger.guard().is_some());

    let storage = barton_storage::Storage::builder().root(tmp_dir.path().join("etc")).open()?;
    storage.save("devices", "lamp", r#"{"on":true}"#)?;
    storage.save("devices", "lamp", r#"{"on":false}"#)?;
    fs::write(storage.file_paths("devices", "lamp")?.main, "{ truncated")?;
    storage.load_json("devices", "lamp")?;

    std::thread::sleep(Duration::from_millis(30));
    drop(logger);

    let log_file = fs::read_dir(&log_dir)?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("log"))
        .expect("log file should be created");

    let content = fs::read_to_string(log_file)?;
    let events: Vec<serde_json::Value> =
        content.lines().map(serde_json::from_str).collect::<Result<_, _>>()?;

    assert!(
        events.iter().any(|line| line["fields"]["event"] == "quarantined"),
        "quarantine should be logged with its event name"
    );
    assert!(
        events.iter().any(|line| line["fields"]["message"] == "Value loaded"
            && line["fields"]["source"] == "Backup"),
        "the file serving the load should be logged"
    );
    Ok(())
}
