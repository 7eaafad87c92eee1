use std::time::Duration;

use assert_matches::assert_matches;

use kira_seqfetch::config::{ConfigLoader, RawConfig, RetryPolicy};
use kira_seqfetch::error::{ErrorKind, FetchError};

#[test]
fn load_json_config_and_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kira-seqfetch.json");
    std::fs::write(
        &path,
        r#"{
            "input": "ids.txt",
            "output": "proteins.fasta",
            "batch_size": 500,
            "database": "protein",
            "rettype": "fasta",
            "max_attempts": 3,
            "pacing": { "batch_delay_ms": 350, "transient_delay_ms": 5000 }
        }"#,
    )
    .unwrap();

    let file = ConfigLoader::load(path.to_str()).unwrap();
    let cli = RawConfig {
        batch_size: Some(100),
        ..RawConfig::default()
    };
    let config = cli.or(file).resolve().unwrap();

    assert_eq!(config.batch_size, 100);
    assert_eq!(config.output.as_str(), "proteins.fasta");
    assert!(config.database.is_protein());
    assert_eq!(
        config.retry,
        RetryPolicy {
            max_attempts: Some(3)
        }
    );
    assert_eq!(config.pacing.batch_delay, Duration::from_millis(350));
    assert_eq!(config.pacing.transient_delay, Duration::from_secs(5));
    assert_eq!(config.pacing.fallback_delay, Duration::from_secs(2));
}

#[test]
fn explicit_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::load(path.to_str()),
        Err(FetchError::ConfigRead(_))
    );
}

#[test]
fn malformed_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"batch_size\": ").unwrap();
    assert_matches!(
        ConfigLoader::load(path.to_str()),
        Err(FetchError::ConfigParse(_))
    );
}

#[test]
fn non_positive_batch_size_is_a_configuration_error() {
    let raw = RawConfig {
        input: Some("ids.txt".to_string()),
        output: Some("out.fasta".to_string()),
        batch_size: Some(0),
        database: Some("nuccore".to_string()),
        rettype: Some("fasta".to_string()),
        ..RawConfig::default()
    };
    let err = raw.resolve().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_matches!(err, FetchError::InvalidBatchSize(0));
}

#[test]
fn missing_required_fields() {
    let err = RawConfig::default().resolve().unwrap_err();
    assert_matches!(err, FetchError::InvalidConfig(ref msg) if msg.contains("input"));
}
