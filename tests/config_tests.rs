use logtide::config::types::{PressureSignal, SortOrder};
use logtide::config::{generate::generate_starter_config, load_config, load_or_default, ConfigError};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_generated_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, generate_starter_config()).unwrap();

    let config = load_config(&config_path).expect("Generated config should be valid");

    assert!(!config.socket.enabled);
    assert_eq!(config.socket.port, 4560);
    assert!(config.polls.is_empty());
    assert_eq!(config.search.page_size, 1000);
    assert_eq!(config.search.max_retries, 4);
    assert_eq!(config.search.backoff_base, Duration::from_millis(300));
    assert_eq!(config.search.idle_timeout, Some(Duration::from_secs(600)));
    assert_eq!(config.search.sort_order, SortOrder::Desc);
    assert_eq!(config.delivery.batch_size, 200);
    assert_eq!(config.delivery.max_field_bytes, 10240);
    assert_eq!(config.delivery.pacing.floor, Duration::from_millis(4));
    assert_eq!(config.delivery.pacing.ceiling, Duration::from_millis(100));
}

#[test]
fn test_env_vars_are_expanded_from_file() {
    std::env::set_var("LOGTIDE_IT_POLL_HOST", "127.0.0.1:8080");
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(
        &config_path,
        r#"
polls:
  - url: http://$env{LOGTIDE_IT_POLL_HOST}/logs
    interval: 750ms
delivery:
  memory:
    signal: queued_bytes
    budget_bytes: 1048576
"#,
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.polls[0].url, "http://127.0.0.1:8080/logs");
    assert_eq!(config.polls[0].interval, Duration::from_millis(750));
    assert_eq!(config.delivery.memory.signal, PressureSignal::QueuedBytes);
    assert_eq!(config.delivery.memory.budget_bytes, Some(1048576));
    std::env::remove_var("LOGTIDE_IT_POLL_HOST");
}

#[test]
fn test_invalid_values_are_listed() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(
        &config_path,
        r#"
delivery:
  memory:
    high_water: 0.5
    low_water: 0.7
    grow_factor: 0.9
"#,
    )
    .unwrap();

    match load_config(&config_path) {
        Err(ConfigError::ValidationList(errors)) => {
            assert_eq!(errors.len(), 2, "{:?}", errors);
            assert!(errors[0].contains("low_water"));
            assert!(errors[1].contains("grow_factor"));
        }
        other => panic!("expected validation list, got {:?}", other),
    }
}

#[test]
fn test_malformed_yaml_names_the_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.yml");
    fs::write(&config_path, "search:\n  page_size: [oops\n").unwrap();

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("broken.yml"), "{}", err);
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.yml");
    assert!(matches!(
        load_or_default(Some(&missing)),
        Err(ConfigError::Io(_))
    ));
}
