use super::types::*;
use crate::config::{expand_env_vars, resolve_config_path, unexpanded_env_vars};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Loads the config from the resolved location, or built-in defaults when no
/// file exists. Returns the path that was used, if any.
pub fn load_or_default(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    match resolve_config_path(explicit) {
        Some(path) => {
            let config = load_config(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((Config::default(), None)),
    }
}

/// Parses YAML text: expands `$env{VAR}` references, deserializes, validates.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    // An empty document is valid and means "all defaults".
    let config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml_string)?
    };

    validate_config(&config)?;
    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let unexpanded_vars = unexpanded_env_vars(yaml_string);

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_socket(&config.socket, &mut errors);
    validate_polls(config, &mut errors);
    validate_search(&config.search, &mut errors);
    validate_delivery(&config.delivery, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_socket(socket: &SocketConfig, errors: &mut Vec<String>) {
    if socket.enabled && socket.port == 0 {
        errors.push("socket.port must be non-zero when the socket source is enabled".to_string());
    }
    if socket.max_line_bytes == 0 {
        errors.push("socket.max_line_bytes must be greater than 0".to_string());
    }
    if socket.bind.trim().is_empty() {
        errors.push("socket.bind cannot be empty".to_string());
    }
}

fn validate_polls(config: &Config, errors: &mut Vec<String>) {
    for (i, target) in config.polls.iter().enumerate() {
        match reqwest::Url::parse(&target.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "polls[{}]: unsupported URL scheme '{}' (expected http or https)",
                i,
                url.scheme()
            )),
            Err(e) => errors.push(format!("polls[{}]: invalid URL '{}': {}", i, target.url, e)),
        }
        if target.interval.is_zero() {
            errors.push(format!("polls[{}]: interval must be greater than 0", i));
        }
    }

    if config.poll.forward_chunk == 0 {
        errors.push("poll.forward_chunk must be greater than 0".to_string());
    }
    if config.poll.timeout.is_zero() {
        errors.push("poll.timeout must be greater than 0".to_string());
    }
}

fn validate_search(search: &SearchConfig, errors: &mut Vec<String>) {
    if search.page_size == 0 {
        errors.push("search.page_size must be greater than 0".to_string());
    }
    if search.keep_alive.trim().is_empty() {
        errors.push("search.keep_alive cannot be empty".to_string());
    }
    if search.timeout.is_zero() {
        errors.push("search.timeout must be greater than 0".to_string());
    }
    if search.timestamp_field.trim().is_empty() {
        errors.push("search.timestamp_field cannot be empty".to_string());
    }
    if search.tiebreak_field.trim().is_empty() {
        errors.push("search.tiebreak_field cannot be empty".to_string());
    }
    if search.idle_timeout.is_some_and(|idle| idle.is_zero()) {
        errors.push("search.idle_timeout must be greater than 0 (omit it to disable reaping)".to_string());
    }
}

fn validate_delivery(delivery: &DeliveryConfig, errors: &mut Vec<String>) {
    if delivery.batch_size == 0 {
        errors.push("delivery.batch_size must be greater than 0".to_string());
    }
    if delivery.max_field_bytes < 64 {
        errors.push("delivery.max_field_bytes must be at least 64".to_string());
    }
    if delivery.capacity == 0 {
        errors.push("delivery.capacity must be greater than 0".to_string());
    }
    if delivery.min_capacity == 0 || delivery.min_capacity > delivery.capacity {
        errors.push(format!(
            "delivery.min_capacity ({}) must be between 1 and delivery.capacity ({})",
            delivery.min_capacity, delivery.capacity
        ));
    }

    let pacing = &delivery.pacing;
    if pacing.floor > pacing.ceiling {
        errors.push(format!(
            "delivery.pacing.floor ({:?}) cannot exceed delivery.pacing.ceiling ({:?})",
            pacing.floor, pacing.ceiling
        ));
    }
    if pacing.fast_threshold > pacing.slow_threshold {
        errors.push(
            "delivery.pacing.fast_threshold cannot exceed delivery.pacing.slow_threshold"
                .to_string(),
        );
    }

    let memory = &delivery.memory;
    if !(0.0..=1.0).contains(&memory.low_water) || !(0.0..=1.0).contains(&memory.high_water) {
        errors.push("delivery.memory water marks must be between 0 and 1".to_string());
    }
    if memory.low_water >= memory.high_water {
        errors.push(format!(
            "delivery.memory.low_water ({}) must be below high_water ({})",
            memory.low_water, memory.high_water
        ));
    }
    if !(memory.shrink_factor > 0.0 && memory.shrink_factor < 1.0) {
        errors.push("delivery.memory.shrink_factor must be between 0 and 1 (exclusive)".to_string());
    }
    if memory.grow_factor <= 1.0 {
        errors.push("delivery.memory.grow_factor must be greater than 1".to_string());
    }
    if memory.sample_interval.is_zero() {
        errors.push("delivery.memory.sample_interval must be greater than 0".to_string());
    }
    if memory.budget_bytes == Some(0) {
        errors.push("delivery.memory.budget_bytes must be greater than 0".to_string());
    }
}
