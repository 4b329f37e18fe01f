// Integration tests for configuration loading and validation

mod common;

use serial_test::serial;
use signal_martingale_bot::{Config, ConfigError, ExecutorMode};
use common::create_test_config;
use std::fs;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const ENV_KEYS: [&str; 5] = [
    "BASE_TRADE_AMOUNT",
    "MAX_MARTINGALE",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHANNEL",
    "HEALTH_PORT",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");

    let mut config = create_test_config();
    config.trading.base_amount = 3.0;
    config.channel.channel_id = Some("-1001234".to_string());
    config.to_file(&config_path).expect("Failed to write config");

    let loaded = Config::from_file(&config_path).expect("Failed to load config");
    assert_eq!(loaded.trading.base_amount, 3.0);
    assert!(loaded.trading.start_active);
    assert_eq!(loaded.channel.channel_id.as_deref(), Some("-1001234"));
    assert!(!loaded.health.enabled);
}

#[test]
fn test_shipped_example_parses() {
    let example = include_str!("../config.toml.example");
    let config: Config = toml::from_str(example).expect("example config should parse");

    assert_ok!(config.validate());
    assert_eq!(config.trading.max_martingale_levels, 2);
    assert_eq!(config.trading.default_timezone, "UTC-3");
    assert_eq!(config.parser.trusted_markers, vec!["anna signals".to_string()]);
    assert_eq!(config.executor.mode, ExecutorMode::DryRun);
    assert_eq!(config.executor.buy_command, vec!["xdotool", "key", "shift+w"]);
}

#[test]
fn test_config_error_handling() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let non_existent_path = temp_dir.path().join("non_existent.toml");

    let result = Config::from_file(&non_existent_path);
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_config_malformed_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("malformed.toml");

    fs::write(&config_path, "this is not valid toml {{{").expect("Failed to write malformed config");

    let result = Config::from_file(&config_path);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("invalid.toml");

    fs::write(&config_path, "[trading]\nmax_martingale_levels = 50\n").expect("Failed to write config");
    assert!(matches!(
        Config::from_file(&config_path),
        Err(ConfigError::Validation(_))
    ));

    fs::write(&config_path, "[results]\npoll_interval_ms = 0\n").expect("Failed to write config");
    assert_err!(Config::from_file(&config_path));

    fs::write(&config_path, "[health]\nbind = \"not-an-address\"\n").expect("Failed to write config");
    assert_err!(Config::from_file(&config_path));
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("fresh.toml");

    let created = Config::load_or_create(&config_path).expect("Failed to create config");
    assert!(config_path.exists());
    assert_eq!(created.trading.base_amount, 1.0);

    let reloaded = Config::load_or_create(&config_path).expect("Failed to reload config");
    assert_eq!(reloaded.health.bind, created.health.bind);
}

#[test]
#[serial]
fn test_env_overrides_from_process_environment() {
    clear_env();
    std::env::set_var("BASE_TRADE_AMOUNT", "5");
    std::env::set_var("MAX_MARTINGALE", "1");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
    std::env::set_var("TELEGRAM_CHANNEL", "@annasignals");
    std::env::set_var("HEALTH_PORT", "8088");

    let mut config = Config::default();
    let result = config.apply_env_overrides();
    clear_env();

    assert_ok!(result);
    assert_eq!(config.trading.base_amount, 5.0);
    assert_eq!(config.trading.max_martingale_levels, 1);
    assert_eq!(config.channel.bot_token.as_deref(), Some("123:abc"));
    assert_eq!(config.channel.channel_id.as_deref(), Some("@annasignals"));
    assert_eq!(config.health_addr().unwrap().port(), 8088);
}

#[test]
#[serial]
fn test_env_override_out_of_range_rejected() {
    clear_env();
    std::env::set_var("MAX_MARTINGALE", "25");

    let mut config = Config::default();
    let result = config.apply_env_overrides();
    clear_env();

    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
#[serial]
fn test_blank_env_values_are_ignored() {
    clear_env();
    std::env::set_var("TELEGRAM_BOT_TOKEN", "   ");

    let mut config = create_test_config();
    config.channel.bot_token = Some("from-file".to_string());
    let result = config.apply_env_overrides();
    clear_env();

    assert_ok!(result);
    assert_eq!(config.channel.bot_token.as_deref(), Some("from-file"));
}
