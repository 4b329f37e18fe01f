// Configuration management for the signal bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::core::martingale::DEFAULT_FALLBACK_LEVELS;
use crate::core::types::TimezoneTag;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub base_amount: f64,
    pub max_martingale_levels: u32,
    pub default_timezone: String,   // Tag the signal provider uses when times need no shift
    pub timezone_shift_hours: i64,  // Static correction for any other tag
    pub start_active: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            base_amount: 1.0,
            max_martingale_levels: 2,
            default_timezone: "UTC-3".to_string(),
            timezone_shift_hours: 1,
            start_active: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub trusted_markers: Vec<String>,
    pub fallback_levels: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            trusted_markers: vec!["anna signals".to_string()],
            fallback_levels: DEFAULT_FALLBACK_LEVELS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>, // Numeric chat id or @username
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorMode {
    DryRun,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub mode: ExecutorMode,
    pub buy_command: Vec<String>,
    pub sell_command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::DryRun,
            buy_command: vec!["xdotool".into(), "key".into(), "shift+w".into()],
            sell_command: vec!["xdotool".into(), "key".into(), "shift+s".into()],
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub poll_interval_ms: u64,
    pub source_file: Option<PathBuf>,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            source_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub bind: String,
    pub vnc_url: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:6081".to_string(),
            vnc_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("data/signal_bot.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_to_file: bool,
    pub log_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
            log_file: PathBuf::from("logs/signal-bot.log"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trading: TradingConfig,
    pub parser: ParserConfig,
    pub channel: ChannelConfig,
    pub executor: ExecutorConfig,
    pub results: ResultsConfig,
    pub health: HealthConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            println!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Apply the environment variables the deployment scripts set.
    ///
    /// Call after `dotenvy::dotenv()` so a local `.env` file is honored.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override lookup used by `apply_env_overrides`; tests pass a closure
    /// instead of touching the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("BASE_TRADE_AMOUNT") {
            self.trading.base_amount = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("BASE_TRADE_AMOUNT is not a number: {}", raw))
            })?;
        }

        if let Some(raw) = lookup("MAX_MARTINGALE") {
            self.trading.max_martingale_levels = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("MAX_MARTINGALE is not an integer: {}", raw))
            })?;
        }

        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.channel.bot_token = Some(token.trim().to_string());
        }

        if let Some(channel) = lookup("TELEGRAM_CHANNEL").filter(|c| !c.trim().is_empty()) {
            self.channel.channel_id = Some(channel.trim().to_string());
        }

        if let Some(raw) = lookup("HEALTH_PORT") {
            let port: u16 = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("HEALTH_PORT is not a port number: {}", raw))
            })?;
            let host = self
                .health
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.health.bind = format!("{}:{}", host, port);
        }

        self.validate()
    }

    /// Parsed bind address of the health endpoint
    pub fn health_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.health.bind.parse().map_err(|_| {
            ConfigError::Validation(format!("health.bind is not a socket address: {}", self.health.bind))
        })
    }

    /// Parsed default timezone tag
    pub fn default_timezone(&self) -> Result<TimezoneTag, ConfigError> {
        self.trading.default_timezone.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "default_timezone is not a UTC offset tag: {}",
                self.trading.default_timezone
            ))
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.trading.base_amount > 0.0) {
            return Err(ConfigError::Validation("base_amount must be positive".to_string()));
        }

        if self.trading.max_martingale_levels > 10 {
            return Err(ConfigError::Validation(
                "max_martingale_levels must be at most 10".to_string(),
            ));
        }

        if self.trading.timezone_shift_hours.abs() > 23 {
            return Err(ConfigError::Validation(
                "timezone_shift_hours must be within ±23".to_string(),
            ));
        }

        self.default_timezone()?;

        if self.parser.fallback_levels > 10 {
            return Err(ConfigError::Validation(
                "fallback_levels must be at most 10".to_string(),
            ));
        }

        if self.results.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.health.enabled {
            self.health_addr()?;
        }

        if self.executor.mode == ExecutorMode::Command {
            if self.executor.buy_command.is_empty() || self.executor.sell_command.is_empty() {
                return Err(ConfigError::Validation(
                    "buy_command and sell_command are required in command mode".to_string(),
                ));
            }
            if self.executor.timeout_secs == 0 {
                return Err(ConfigError::Validation(
                    "timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
