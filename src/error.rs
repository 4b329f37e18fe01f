//! Unified error handling for the signal bot
//!
//! Engine failures (a bad signal, a failed placement, a missing result) are
//! contained where they happen and surface as logged state, not as errors.
//! `BotError` covers the outer shell: configuration, collaborators, the
//! journal and the HTTP endpoint.

use std::fmt;
use std::io;

/// Main error type for the signal bot
#[derive(Debug)]
pub enum BotError {
    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // Message channel errors
    ChannelConnection(String),
    ChannelConfig(String),

    // Execution collaborator errors
    ExecutionFailed(String),
    ExecutorUnavailable(String),

    // Result detection errors
    ResultDetection(String),

    // Journal errors
    DatabaseConnection(String),
    DatabaseQuery(String),

    // Health endpoint errors
    Server(String),

    // Signal errors (CLI only; the live pipeline drops invalid signals)
    InvalidSignal(String),

    // IO errors
    FileNotFound(String),
    FileRead(String),
    FileWrite(String),

    // General errors
    Internal(String),
}

impl BotError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            BotError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: signal-bot init\n\
                    2. Edit config.toml with your channel id and bot token\n\
                    3. Try again",
                    path
                )
            }
            BotError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - A positive base_amount\n\
                    - Timezone tags in the form UTC-3\n\
                    - A bind address like 0.0.0.0:6081",
                    msg
                )
            }
            BotError::ChannelConfig(msg) => {
                format!(
                    "Message channel is not configured: {}\n\n\
                    💡 Set TELEGRAM_BOT_TOKEN and TELEGRAM_CHANNEL\n\
                    (in the environment, .env, or the [channel] section),\n\
                    or run with --stdin to feed signals by hand",
                    msg
                )
            }
            BotError::ExecutorUnavailable(msg) => {
                format!(
                    "Trade executor unavailable: {}\n\n\
                    💡 Either:\n\
                    - Install the command configured in [executor]\n\
                    - Run with --dry-run for paper trading",
                    msg
                )
            }
            BotError::DatabaseConnection(msg) => {
                format!(
                    "Journal database connection failed: {}\n\n\
                    💡 Try:\n\
                    1. Run: signal-bot init\n\
                    2. Check data/ directory permissions\n\
                    3. Set [database] enabled = false to run without a journal",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            BotError::ConfigNotFound(_)
            | BotError::ConfigParse(_)
            | BotError::ConfigValidation(_) => "config",

            BotError::ChannelConnection(_) | BotError::ChannelConfig(_) => "channel",

            BotError::ExecutionFailed(_) | BotError::ExecutorUnavailable(_) => "execution",

            BotError::ResultDetection(_) => "results",

            BotError::DatabaseConnection(_) | BotError::DatabaseQuery(_) => "database",

            BotError::Server(_) => "server",

            BotError::InvalidSignal(_) => "signal",

            BotError::FileNotFound(_) | BotError::FileRead(_) | BotError::FileWrite(_) => "io",

            BotError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::ConfigNotFound(path) => write!(f, "Configuration file not found: {}", path),
            BotError::ConfigParse(msg) => write!(f, "Configuration parse error: {}", msg),
            BotError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            BotError::ChannelConnection(msg) => write!(f, "Channel connection error: {}", msg),
            BotError::ChannelConfig(msg) => write!(f, "Channel configuration error: {}", msg),

            BotError::ExecutionFailed(msg) => write!(f, "Trade placement failed: {}", msg),
            BotError::ExecutorUnavailable(msg) => write!(f, "Executor unavailable: {}", msg),

            BotError::ResultDetection(msg) => write!(f, "Result detection error: {}", msg),

            BotError::DatabaseConnection(msg) => write!(f, "Database connection error: {}", msg),
            BotError::DatabaseQuery(msg) => write!(f, "Database query error: {}", msg),

            BotError::Server(msg) => write!(f, "Health server error: {}", msg),

            BotError::InvalidSignal(msg) => write!(f, "Invalid signal: {}", msg),

            BotError::FileNotFound(path) => write!(f, "File not found: {}", path),
            BotError::FileRead(msg) => write!(f, "File read error: {}", msg),
            BotError::FileWrite(msg) => write!(f, "File write error: {}", msg),

            BotError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for BotError {}

// Conversion implementations for common error types

impl From<io::Error> for BotError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => BotError::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => BotError::FileRead(err.to_string()),
            _ => BotError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<rusqlite::Error> for BotError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => BotError::DatabaseQuery(msg),
            rusqlite::Error::QueryReturnedNoRows => {
                BotError::DatabaseQuery("Query returned no rows".to_string())
            }
            _ => BotError::DatabaseQuery(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for BotError {
    fn from(err: toml::de::Error) -> Self {
        BotError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<crate::config::ConfigError> for BotError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => BotError::ConfigNotFound(path),
            ConfigError::FileRead(msg) => BotError::FileRead(msg),
            ConfigError::FileWrite(msg) => BotError::FileWrite(msg),
            ConfigError::Parse(msg) | ConfigError::Serialize(msg) => BotError::ConfigParse(msg),
            ConfigError::Validation(msg) => BotError::ConfigValidation(msg),
        }
    }
}

impl From<String> for BotError {
    fn from(msg: String) -> Self {
        BotError::Internal(msg)
    }
}

impl From<&str> for BotError {
    fn from(msg: &str) -> Self {
        BotError::Internal(msg.to_string())
    }
}

/// Result type alias using BotError
pub type BotResult<T> = Result<T, BotError>;
