// Signal Martingale Bot Library
//
// Reads trade signals from a message channel, schedules each entry plus its
// martingale recovery levels, and stops a cascade as soon as a win is seen

pub mod core;
pub mod clients;
pub mod config;
pub mod db;          // SQLite trade journal
pub mod error;       // Unified error handling
pub mod health;      // HTTP health endpoint
pub mod logging;
pub mod runtime;
pub mod validation;  // Pre-flight validation

// Re-export engine types
pub use core::{
    Attempt, AttemptSink, AttemptState, CascadeBook, CascadeId, CascadePlan, CascadeTicket,
    CommandHandler, CommandReply, Direction, Outcome, ResultEvent, ResultRouter, ScheduleSettings,
    Signal, SignalParser, SubmitOutcome, TimeOfDay, Timeframe, TimezoneTag, TradeScheduler,
    TradingState, TradingStatus,
};

// Re-export error types
pub use error::{BotError, BotResult};

// Re-export validation types
pub use validation::{PreFlightValidator, ServiceFlags, ValidationCheck, ValidationLevel, ValidationResult};

// Re-export client types
pub use clients::{DryRunExecutor, InboundMessage, ResultDetector, TelegramListener, TradeExecutor};

// Re-export configuration
pub use config::{Config, ConfigError, ExecutorMode, LoggingConfig, TradingConfig};

// Re-export database types
pub use db::{Database, TradeJournal};

pub use health::{HealthReport, HealthState};
pub use runtime::{BotRuntime, Dispatch};
