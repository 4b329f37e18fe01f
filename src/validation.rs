//! Pre-flight validation for the signal bot
//!
//! Runs before `run` and from `signal-bot check`. Each collaborator gets a
//! check, and the outcome doubles as the availability flags reported by the
//! health endpoint.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clients::{build_detector, build_executor};
use crate::config::{Config, ExecutorMode};
use crate::db::Database;

/// Validation result with detailed findings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub checks: Vec<ValidationCheck>,
    pub services: ServiceFlags,
}

#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub level: ValidationLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must pass for the bot to start
    Warning,  // Bot runs with the feature degraded
    Info,
}

/// Which collaborators are usable in this environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceFlags {
    pub executor: bool,
    pub results: bool,
    pub telegram: bool,
    pub journal: bool,
}

impl ValidationCheck {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.into(),
            level: ValidationLevel::Info,
        }
    }

    fn fail(name: &str, message: impl Into<String>, level: ValidationLevel) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.into(),
            level,
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            passed: true,
            checks: Vec::new(),
            services: ServiceFlags::default(),
        }
    }

    pub fn add_check(&mut self, check: ValidationCheck) {
        if !check.passed && check.level == ValidationLevel::Critical {
            self.passed = false;
        }
        self.checks.push(check);
    }

    pub fn critical_failures(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Critical)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Warning)
            .collect()
    }

    pub fn check(&self, name: &str) -> Option<&ValidationCheck> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn display(&self) {
        info!("🔍 Pre-flight Validation");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        for check in &self.checks {
            let icon = if check.passed {
                "✅"
            } else {
                match check.level {
                    ValidationLevel::Critical => "❌",
                    ValidationLevel::Warning => "⚠️",
                    ValidationLevel::Info => "ℹ️",
                }
            };

            info!("{} {} - {}", icon, check.name, check.message);
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if !self.passed {
            let failures = self.critical_failures();
            error!("❌ Validation failed: {} critical issue(s)", failures.len());
            for failure in failures {
                error!("   • {}: {}", failure.name, failure.message);
            }
        } else {
            let warnings = self.warnings();
            if !warnings.is_empty() {
                warn!("⚠️  {} warning(s) detected", warnings.len());
                for warning in warnings {
                    warn!("   • {}: {}", warning.name, warning.message);
                }
            }
            info!("✅ All critical checks passed");
        }
    }
}

/// Pre-flight validator for the bot's collaborators
pub struct PreFlightValidator {
    config: Config,
    force_dry_run: bool,
    use_telegram: bool,
}

impl PreFlightValidator {
    pub fn new(config: Config) -> Self {
        PreFlightValidator {
            config,
            force_dry_run: false,
            use_telegram: true,
        }
    }

    /// Validate as if `--dry-run` was passed
    pub fn dry_run(mut self, force_dry_run: bool) -> Self {
        self.force_dry_run = force_dry_run;
        self
    }

    /// Skip the channel check when messages come from stdin
    pub fn with_telegram(mut self, use_telegram: bool) -> Self {
        self.use_telegram = use_telegram;
        self
    }

    /// Run the full validation suite
    pub fn validate_all(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(self.check_config());

        let executor = self.check_executor();
        result.services.executor = executor.passed;
        result.add_check(executor);

        let results = self.check_results();
        result.services.results = results.passed;
        result.add_check(results);

        let telegram = self.check_channel();
        result.services.telegram = telegram.passed;
        result.add_check(telegram);

        if let Some(journal) = self.check_database() {
            result.services.journal = journal.passed;
            result.add_check(journal);
        }

        if let Some(health) = self.check_health_bind() {
            result.add_check(health);
        }

        result
    }

    fn check_config(&self) -> ValidationCheck {
        match self.config.validate() {
            Ok(()) => ValidationCheck::pass(
                "Configuration",
                format!(
                    "base {:.2}, {} martingale level(s), default {}",
                    self.config.trading.base_amount,
                    self.config.trading.max_martingale_levels,
                    self.config.trading.default_timezone
                ),
            ),
            Err(e) => ValidationCheck::fail("Configuration", e.to_string(), ValidationLevel::Critical),
        }
    }

    fn check_executor(&self) -> ValidationCheck {
        let executor = match build_executor(&self.config.executor, self.force_dry_run) {
            Ok(executor) => executor,
            Err(e) => return ValidationCheck::fail("Executor", e.to_string(), ValidationLevel::Critical),
        };

        if executor.is_available() {
            let note = if executor.name() == "dry-run" && self.config.executor.mode == ExecutorMode::Command {
                " (forced by --dry-run)"
            } else {
                ""
            };
            ValidationCheck::pass("Executor", format!("{} ready{}", executor.name(), note))
        } else {
            ValidationCheck::fail(
                "Executor",
                format!(
                    "{} command not found on PATH, trades will fail",
                    executor.name()
                ),
                ValidationLevel::Warning,
            )
        }
    }

    fn check_results(&self) -> ValidationCheck {
        let detector = build_detector(&self.config.results);
        if detector.is_available() {
            ValidationCheck::pass(
                "Result Detection",
                format!(
                    "{} every {}ms",
                    detector.name(),
                    self.config.results.poll_interval_ms
                ),
            )
        } else {
            ValidationCheck::fail(
                "Result Detection",
                "No result source, martingale levels will always fire",
                ValidationLevel::Warning,
            )
        }
    }

    fn check_channel(&self) -> ValidationCheck {
        if !self.use_telegram {
            return ValidationCheck::pass("Telegram", "disabled, reading signals from stdin");
        }

        let token = self.config.channel.bot_token.as_deref().unwrap_or("");
        let channel = self.config.channel.channel_id.as_deref().unwrap_or("");
        match (token.is_empty(), channel.is_empty()) {
            (false, false) => ValidationCheck::pass("Telegram", format!("channel {}", channel)),
            (true, _) => ValidationCheck::fail(
                "Telegram",
                "TELEGRAM_BOT_TOKEN is not set",
                ValidationLevel::Critical,
            ),
            (false, true) => ValidationCheck::fail(
                "Telegram",
                "TELEGRAM_CHANNEL is not set",
                ValidationLevel::Critical,
            ),
        }
    }

    fn check_database(&self) -> Option<ValidationCheck> {
        if !self.config.database.enabled {
            return None;
        }

        let path = &self.config.database.path;
        let check = match Database::new(path).and_then(|db| db.health_check()) {
            Ok(true) => ValidationCheck::pass("Journal", format!("{}", path.display())),
            Ok(false) => ValidationCheck::fail(
                "Journal",
                format!("{} did not answer", path.display()),
                ValidationLevel::Warning,
            ),
            Err(e) => ValidationCheck::fail(
                "Journal",
                format!("{}: {}", path.display(), e),
                ValidationLevel::Warning,
            ),
        };
        Some(check)
    }

    fn check_health_bind(&self) -> Option<ValidationCheck> {
        if !self.config.health.enabled {
            return None;
        }

        let check = match self.config.health_addr() {
            Ok(addr) => ValidationCheck::pass("Health Endpoint", format!("http://{}", addr)),
            Err(e) => ValidationCheck::fail("Health Endpoint", e.to_string(), ValidationLevel::Critical),
        };
        Some(check)
    }
}
