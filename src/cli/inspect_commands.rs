// Offline commands: parse, plan, check, history
use tracing::{error, info, warn};

use signal_martingale_bot::core::{plan_attempts, Clock, SystemClock};
use signal_martingale_bot::db::{Database, TradeJournal};
use signal_martingale_bot::{BotError, BotResult, Config, PreFlightValidator, ScheduleSettings, SignalParser};

fn print_json<T: serde::Serialize>(value: &T) -> BotResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_text(config: &Config, text: &str) -> BotResult<()> {
    let parser = SignalParser::new(&config.parser);
    let draft = parser.extract(text);
    let missing = draft.missing_fields();

    match draft.into_signal() {
        Some(signal) => {
            info!("✅ Valid signal");
            print_json(&signal)
        }
        None => {
            warn!("❌ Not a valid signal");
            Err(BotError::InvalidSignal(format!("missing {}", missing.join(", "))))
        }
    }
}

pub fn plan_text(config: &Config, text: &str) -> BotResult<()> {
    let parser = SignalParser::new(&config.parser);
    let Some(signal) = parser.parse(text) else {
        let missing = parser.extract(text).missing_fields();
        return Err(BotError::InvalidSignal(format!("missing {}", missing.join(", "))));
    };

    let settings = ScheduleSettings::from_config(&config.trading)?;
    let now = SystemClock.now();
    let plan = plan_attempts(&signal, &settings, now);

    info!("📅 Plan for {} {} (now {})", plan.direction, plan.pair, now);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if plan.shift_hours != 0 {
        info!("🕐 Timezone correction: {:+}h", plan.shift_hours);
    }
    for attempt in &plan.attempts {
        info!(
            "  L{}  {}  stake {:.2}  in {}s",
            attempt.level, attempt.fire_time, attempt.stake_amount, attempt.wait_secs
        );
    }
    if plan.discarded_levels > 0 {
        warn!("✂️  {} level(s) beyond the configured max dropped", plan.discarded_levels);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    print_json(&plan)
}

pub fn check(config: &Config, dry_run: bool, use_stdin: bool) -> BotResult<()> {
    let validation = PreFlightValidator::new(config.clone())
        .dry_run(dry_run)
        .with_telegram(!use_stdin)
        .validate_all();
    validation.display();
    print_json(&validation.services)?;

    if validation.passed {
        Ok(())
    } else {
        Err(BotError::ConfigValidation(format!(
            "{} critical check(s) failed",
            validation.critical_failures().len()
        )))
    }
}

pub fn history(config: &Config, limit: usize) -> BotResult<()> {
    let db = Database::open(&config.database.path)?;
    let journal = TradeJournal::new(&db);

    let attempts = journal.recent_attempts(limit)?;
    let counts = journal.attempt_counts()?;

    info!("📜 Recent attempts ({})", config.database.path.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if attempts.is_empty() {
        info!("  No attempts journaled yet. Run: signal-bot run --dry-run");
    }
    for attempt in &attempts {
        let reason = attempt
            .reason
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default();
        info!(
            "  {} {} {} L{} {} stake {:.2} → {}{}",
            attempt.scheduled_at,
            attempt.direction,
            attempt.pair,
            attempt.level,
            attempt.fire_time,
            attempt.stake_amount,
            attempt.state,
            reason
        );
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Total: {} (executed {}, failed {}, suppressed {}, pending {})",
        counts.total(),
        counts.executed,
        counts.failed,
        counts.suppressed,
        counts.scheduled
    );
    if counts.failed > 0 {
        error!("❌ {} placement(s) failed, check the executor", counts.failed);
    }

    Ok(())
}
