// Service command: wires every collaborator and runs until shutdown
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use signal_martingale_bot::clients::{
    build_detector, build_executor, ResultDetector, TelegramListener, TradeExecutor,
};
use signal_martingale_bot::core::{AttemptSink, NoopSink, SystemClock};
use signal_martingale_bot::db::{Database, TradeJournal};
use signal_martingale_bot::health::{self, HealthState};
use signal_martingale_bot::runtime::{read_lines, BotRuntime};
use signal_martingale_bot::{BotError, BotResult, Config, PreFlightValidator};

const INBOUND_CHANNEL_SIZE: usize = 100;

/// Open the journal, or fall back to no journaling
fn open_journal(config: &Config) -> Arc<dyn AttemptSink> {
    if !config.database.enabled {
        info!("📒 Journal disabled");
        return Arc::new(NoopSink);
    }

    match Database::open(&config.database.path) {
        Ok(db) => {
            info!("📒 Journal: {}", config.database.path.display());
            Arc::new(TradeJournal::new(&db))
        }
        Err(e) => {
            warn!("⚠️  {}, continuing without a journal", e);
            Arc::new(NoopSink)
        }
    }
}

pub async fn run_bot(mut config: Config, dry_run: bool, active: bool, use_stdin: bool) -> BotResult<()> {
    if dry_run {
        info!("🧪 DRY RUN mode (no trades are placed)");
    } else {
        info!("🚀 LIVE mode, executor: {:?}", config.executor.mode);
    }
    if active {
        config.trading.start_active = true;
    }

    info!("");
    let validation = PreFlightValidator::new(config.clone())
        .dry_run(dry_run)
        .with_telegram(!use_stdin)
        .validate_all();
    validation.display();

    if !validation.passed {
        error!("");
        error!("❌ Pre-flight validation failed. Cannot start.");
        return Err(BotError::ConfigValidation(
            "Critical validation checks did not pass".to_string(),
        ));
    }

    info!("");
    info!("💰 Base amount: {:.2}", config.trading.base_amount);
    info!("🔁 Max martingale levels: {}", config.trading.max_martingale_levels);
    info!(
        "🕐 Default timezone: {} (other tags shift {:+}h)",
        config.trading.default_timezone, config.trading.timezone_shift_hours
    );

    let sink = open_journal(&config);
    let executor: Arc<dyn TradeExecutor> = Arc::from(build_executor(&config.executor, dry_run)?);
    let runtime = BotRuntime::build(&config, executor, Arc::new(SystemClock), sink)?;

    let detector: Option<Arc<dyn ResultDetector>> = config
        .results
        .source_file
        .as_ref()
        .map(|_| Arc::from(build_detector(&config.results)));
    let feedback = runtime.spawn_feedback(
        detector,
        Duration::from_millis(config.results.poll_interval_ms),
    );

    let health_task = if config.health.enabled {
        let addr = config.health_addr()?;
        let state = HealthState::new(
            runtime.trading().clone(),
            runtime.book().clone(),
            validation.services,
        )
        .with_vnc_url(config.health.vnc_url.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = health::serve(addr, state).await {
                error!("❌ Health endpoint stopped: {}", e);
            }
        }))
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
    let inbound_task = if use_stdin {
        info!("⌨️  Reading signals from stdin, one message per line");
        tokio::spawn(read_lines(BufReader::new(tokio::io::stdin()), tx))
    } else {
        let listener = TelegramListener::connect(&config.channel).await?;
        tokio::spawn(listener.run(tx))
    };

    runtime.run(rx).await;

    inbound_task.abort();
    feedback.abort();
    if let Some(task) = health_task {
        task.abort();
    }

    let status = runtime.trading().status(runtime.book());
    info!("");
    info!("📊 Shutdown summary");
    info!("   Trades awaiting results: {}", status.active_trade_count);
    info!("   Open cascades dropped: {}", status.live_cascades);
    info!("✅ Signal bot stopped");

    Ok(())
}
