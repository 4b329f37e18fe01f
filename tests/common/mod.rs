// Common test utilities and helpers
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use signal_martingale_bot::core::{
    Attempt, AttemptSink, AttemptState, Cascade, CascadeBook, CascadeId, Clock, FixedClock,
    SchedulerContext, TradeOrder,
};
use signal_martingale_bot::{
    BotError, BotResult, Config, Direction, Outcome, ScheduleSettings, Signal, TimeOfDay, Timeframe,
    TradeExecutor, TradeScheduler, TradingState,
};

/// Configuration with everything that touches the outside world switched off
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.trading.base_amount = 1.0;
    config.trading.max_martingale_levels = 2;
    config.trading.start_active = true;
    config.health.enabled = false;
    config.database.enabled = false;
    config.logging.log_to_file = false;
    config
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

pub fn t(s: &str) -> TimeOfDay {
    TimeOfDay::parse(s).expect("valid test time")
}

pub fn signal(entry: &str, martingale: &[&str]) -> Signal {
    Signal {
        currency_pair: "EUR/USD".to_string(),
        direction: Direction::Buy,
        entry_time: t(entry),
        timeframe: Timeframe::M1,
        martingale_times: martingale.iter().map(|m| t(m)).collect(),
        timezone: None,
        generated_martingale: false,
    }
}

/// Executor that remembers every order and fails on chosen levels
#[derive(Default)]
pub struct RecordingExecutor {
    orders: Mutex<Vec<TradeOrder>>,
    failing_levels: Vec<u32>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(levels: &[u32]) -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            failing_levels: levels.to_vec(),
        }
    }

    pub fn orders(&self) -> Vec<TradeOrder> {
        self.orders.lock().clone()
    }

    pub fn levels(&self) -> Vec<u32> {
        self.orders.lock().iter().map(|o| o.level).collect()
    }
}

#[async_trait]
impl TradeExecutor for RecordingExecutor {
    async fn place_trade(&self, order: &TradeOrder) -> BotResult<()> {
        self.orders.lock().push(order.clone());
        if self.failing_levels.contains(&order.level) {
            return Err(BotError::ExecutionFailed(format!("level {} rejected", order.level)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Lifecycle events as seen by the sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Opened(CascadeId),
    Settled(CascadeId, u32, AttemptState),
    Result(CascadeId, u32, Outcome),
    Closed(CascadeId),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn settled(&self, cascade_id: CascadeId) -> Vec<(u32, AttemptState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Settled(id, level, state) if *id == cascade_id => Some((*level, state.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self, cascade_id: CascadeId) -> bool {
        self.events.lock().contains(&SinkEvent::Closed(cascade_id))
    }
}

impl AttemptSink for RecordingSink {
    fn cascade_opened(&self, cascade: &Cascade) {
        self.events.lock().push(SinkEvent::Opened(cascade.id));
    }

    fn attempt_settled(&self, cascade_id: CascadeId, attempt: &Attempt) {
        self.events
            .lock()
            .push(SinkEvent::Settled(cascade_id, attempt.level, attempt.state.clone()));
    }

    fn result_applied(&self, cascade_id: CascadeId, level: u32, outcome: Outcome) {
        self.events.lock().push(SinkEvent::Result(cascade_id, level, outcome));
    }

    fn cascade_closed(&self, cascade: &Cascade) {
        self.events.lock().push(SinkEvent::Closed(cascade.id));
    }
}

/// A running scheduler with recording collaborators
pub struct Harness {
    pub scheduler: TradeScheduler,
    pub trading: TradingState,
    pub book: CascadeBook,
    pub clock: Arc<FixedClock>,
    pub executor: Arc<RecordingExecutor>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    /// Must be called inside a tokio runtime
    pub fn start(now: &str, executor: RecordingExecutor) -> Self {
        Self::start_with(now, executor, ScheduleSettings::default())
    }

    pub fn start_with(now: &str, executor: RecordingExecutor, settings: ScheduleSettings) -> Self {
        let trading = TradingState::new(true);
        let book = CascadeBook::new();
        let clock = Arc::new(FixedClock::new(t(now)));
        let executor = Arc::new(executor);
        let sink = Arc::new(RecordingSink::new());

        let ctx = SchedulerContext {
            trading: trading.clone(),
            book: book.clone(),
            clock: clock.clone() as Arc<dyn Clock>,
            executor: executor.clone() as Arc<dyn TradeExecutor>,
            sink: sink.clone() as Arc<dyn AttemptSink>,
        };
        let scheduler = TradeScheduler::start(settings, ctx);

        Self {
            scheduler,
            trading,
            book,
            clock,
            executor,
            sink,
        }
    }
}
