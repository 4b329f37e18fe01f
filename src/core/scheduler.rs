//! Trade scheduler
//!
//! `submit` turns a signal into a cascade and hands one timer entry per
//! attempt to a driver task. The driver keeps the entries in a min-heap
//! ordered by deadline and sleeps until the earliest one; when an entry is
//! due it spawns a task that gates and executes that attempt, so a slow
//! executor never holds up another attempt's timer.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::clients::executor::TradeExecutor;
use crate::config::TradingConfig;
use crate::core::activation::{TradingState, TradingStatus};
use crate::core::cascade::{Attempt, AttemptSink, AttemptState, Cascade, CascadeBook, CascadeId, Gate};
use crate::core::clock::Clock;
use crate::core::martingale;
use crate::core::types::{Direction, Signal, TimeOfDay, TimezoneTag};
use crate::error::{BotError, BotResult};

/// Cascades whose attempts all fired this long ago are dropped even if a
/// result never arrived
const STALE_CASCADE_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub base_amount: f64,
    pub max_levels: u32,
    pub default_timezone: TimezoneTag,
    pub timezone_shift_hours: i64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            base_amount: 1.0,
            max_levels: 2,
            default_timezone: TimezoneTag::from_offset_minutes(-180),
            timezone_shift_hours: 1,
        }
    }
}

impl ScheduleSettings {
    pub fn from_config(config: &TradingConfig) -> BotResult<Self> {
        let default_timezone = config
            .default_timezone
            .parse::<TimezoneTag>()
            .map_err(|e| BotError::ConfigValidation(format!("default_timezone: {}", e)))?;
        Ok(Self {
            base_amount: config.base_amount,
            max_levels: config.max_martingale_levels,
            default_timezone,
            timezone_shift_hours: config.timezone_shift_hours,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAttempt {
    pub level: u32,
    pub fire_time: TimeOfDay,
    pub stake_amount: f64,
    pub direction: Direction,
    pub wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadePlan {
    pub pair: String,
    pub direction: Direction,
    pub entry_time: TimeOfDay,
    pub shift_hours: i64,
    pub attempts: Vec<PlannedAttempt>,
    pub discarded_levels: usize,
}

/// Work out what a signal would schedule at `now`, without side effects.
///
/// A timezone tag other than the default shifts every time by the fixed
/// correction. Martingale times beyond `max_levels` are discarded.
pub fn plan_attempts(signal: &Signal, settings: &ScheduleSettings, now: TimeOfDay) -> CascadePlan {
    let shift_hours = match signal.timezone {
        Some(tag) if tag != settings.default_timezone => settings.timezone_shift_hours,
        _ => 0,
    };

    let keep = settings.max_levels as usize;
    let fire_times = std::iter::once(signal.entry_time)
        .chain(signal.martingale_times.iter().copied().take(keep))
        .map(|time| time.add_hours(shift_hours));

    let attempts = fire_times
        .enumerate()
        .map(|(level, fire_time)| {
            let level = level as u32;
            PlannedAttempt {
                level,
                fire_time,
                stake_amount: martingale::stake_for_level(settings.base_amount, level),
                direction: signal.direction,
                wait_secs: fire_time.seconds_until(now),
            }
        })
        .collect();

    CascadePlan {
        pair: signal.currency_pair.clone(),
        direction: signal.direction,
        entry_time: signal.entry_time.add_hours(shift_hours),
        shift_hours,
        attempts,
        discarded_levels: signal.martingale_times.len().saturating_sub(keep),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TradingInactive,
    SchedulerStopped,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TradingInactive => write!(f, "trading is inactive"),
            RejectReason::SchedulerStopped => write!(f, "scheduler is shut down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeTicket {
    pub cascade_id: CascadeId,
    pub plan: CascadePlan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Scheduled(CascadeTicket),
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn ticket(&self) -> Option<&CascadeTicket> {
        match self {
            SubmitOutcome::Scheduled(ticket) => Some(ticket),
            SubmitOutcome::Rejected(_) => None,
        }
    }
}

/// Everything an attempt needs at fire time
#[derive(Clone)]
pub struct SchedulerContext {
    pub trading: TradingState,
    pub book: CascadeBook,
    pub clock: Arc<dyn Clock>,
    pub executor: Arc<dyn TradeExecutor>,
    pub sink: Arc<dyn AttemptSink>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    cascade_id: CascadeId,
    level: u32,
}

struct SchedulerInner {
    settings: ScheduleSettings,
    ctx: Arc<SchedulerContext>,
    timers: mpsc::UnboundedSender<TimerEntry>,
    seq: AtomicU64,
    stopped: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the running scheduler; clones share one driver
#[derive(Clone)]
pub struct TradeScheduler {
    inner: Arc<SchedulerInner>,
}

impl TradeScheduler {
    /// Spawn the timer driver. Must be called inside a tokio runtime.
    pub fn start(settings: ScheduleSettings, ctx: SchedulerContext) -> Self {
        let ctx = Arc::new(ctx);
        let (timers, intake) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive_timers(intake, ctx.clone()));

        Self {
            inner: Arc::new(SchedulerInner {
                settings,
                ctx,
                timers,
                seq: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                driver: Mutex::new(Some(driver)),
            }),
        }
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.inner.settings
    }

    pub fn book(&self) -> &CascadeBook {
        &self.inner.ctx.book
    }

    pub fn trading(&self) -> &TradingState {
        &self.inner.ctx.trading
    }

    pub fn status(&self) -> TradingStatus {
        self.inner.ctx.trading.status(&self.inner.ctx.book)
    }

    /// Preview of what `submit` would schedule right now
    pub fn plan(&self, signal: &Signal) -> CascadePlan {
        plan_attempts(signal, &self.inner.settings, self.inner.ctx.clock.now())
    }

    /// Accept a signal and arm one timer per attempt. Never blocks.
    pub fn submit(&self, signal: &Signal) -> SubmitOutcome {
        let ctx = &self.inner.ctx;

        if self.inner.stopped.load(Ordering::SeqCst) {
            warn!("🛑 Scheduler stopped, dropping signal for {}", signal.currency_pair);
            return SubmitOutcome::Rejected(RejectReason::SchedulerStopped);
        }
        if !ctx.trading.is_active() {
            warn!(
                "🚫 Trading inactive, ignoring {} {} at {}",
                signal.direction, signal.currency_pair, signal.entry_time
            );
            return SubmitOutcome::Rejected(RejectReason::TradingInactive);
        }

        for stale in ctx.book.prune_stale(chrono::Duration::hours(STALE_CASCADE_HOURS)) {
            warn!("🧹 Dropping cascade {} ({}) with no result after {}h", stale.id, stale.pair, STALE_CASCADE_HOURS);
            ctx.sink.cascade_closed(&stale);
        }

        let plan = self.plan(signal);
        if plan.shift_hours != 0 {
            info!("🕐 Timezone correction {:+}h applied for {}", plan.shift_hours, signal.currency_pair);
        }
        if plan.discarded_levels > 0 {
            warn!(
                "✂️ Discarding {} martingale level(s) beyond the configured max of {}",
                plan.discarded_levels, self.inner.settings.max_levels
            );
        }

        let attempts = plan
            .attempts
            .iter()
            .map(|p| Attempt {
                level: p.level,
                fire_time: p.fire_time,
                stake_amount: p.stake_amount,
                direction: p.direction,
                state: AttemptState::Scheduled,
            })
            .collect();
        let cascade = Cascade::new(
            plan.pair.clone(),
            plan.direction,
            plan.entry_time,
            attempts,
            self.inner.settings.max_levels,
        );
        ctx.sink.cascade_opened(&cascade);
        let cascade_id = ctx.book.insert(cascade);

        let armed_at = Instant::now();
        for planned in &plan.attempts {
            let entry = TimerEntry {
                deadline: armed_at + Duration::from_secs(planned.wait_secs),
                seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
                cascade_id,
                level: planned.level,
            };
            if self.inner.timers.send(entry).is_err() {
                error!("❌ Timer driver is gone, level {} of {} will not fire", planned.level, cascade_id);
            }
            info!(
                "⏰ Scheduled {} {} level {} at {} stake {:.2} (in {}s)",
                plan.direction, plan.pair, planned.level, planned.fire_time, planned.stake_amount, planned.wait_secs
            );
        }

        SubmitOutcome::Scheduled(CascadeTicket { cascade_id, plan })
    }

    /// Stop accepting signals and drop all pending timers
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.abort();
        }
        info!("🛑 Scheduler shut down, {} cascade(s) abandoned", self.inner.ctx.book.live_cascades());
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }
}

async fn sleep_until_next(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn drive_timers(mut intake: mpsc::UnboundedReceiver<TimerEntry>, ctx: Arc<SchedulerContext>) {
    let mut heap: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();
    let mut intake_open = true;

    loop {
        let next_deadline = heap.peek().map(|Reverse(entry)| entry.deadline);
        if !intake_open && next_deadline.is_none() {
            break;
        }

        tokio::select! {
            received = intake.recv(), if intake_open => match received {
                Some(entry) => heap.push(Reverse(entry)),
                None => intake_open = false,
            },
            _ = sleep_until_next(next_deadline) => {
                let now = Instant::now();
                while heap.peek().is_some_and(|Reverse(entry)| entry.deadline <= now) {
                    if let Some(Reverse(entry)) = heap.pop() {
                        tokio::spawn(fire_attempt(ctx.clone(), entry.cascade_id, entry.level));
                    }
                }
            }
        }
    }

    debug!("Timer driver finished");
}

async fn fire_attempt(ctx: Arc<SchedulerContext>, cascade_id: CascadeId, level: u32) {
    let trading_active = ctx.trading.is_active();

    let settled = match ctx.book.gate(cascade_id, level, trading_active) {
        Gate::Unknown => {
            debug!("Timer for level {} of {} has nothing to do", level, cascade_id);
            None
        }
        Gate::Suppressed(reason) => {
            info!("⏭️ Skipping level {} of {}: {}", level, cascade_id, reason);
            ctx.book.attempt(cascade_id, level)
        }
        Gate::Proceed(order) => {
            info!(
                "🎯 Firing {} {} level {} stake {:.2}",
                order.direction, order.pair, order.level, order.stake_amount
            );
            let placement = ctx
                .executor
                .place_trade(&order)
                .await
                .map_err(|e| e.to_string());
            if let Err(msg) = &placement {
                error!("❌ Placement failed for level {} of {}: {}", level, cascade_id, msg);
            }
            ctx.book.record_placement(cascade_id, level, placement)
        }
    };

    // Sink writes may hit SQLite; run them on the blocking pool
    let journal = Arc::clone(&ctx);
    let written = tokio::task::spawn_blocking(move || {
        if let Some(attempt) = settled {
            journal.sink.attempt_settled(cascade_id, &attempt);
        }
        retire_if_settled(&journal.book, journal.sink.as_ref(), cascade_id);
    })
    .await;
    if let Err(e) = written {
        error!("❌ Journal write for level {} of {} did not complete: {}", level, cascade_id, e);
    }
}

/// Drop a finished cascade from the registry and tell the sink
pub fn retire_if_settled(book: &CascadeBook, sink: &dyn AttemptSink, cascade_id: CascadeId) {
    if let Some(cascade) = book.retire_if_settled(cascade_id) {
        info!("🏁 Cascade {} ({} {}) closed", cascade.id, cascade.direction, cascade.pair);
        sink.cascade_closed(&cascade);
    }
}
