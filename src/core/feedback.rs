//! Result feedback
//!
//! The monitor polls the result detector and pushes `ResultEvent`s onto a
//! channel; the router is the single consumer that applies them to cascade
//! state. The router never schedules anything: a WIN only flips the
//! condition that later attempts check at their own fire time.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clients::result_detector::ResultDetector;
use crate::core::cascade::{AttemptSink, CascadeBook, CascadeId, ResultEffect};
use crate::core::scheduler::retire_if_settled;
use crate::core::types::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResultEvent {
    /// `None` targets the most recently executed cascade
    pub cascade: Option<CascadeId>,
    pub outcome: Outcome,
}

impl ResultEvent {
    pub fn latest(outcome: Outcome) -> Self {
        Self {
            cascade: None,
            outcome,
        }
    }

    pub fn for_cascade(cascade: CascadeId, outcome: Outcome) -> Self {
        Self {
            cascade: Some(cascade),
            outcome,
        }
    }
}

#[derive(Clone)]
pub struct ResultRouter {
    book: CascadeBook,
    sink: Arc<dyn AttemptSink>,
}

impl ResultRouter {
    pub fn new(book: CascadeBook, sink: Arc<dyn AttemptSink>) -> Self {
        Self { book, sink }
    }

    /// Apply one event. Returns `None` when no live cascade matches.
    pub fn on_result(&self, event: ResultEvent) -> Option<(CascadeId, ResultEffect)> {
        let Some((cascade_id, effect)) = self.book.apply_result(event.cascade, event.outcome) else {
            warn!("❓ {} result with no matching cascade, dropped", event.outcome);
            return None;
        };

        match effect {
            ResultEffect::Won { level } => {
                info!("🏆 WIN at level {} of {}, later levels will be skipped", level, cascade_id);
            }
            ResultEffect::Continued { level } => {
                info!("📉 LOSS at level {} of {}, next level stays armed", level, cascade_id);
            }
            ResultEffect::Exhausted { level } => {
                warn!("💀 LOSS at level {} of {}, martingale exhausted", level, cascade_id);
            }
            ResultEffect::Duplicate { level } => {
                debug!("Replayed {} for level {} of {} ignored", event.outcome, level, cascade_id);
            }
            ResultEffect::NoPlacedAttempt => {
                warn!("❓ {} for {} before any trade was placed, ignored", event.outcome, cascade_id);
            }
        }

        if let ResultEffect::Won { level }
        | ResultEffect::Continued { level }
        | ResultEffect::Exhausted { level } = effect
        {
            self.sink.result_applied(cascade_id, level, event.outcome);
        }
        retire_if_settled(&self.book, self.sink.as_ref(), cascade_id);

        Some((cascade_id, effect))
    }

    /// Consume events until every sender is dropped.
    ///
    /// Each event is applied on the blocking pool since the sink may write
    /// to SQLite. Events are still applied one at a time, in order.
    pub async fn run(self, mut events: mpsc::Receiver<ResultEvent>) {
        info!("📬 Result router started");
        while let Some(event) = events.recv().await {
            let router = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || router.on_result(event)).await {
                error!("❌ Result for {:?} was not applied: {}", event.cascade, e);
            }
        }
        info!("📪 Result router stopped");
    }
}

pub struct ResultMonitor {
    detector: Arc<dyn ResultDetector>,
    poll_interval: Duration,
}

impl ResultMonitor {
    pub fn new(detector: Arc<dyn ResultDetector>, poll_interval: Duration) -> Self {
        Self {
            detector,
            poll_interval,
        }
    }

    /// Poll until the router side of the channel goes away
    pub async fn run(self, events: mpsc::Sender<ResultEvent>) {
        info!(
            "👁️ Watching results via {} every {}ms",
            self.detector.name(),
            self.poll_interval.as_millis()
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = events.closed() => break,
            }

            match self.detector.poll().await {
                Ok(Some(outcome)) => {
                    info!("📊 Trade result detected: {}", outcome);
                    if events.send(ResultEvent::latest(outcome)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("⚠️ Result detection failed: {}", e),
            }
        }

        info!("👁️ Result monitor stopped");
    }
}
