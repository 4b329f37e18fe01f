// Integration tests for result detection, the result monitor and the router

mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use common::{signal, t, Harness, RecordingExecutor, SinkEvent};
use signal_martingale_bot::clients::{FileResultDetector, ResultDetector};
use signal_martingale_bot::core::{
    Attempt, AttemptSink, CascadeBook, CascadeId, Clock, FixedClock, ResultEffect, ResultEvent,
    ResultMonitor, ResultRouter, SchedulerContext,
};
use signal_martingale_bot::{
    BotError, BotResult, Outcome, ScheduleSettings, TradeExecutor, TradeScheduler, TradingState,
};
use std::thread::{self, ThreadId};

/// Replays a fixed sequence of poll results, then reports nothing
struct ScriptedDetector {
    script: Mutex<VecDeque<BotResult<Option<Outcome>>>>,
    polls: Mutex<usize>,
}

impl ScriptedDetector {
    fn new(script: Vec<BotResult<Option<Outcome>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            polls: Mutex::new(0),
        }
    }

    fn polls(&self) -> usize {
        *self.polls.lock()
    }
}

#[async_trait]
impl ResultDetector for ScriptedDetector {
    async fn poll(&self) -> BotResult<Option<Outcome>> {
        *self.polls.lock() += 1;
        self.script.lock().pop_front().unwrap_or(Ok(None))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test(start_paused = true)]
async fn test_monitor_forwards_every_reported_outcome() {
    let detector = Arc::new(ScriptedDetector::new(vec![
        Ok(Some(Outcome::Win)),
        Ok(None),
        Ok(Some(Outcome::Loss)),
        Ok(Some(Outcome::Loss)),
    ]));
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(ResultMonitor::new(detector.clone(), Duration::from_millis(500)).run(tx));

    let received: Vec<Outcome> = vec![
        rx.recv().await.unwrap().outcome,
        rx.recv().await.unwrap().outcome,
        rx.recv().await.unwrap().outcome,
    ];
    assert_eq!(received, vec![Outcome::Win, Outcome::Loss, Outcome::Loss]);
    assert!(detector.polls() >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_survives_detector_errors() {
    let detector = Arc::new(ScriptedDetector::new(vec![
        Err(BotError::ResultDetection("screen not ready".into())),
        Ok(Some(Outcome::Win)),
    ]));
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(ResultMonitor::new(detector, Duration::from_millis(500)).run(tx));

    let event = rx.recv().await.unwrap();
    assert_eq!(event, ResultEvent::latest(Outcome::Win));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_when_router_goes_away() {
    let detector = Arc::new(ScriptedDetector::new(Vec::new()));
    let (tx, rx) = mpsc::channel(8);
    let monitor = tokio::spawn(ResultMonitor::new(detector, Duration::from_millis(500)).run(tx));

    drop(rx);
    assert!(timeout(Duration::from_secs(5), monitor).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_router_loop_applies_results_to_live_cascade() {
    let h = Harness::start("09:59", RecordingExecutor::new());
    let ticket = h
        .scheduler
        .submit(&signal("10:00", &["10:01"]))
        .ticket()
        .cloned()
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    let router = tokio::spawn(ResultRouter::new(h.book.clone(), h.sink.clone()).run(rx));

    sleep(Duration::from_secs(61)).await;
    tx.send(ResultEvent::latest(Outcome::Win)).await.unwrap();
    // A replay of the same result is absorbed
    tx.send(ResultEvent::latest(Outcome::Win)).await.unwrap();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(h.executor.levels(), vec![0]);
    let results: Vec<SinkEvent> = h
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, SinkEvent::Result(..)))
        .collect();
    assert_eq!(results, vec![SinkEvent::Result(ticket.cascade_id, 0, Outcome::Win)]);
    assert!(h.sink.is_closed(ticket.cascade_id));

    drop(tx);
    assert!(timeout(Duration::from_secs(1), router).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_result_before_any_placement_is_ignored() {
    let h = Harness::start("09:59", RecordingExecutor::new());
    let ticket = h.scheduler.submit(&signal("10:00", &[])).ticket().cloned().unwrap();
    let router = ResultRouter::new(h.book.clone(), h.sink.clone());

    let effect = router.on_result(ResultEvent::for_cascade(ticket.cascade_id, Outcome::Win));
    assert_eq!(effect, Some((ticket.cascade_id, ResultEffect::NoPlacedAttempt)));

    sleep(Duration::from_secs(61)).await;
    assert_eq!(h.executor.levels(), vec![0]);
}

#[tokio::test]
async fn test_file_detector_feeds_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.txt");
    std::fs::write(&path, "+$0.85\n").unwrap();

    let detector: Arc<dyn ResultDetector> = Arc::new(FileResultDetector::new(&path));
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(ResultMonitor::new(detector, Duration::from_millis(10)).run(tx));

    // Let the baseline be taken, then report a fresh loss
    sleep(Duration::from_millis(100)).await;
    std::fs::write(&path, "+$0.85\n-$1.00\n").unwrap();

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("result within timeout")
        .unwrap();
    assert_eq!(event.outcome, Outcome::Loss);
    assert_eq!(event.cascade, None);
}

/// Remembers which thread each journal write ran on
#[derive(Default)]
struct ThreadSink {
    writes: Mutex<Vec<(&'static str, ThreadId)>>,
}

impl AttemptSink for ThreadSink {
    fn attempt_settled(&self, _cascade_id: CascadeId, _attempt: &Attempt) {
        self.writes.lock().push(("settled", thread::current().id()));
    }

    fn result_applied(&self, _cascade_id: CascadeId, _level: u32, _outcome: Outcome) {
        self.writes.lock().push(("result", thread::current().id()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_journal_writes_stay_off_the_async_thread() {
    let sink = Arc::new(ThreadSink::default());
    let book = CascadeBook::new();
    let ctx = SchedulerContext {
        trading: TradingState::new(true),
        book: book.clone(),
        clock: Arc::new(FixedClock::new(t("09:59"))) as Arc<dyn Clock>,
        executor: Arc::new(RecordingExecutor::new()) as Arc<dyn TradeExecutor>,
        sink: sink.clone() as Arc<dyn AttemptSink>,
    };
    let scheduler = TradeScheduler::start(ScheduleSettings::default(), ctx);
    assert!(scheduler.submit(&signal("10:00", &["10:01"])).ticket().is_some());

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(ResultRouter::new(book, sink.clone()).run(rx));

    sleep(Duration::from_secs(61)).await;
    tx.send(ResultEvent::latest(Outcome::Win)).await.unwrap();
    sleep(Duration::from_secs(60)).await;

    // The current-thread runtime polls every task on this thread
    let runtime_thread = thread::current().id();
    let writes = sink.writes.lock().clone();
    let kinds: Vec<&str> = writes.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec!["settled", "result", "settled"]);
    assert!(writes.iter().all(|(_, id)| *id != runtime_thread));
}
