// End-to-end tests: raw message text through parser, scheduler, executor and feedback

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use common::{create_test_config, t, RecordingExecutor};
use signal_martingale_bot::core::{AttemptSink, Clock, CommandReply, FixedClock, NoopSink};
use signal_martingale_bot::db::{Database, TradeJournal};
use signal_martingale_bot::runtime::read_lines;
use signal_martingale_bot::{
    BotRuntime, Config, Dispatch, Outcome, ResultEvent, SubmitOutcome, TradeExecutor,
};

const EXAMPLE: &str = "📊 EUR/USD 🔼 Entry Time: 10:00 Expiration: M1 Level 1 10:01 Level 2 10:02";

fn build(config: &Config, now: &str, sink: Arc<dyn AttemptSink>) -> (BotRuntime, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::new());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(t(now)));
    let runtime = BotRuntime::build(
        config,
        executor.clone() as Arc<dyn TradeExecutor>,
        clock,
        sink,
    )
    .unwrap();
    (runtime, executor)
}

#[tokio::test(start_paused = true)]
async fn test_example_message_then_win() {
    let mut config = create_test_config();
    config.trading.start_active = false;
    let (runtime, executor) = build(&config, "09:59", Arc::new(NoopSink));
    let feedback = runtime.spawn_feedback(None, Duration::from_millis(500));

    // Inactive until /start
    assert!(matches!(
        runtime.handle_text(EXAMPLE),
        Dispatch::Submitted(SubmitOutcome::Rejected(_))
    ));
    assert_eq!(runtime.handle_text("/start"), Dispatch::Command(CommandReply::Activated));

    let Dispatch::Submitted(SubmitOutcome::Scheduled(ticket)) = runtime.handle_text(EXAMPLE) else {
        panic!("example should be scheduled");
    };
    let fire_times: Vec<String> = ticket
        .plan
        .attempts
        .iter()
        .map(|a| a.fire_time.to_string())
        .collect();
    assert_eq!(fire_times, vec!["10:00", "10:01", "10:02"]);

    sleep(Duration::from_secs(61)).await;
    feedback.events.send(ResultEvent::latest(Outcome::Win)).await.unwrap();
    sleep(Duration::from_secs(180)).await;

    assert_eq!(executor.levels(), vec![0]);
    assert_eq!(runtime.book().live_cascades(), 0);
    feedback.abort();
}

#[tokio::test(start_paused = true)]
async fn test_trusted_template_gets_default_levels() {
    let (runtime, executor) = build(&create_test_config(), "09:00", Arc::new(NoopSink));
    let text = "Anna Signals\nEUR/USD\nBUY\nEntry at 10:00\nExpiration M5";

    let Dispatch::Submitted(SubmitOutcome::Scheduled(ticket)) = runtime.handle_text(text) else {
        panic!("trusted template should be scheduled");
    };
    let fire_times: Vec<_> = ticket.plan.attempts.iter().map(|a| a.fire_time).collect();
    assert_eq!(fire_times, vec![t("10:00"), t("10:05"), t("10:10")]);

    sleep(Duration::from_secs(3600 + 11 * 60)).await;
    assert_eq!(executor.levels(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_untrusted_message_without_levels_schedules_entry_only() {
    let (runtime, _) = build(&create_test_config(), "09:00", Arc::new(NoopSink));
    let text = "EUR/USD\nSELL\nEntry at 10:00\nExpiration M5";

    let Dispatch::Submitted(SubmitOutcome::Scheduled(ticket)) = runtime.handle_text(text) else {
        panic!("message should be scheduled");
    };
    assert_eq!(ticket.plan.attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chatter_is_dropped() {
    let (runtime, executor) = build(&create_test_config(), "09:00", Arc::new(NoopSink));

    assert!(matches!(runtime.handle_text("Good morning traders!"), Dispatch::Invalid(_)));
    assert_eq!(runtime.handle_text("/whatever"), Dispatch::Command(CommandReply::Ignored));

    sleep(Duration::from_secs(3600)).await;
    assert!(executor.orders().is_empty());
    assert_eq!(runtime.book().live_cascades(), 0);
}

#[tokio::test]
async fn test_run_consumes_channel_until_closed() {
    let mut config = create_test_config();
    config.trading.start_active = false;
    let (runtime, _) = build(&config, "09:00", Arc::new(NoopSink));

    let (tx, rx) = mpsc::channel(8);
    let input: &[u8] = "/start\n📊 EUR/USD 🔽 Entry Time: 10:00\n/status\n".as_bytes();
    read_lines(input, tx).await;

    runtime.run(rx).await;

    assert!(runtime.trading().is_active());
    assert_eq!(runtime.book().live_cascades(), 1);
    assert!(!runtime.scheduler().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_journal_records_cascade_lifecycle() {
    let db = Database::new_in_memory().unwrap();
    db.run_migrations().unwrap();
    let journal = TradeJournal::new(&db);
    let (runtime, _) = build(&create_test_config(), "09:59", Arc::new(journal.clone()));
    let router = runtime.result_router();

    let Dispatch::Submitted(SubmitOutcome::Scheduled(ticket)) = runtime.handle_text(EXAMPLE) else {
        panic!("example should be scheduled");
    };

    sleep(Duration::from_secs(61)).await;
    router.on_result(ResultEvent::latest(Outcome::Loss));
    sleep(Duration::from_secs(60)).await;
    router.on_result(ResultEvent::latest(Outcome::Win));
    sleep(Duration::from_secs(60)).await;

    let counts = journal.attempt_counts().unwrap();
    assert_eq!(counts.executed, 2);
    assert_eq!(counts.suppressed, 1);
    assert_eq!(counts.scheduled, 0);

    let results = journal.results_for(ticket.cascade_id).unwrap();
    let outcomes: Vec<(u32, String)> = results.into_iter().map(|r| (r.level, r.outcome)).collect();
    assert_eq!(outcomes, vec![(0, "LOSS".to_string()), (1, "WIN".to_string())]);

    assert_eq!(
        journal.cascade_final_state(ticket.cascade_id).unwrap(),
        Some("won".to_string())
    );
}
