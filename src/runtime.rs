//! Service wiring
//!
//! `BotRuntime` routes each inbound message to the command handler or the
//! parser, submits valid signals to the scheduler, and owns the feedback loop
//! (result monitor feeding the result router).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::executor::TradeExecutor;
use crate::clients::result_detector::ResultDetector;
use crate::clients::telegram::InboundMessage;
use crate::config::Config;
use crate::core::activation::TradingState;
use crate::core::cascade::{AttemptSink, CascadeBook};
use crate::core::clock::Clock;
use crate::core::commands::{CommandHandler, CommandReply};
use crate::core::feedback::{ResultEvent, ResultMonitor, ResultRouter};
use crate::core::parser::SignalParser;
use crate::core::scheduler::{ScheduleSettings, SchedulerContext, SubmitOutcome, TradeScheduler};
use crate::error::BotResult;

/// Capacity of the result channel between monitor and router
const RESULT_CHANNEL_SIZE: usize = 64;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Command(CommandReply),
    Submitted(SubmitOutcome),
    Invalid(Vec<&'static str>),
    Empty,
}

/// Background tasks of the feedback loop
pub struct FeedbackTasks {
    pub events: mpsc::Sender<ResultEvent>,
    pub router: JoinHandle<()>,
    pub monitor: Option<JoinHandle<()>>,
}

impl FeedbackTasks {
    pub fn abort(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.abort();
        }
        self.router.abort();
    }
}

#[derive(Clone)]
pub struct BotRuntime {
    parser: SignalParser,
    scheduler: TradeScheduler,
    commands: CommandHandler,
    sink: Arc<dyn AttemptSink>,
}

impl BotRuntime {
    pub fn new(parser: SignalParser, scheduler: TradeScheduler, sink: Arc<dyn AttemptSink>) -> Self {
        let commands = CommandHandler::new(scheduler.trading().clone(), scheduler.book().clone());
        Self {
            parser,
            scheduler,
            commands,
            sink,
        }
    }

    /// Build the engine from config and start the scheduler's timer driver.
    /// Must be called inside a tokio runtime.
    pub fn build(
        config: &Config,
        executor: Arc<dyn TradeExecutor>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AttemptSink>,
    ) -> BotResult<Self> {
        let settings = ScheduleSettings::from_config(&config.trading)?;
        let ctx = SchedulerContext {
            trading: TradingState::new(config.trading.start_active),
            book: CascadeBook::new(),
            clock,
            executor,
            sink: sink.clone(),
        };
        let scheduler = TradeScheduler::start(settings, ctx);
        Ok(Self::new(SignalParser::new(&config.parser), scheduler, sink))
    }

    pub fn scheduler(&self) -> &TradeScheduler {
        &self.scheduler
    }

    pub fn trading(&self) -> &TradingState {
        self.scheduler.trading()
    }

    pub fn book(&self) -> &CascadeBook {
        self.scheduler.book()
    }

    pub fn result_router(&self) -> ResultRouter {
        ResultRouter::new(self.scheduler.book().clone(), self.sink.clone())
    }

    /// Route one message: `/...` to the command handler, anything else to the
    /// parser and then the scheduler
    pub fn handle_text(&self, raw: &str) -> Dispatch {
        let text = raw.trim();
        if text.is_empty() {
            return Dispatch::Empty;
        }
        if text.starts_with('/') {
            return Dispatch::Command(self.commands.handle(text));
        }

        let draft = self.parser.extract(text);
        let missing = draft.missing_fields();
        let Some(signal) = draft.into_signal() else {
            warn!("❌ Invalid signal, missing {}", missing.join(", "));
            return Dispatch::Invalid(missing);
        };

        info!(
            "✅ Valid signal: {} {} at {} ({} martingale level(s))",
            signal.direction,
            signal.currency_pair,
            signal.entry_time,
            signal.martingale_times.len()
        );
        Dispatch::Submitted(self.scheduler.submit(&signal))
    }

    /// Start the result router, plus a monitor when a detector is given
    pub fn spawn_feedback(
        &self,
        detector: Option<Arc<dyn ResultDetector>>,
        poll_interval: Duration,
    ) -> FeedbackTasks {
        let (events, intake) = mpsc::channel(RESULT_CHANNEL_SIZE);
        let router = tokio::spawn(self.result_router().run(intake));
        let monitor = detector.map(|detector| {
            tokio::spawn(ResultMonitor::new(detector, poll_interval).run(events.clone()))
        });

        FeedbackTasks {
            events,
            router,
            monitor,
        }
    }

    /// Consume inbound messages until the channel closes or Ctrl-C
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        info!(
            "🤖 Signal bot running, trading {}",
            if self.trading().is_active() { "active" } else { "inactive (send /start)" }
        );

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.handle_text(&message.text);
                    }
                    None => {
                        info!("📪 Inbound channel closed");
                        break;
                    }
                },
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("❌ Failed to listen for Ctrl-C: {}", e);
                    }
                    info!("🛑 Shutdown requested");
                    break;
                }
            }
        }

        self.scheduler.shutdown();
    }
}

/// Forward each non-empty line of `reader` as an inbound message
pub async fn read_lines<R>(reader: R, tx: mpsc::Sender<InboundMessage>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                if tx.send(InboundMessage { chat_id: 0, text: line }).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("⚠️ Failed to read input: {}", e);
                break;
            }
        }
    }
}
