// Signal parsing and martingale scheduling engine

pub mod types;
pub mod parser;
pub mod martingale;
pub mod clock;
pub mod activation;
pub mod cascade;
pub mod scheduler;
pub mod feedback;
pub mod commands;

// Re-export commonly used types
pub use types::{Direction, Outcome, Signal, SignalDraft, TimeOfDay, Timeframe, TimezoneTag};
pub use parser::SignalParser;
pub use clock::{Clock, FixedClock, SystemClock};
pub use activation::{TradingState, TradingStatus};
pub use cascade::{
    Attempt, AttemptSink, AttemptState, Cascade, CascadeBook, CascadeId, NoopSink, ResultEffect,
    SuppressionReason, TradeOrder,
};
pub use scheduler::{
    plan_attempts, CascadePlan, CascadeTicket, PlannedAttempt, RejectReason, ScheduleSettings,
    SchedulerContext, SubmitOutcome, TradeScheduler,
};
pub use feedback::{ResultEvent, ResultMonitor, ResultRouter};
pub use commands::{Command, CommandHandler, CommandReply};
