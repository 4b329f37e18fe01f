// Operator commands: /start, /stop, /status

use tracing::info;

use crate::core::activation::{TradingState, TradingStatus};
use crate::core::cascade::CascadeBook;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Unknown(String),
}

impl Command {
    /// Case-insensitive prefix match, so `/start@my_bot` and `/STOP now` work
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.starts_with("/start") {
            Command::Start
        } else if lower.starts_with("/stop") {
            Command::Stop
        } else if lower.starts_with("/status") {
            Command::Status
        } else {
            Command::Unknown(text.trim().to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Activated,
    Deactivated,
    Status(TradingStatus),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CommandHandler {
    trading: TradingState,
    book: CascadeBook,
}

impl CommandHandler {
    pub fn new(trading: TradingState, book: CascadeBook) -> Self {
        Self { trading, book }
    }

    pub fn handle(&self, text: &str) -> CommandReply {
        match Command::parse(text) {
            Command::Start => {
                self.trading.activate();
                CommandReply::Activated
            }
            Command::Stop => {
                self.trading.deactivate();
                CommandReply::Deactivated
            }
            Command::Status => {
                let status = self.trading.status(&self.book);
                info!(
                    "📋 Status: active={} trades={} cascades={}",
                    status.active, status.active_trade_count, status.live_cascades
                );
                CommandReply::Status(status)
            }
            Command::Unknown(other) => {
                info!("💬 Ignoring unknown command: {}", other);
                CommandReply::Ignored
            }
        }
    }
}
