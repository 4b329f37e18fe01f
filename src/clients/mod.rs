// External collaborators: trade placement, result detection, message channel

pub mod executor;
pub mod result_detector;
pub mod telegram;

// Re-export client types
pub use executor::{build_executor, CommandExecutor, DryRunExecutor, TradeExecutor};
pub use result_detector::{
    build_detector, classify_result_text, FileResultDetector, NullDetector, ResultDetector,
};
pub use telegram::{InboundMessage, TelegramListener};
