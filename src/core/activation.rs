// Trading activation switch toggled by /start and /stop

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::core::cascade::CascadeBook;

/// Process-wide on/off switch. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct TradingState {
    active: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatus {
    pub active: bool,
    pub active_trade_count: usize,
    pub live_cascades: usize,
}

impl TradingState {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn activate(&self) {
        self.set_active(true);
    }

    pub fn deactivate(&self) {
        self.set_active(false);
    }

    pub fn set_active(&self, active: bool) {
        let was = self.active.swap(active, Ordering::SeqCst);
        if was != active {
            if active {
                info!("🟢 Trading activated");
            } else {
                info!("🔴 Trading deactivated");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flag plus the count of trades still tracked by live cascades
    pub fn status(&self, book: &CascadeBook) -> TradingStatus {
        TradingStatus {
            active: self.is_active(),
            active_trade_count: book.active_trade_count(),
            live_cascades: book.live_cascades(),
        }
    }
}
