// Wall-clock source for fire-time arithmetic

use parking_lot::Mutex;
use std::sync::Arc;

use crate::core::types::TimeOfDay;

pub trait Clock: Send + Sync {
    /// Current local time of day
    fn now(&self) -> TimeOfDay;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeOfDay {
        TimeOfDay::from_naive(chrono::Local::now().time())
    }
}

/// A settable clock for tests and offline planning
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<Mutex<TimeOfDay>>,
}

impl FixedClock {
    pub fn new(time: TimeOfDay) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    pub fn set(&self, time: TimeOfDay) {
        *self.time.lock() = time;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> TimeOfDay {
        *self.time.lock()
    }
}
