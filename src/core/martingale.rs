// Martingale follow-up times and stake sizing

use crate::core::types::{TimeOfDay, Timeframe};

pub const DEFAULT_FALLBACK_LEVELS: u32 = 2;

/// Follow-up attempt times for a signal that carries none.
///
/// Spaced one timeframe interval apart starting after `entry`:
/// `entry + i*interval` for `i` in `1..=levels`, wrapping past midnight.
pub fn generate(entry: TimeOfDay, timeframe: Timeframe, levels: u32) -> Vec<TimeOfDay> {
    let interval = timeframe.interval_minutes();
    (1..=i64::from(levels))
        .map(|i| entry.add_minutes(interval * i))
        .collect()
}

/// Stake for a martingale level: `base * 2^level`
pub fn stake_for_level(base_amount: f64, level: u32) -> f64 {
    base_amount * 2f64.powi(level as i32)
}
