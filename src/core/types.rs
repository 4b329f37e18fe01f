// Common types shared by the parser, scheduler and feedback router

use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Wall-clock time of day with no date component.
///
/// Signals only carry a time; it always means "the next time the clock
/// reads this", so arithmetic wraps at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, second).map(Self)
    }

    /// Parse `HH:MM` or `HH:MM:SS`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        NaiveTime::parse_from_str(text, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .ok()
            .map(Self)
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        // Drop sub-second precision; fire times are second-granular
        Self(time.with_nanosecond(0).unwrap_or(time))
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        Self(self.0.overflowing_add_signed(Duration::minutes(minutes)).0)
    }

    pub fn add_hours(&self, hours: i64) -> Self {
        Self(self.0.overflowing_add_signed(Duration::hours(hours)).0)
    }

    pub fn seconds_from_midnight(&self) -> i64 {
        i64::from(self.0.num_seconds_from_midnight())
    }

    /// Seconds from `now` until the next occurrence of this time.
    ///
    /// Earlier times wrap to tomorrow; equal times give zero.
    pub fn seconds_until(&self, now: TimeOfDay) -> u64 {
        let delta = self.seconds_from_midnight() - now.seconds_from_midnight();
        delta.rem_euclid(SECONDS_PER_DAY) as u64
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.second() == 0 {
            write!(f, "{}", self.0.format("%H:%M"))
        } else {
            write!(f, "{}", self.0.format("%H:%M:%S"))
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a time of day: {}", s))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,   // CALL / up
    Sell,  // PUT / down
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expiry granularity; only used to pick the martingale interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Timeframe {
    M1,
    M5,
    #[default]
    Unknown,
}

impl Timeframe {
    pub fn interval_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 | Timeframe::Unknown => 5,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::M1 => write!(f, "M1"),
            Timeframe::M5 => write!(f, "M5"),
            Timeframe::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `UTC±h[:mm]` tag as written in signal text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimezoneTag {
    offset_minutes: i32,
}

impl TimezoneTag {
    pub fn from_offset_minutes(offset_minutes: i32) -> Self {
        Self { offset_minutes }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }
}

impl FromStr for TimezoneTag {
    type Err = String;

    /// Accepts `UTC-3`, `UTC-03:00`, `GMT+5:30`, `utc -4`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let rest = upper
            .strip_prefix("UTC")
            .or_else(|| upper.strip_prefix("GMT"))
            .ok_or_else(|| format!("not a UTC offset tag: {}", s))?
            .trim_start();

        if rest.is_empty() {
            return Ok(Self::from_offset_minutes(0));
        }

        let (sign, digits) = match rest.as_bytes()[0] {
            b'+' => (1, &rest[1..]),
            b'-' => (-1, &rest[1..]),
            _ => return Err(format!("not a UTC offset tag: {}", s)),
        };
        let digits = digits.trim();
        let (hours, minutes) = match digits.split_once(':') {
            Some((h, m)) => (h, m),
            None => (digits, "0"),
        };
        // Unsigned parts: the sign was consumed above, a second one is malformed
        let unsigned = |part: &str| -> Option<u32> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse().ok()
        };
        let hours = unsigned(hours).ok_or_else(|| format!("bad offset hours: {}", s))?;
        let minutes = unsigned(minutes).ok_or_else(|| format!("bad offset minutes: {}", s))?;
        if hours > 14 || minutes >= 60 {
            return Err(format!("offset out of range: {}", s));
        }

        let magnitude = (hours * 60 + minutes) as i32;
        Ok(Self::from_offset_minutes(sign * magnitude))
    }
}

impl fmt::Display for TimezoneTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.abs();
        if abs % 60 == 0 {
            write!(f, "UTC{}{}", sign, abs / 60)
        } else {
            write!(f, "UTC{}{}:{:02}", sign, abs / 60, abs % 60)
        }
    }
}

impl TryFrom<String> for TimezoneTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimezoneTag> for String {
    fn from(value: TimezoneTag) -> Self {
        value.to_string()
    }
}

/// Fields as extracted, before the validity rule is applied
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalDraft {
    pub currency_pair: Option<String>,
    pub direction: Option<Direction>,
    pub entry_time: Option<TimeOfDay>,
    pub timeframe: Timeframe,
    pub martingale_times: Vec<TimeOfDay>,
    pub timezone: Option<TimezoneTag>,
    pub generated_martingale: bool,
}

impl SignalDraft {
    /// Names of the required fields that were not found
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.currency_pair.is_none() {
            missing.push("currency pair");
        }
        if self.direction.is_none() {
            missing.push("direction");
        }
        if self.entry_time.is_none() {
            missing.push("entry time");
        }
        missing
    }

    /// A signal exists only when pair, direction and entry time are all present
    pub fn into_signal(self) -> Option<Signal> {
        Some(Signal {
            currency_pair: self.currency_pair?,
            direction: self.direction?,
            entry_time: self.entry_time?,
            timeframe: self.timeframe,
            martingale_times: self.martingale_times,
            timezone: self.timezone,
            generated_martingale: self.generated_martingale,
        })
    }
}

/// A validated trade instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub currency_pair: String,
    pub direction: Direction,
    pub entry_time: TimeOfDay,
    pub timeframe: Timeframe,
    pub martingale_times: Vec<TimeOfDay>,
    pub timezone: Option<TimezoneTag>,
    #[serde(default)]
    pub generated_martingale: bool, // Times synthesized from the trusted-template fallback
}
