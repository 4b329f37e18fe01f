//! Signal parser
//!
//! Each field has an ordered list of extractors, every one a pure
//! `fn(&str) -> Option<T>`. The first extractor that yields a value wins and
//! the rest are not consulted. Fields are extracted independently, so a bad
//! entry time never hides a good pair. Parsing never fails loudly: a missing
//! field leaves the draft incomplete and the signal invalid.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::ParserConfig;
use crate::core::martingale;
use crate::core::types::{Direction, Signal, SignalDraft, TimeOfDay, Timeframe, TimezoneTag};

type Extractor<T> = fn(&str) -> Option<T>;

static PAIR_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:currency\s+pair|pair)\s*:\s*([A-Za-z0-9]+(?:[/\-][A-Za-z0-9]+)*)")
        .expect("pair label pattern")
});

static PAIR_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:🇺🇸|📊)\s*([A-Za-z0-9]+(?:[/\-][A-Za-z0-9]+)*)").expect("pair marker pattern")
});

static PAIR_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]{3})\s*/\s*([A-Za-z]{3})\b").expect("bare pair pattern")
});

static DIRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(buy|sell|call|put)\b|(🔼|⬆|🟩|🔽|⬇|🟥)").expect("direction pattern")
});

static ENTRY_TIME_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bentry\s+time\s*:?\s*(\d{1,2}:\d{2}(?::\d{2})?)(?:h\b|\b)")
        .expect("entry time pattern")
});

static ENTRY_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bentry\s+at\s*:?\s*(\d{1,2}:\d{2}(?::\d{2})?)(?:h\b|\b)").expect("entry at pattern")
});

static ENTRY_ZONED_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\btime\s*\(\s*(?:utc|gmt)\s*[+-]?\s*\d{1,2}(?::?\d{2})?\s*\)\s*:?\s*(\d{1,2}:\d{2}(?::\d{2})?)(?:h\b|\b)",
    )
    .expect("zoned time pattern")
});

static ENTRY_SHORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bentry\s*:\s*(\d{1,2}:\d{2}(?::\d{2})?)(?:h\b|\b)").expect("short entry pattern")
});

static TIMEFRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:expiration|expiry|timeframe|time\s*frame)\s*:?\s*(m1|m5|1\s*min(?:ute)?s?|5\s*min(?:ute)?s?)\b",
    )
    .expect("timeframe pattern")
});

static TIMEZONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:utc|gmt)\s*([+-])\s*(\d{1,2})(?::?(\d{2}))?").expect("timezone pattern")
});

static MARTINGALE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:level|protection)\b[^\n]*?(\d{1,2}:\d{2}(?::\d{2})?)\b")
        .expect("martingale pattern")
});

const PAIR_EXTRACTORS: &[Extractor<String>] = &[pair_from_label, pair_from_marker, pair_from_bare_token];

const ENTRY_TIME_EXTRACTORS: &[Extractor<TimeOfDay>] =
    &[entry_from_label, entry_from_at, entry_from_zoned_time, entry_from_short_label];

/// Run extractors in priority order; the first hit wins
fn first_match<T>(extractors: &[Extractor<T>], text: &str) -> Option<T> {
    extractors.iter().find_map(|extract| extract(text))
}

fn pair_from_label(text: &str) -> Option<String> {
    PAIR_LABEL.captures(text).map(|c| c[1].to_uppercase())
}

fn pair_from_marker(text: &str) -> Option<String> {
    PAIR_MARKER.captures(text).map(|c| c[1].to_uppercase())
}

fn pair_from_bare_token(text: &str) -> Option<String> {
    PAIR_BARE
        .captures(text)
        .map(|c| format!("{}/{}", &c[1], &c[2]).to_uppercase())
}

fn time_after(pattern: &Regex, text: &str) -> Option<TimeOfDay> {
    pattern
        .captures(text)
        .and_then(|c| TimeOfDay::parse(&c[1]))
}

fn entry_from_label(text: &str) -> Option<TimeOfDay> {
    time_after(&ENTRY_TIME_LABEL, text)
}

fn entry_from_at(text: &str) -> Option<TimeOfDay> {
    time_after(&ENTRY_AT, text)
}

fn entry_from_zoned_time(text: &str) -> Option<TimeOfDay> {
    time_after(&ENTRY_ZONED_TIME, text)
}

fn entry_from_short_label(text: &str) -> Option<TimeOfDay> {
    time_after(&ENTRY_SHORT, text)
}

pub fn extract_direction(text: &str) -> Option<Direction> {
    let caps = DIRECTION.captures(text)?;
    if let Some(word) = caps.get(1) {
        return match word.as_str().to_ascii_uppercase().as_str() {
            "BUY" | "CALL" => Some(Direction::Buy),
            _ => Some(Direction::Sell),
        };
    }
    match caps.get(2)?.as_str() {
        "🔼" | "⬆" | "🟩" => Some(Direction::Buy),
        _ => Some(Direction::Sell),
    }
}

pub fn extract_timeframe(text: &str) -> Timeframe {
    let Some(caps) = TIMEFRAME.captures(text) else {
        return Timeframe::Unknown;
    };
    let token = caps[1].to_ascii_uppercase();
    if token == "M1" || token.starts_with('1') {
        Timeframe::M1
    } else {
        Timeframe::M5
    }
}

pub fn extract_timezone(text: &str) -> Option<TimezoneTag> {
    let caps = TIMEZONE.captures(text)?;
    let minutes = caps.get(3).map_or("00", |m| m.as_str());
    format!("UTC{}{}:{}", &caps[1], &caps[2], minutes).parse().ok()
}

/// Every time after a level/protection marker, first-seen order, no repeats
pub fn extract_martingale_times(text: &str) -> Vec<TimeOfDay> {
    let mut times: Vec<TimeOfDay> = Vec::new();
    for caps in MARTINGALE.captures_iter(text) {
        if let Some(time) = TimeOfDay::parse(&caps[1]) {
            if !times.contains(&time) {
                times.push(time);
            }
        }
    }
    times
}

pub fn extract_pair(text: &str) -> Option<String> {
    first_match(PAIR_EXTRACTORS, text)
}

pub fn extract_entry_time(text: &str) -> Option<TimeOfDay> {
    first_match(ENTRY_TIME_EXTRACTORS, text)
}

#[derive(Debug, Clone)]
pub struct SignalParser {
    trusted_markers: Vec<String>, // Lowercased
    fallback_levels: u32,
}

impl Default for SignalParser {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}

impl SignalParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            trusted_markers: config
                .trusted_markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            fallback_levels: config.fallback_levels,
        }
    }

    /// True when the text carries one of the trusted template markers
    pub fn is_trusted_source(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.trusted_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Extract every field without applying the validity rule
    pub fn extract(&self, text: &str) -> SignalDraft {
        let mut draft = SignalDraft {
            currency_pair: extract_pair(text),
            direction: extract_direction(text),
            entry_time: extract_entry_time(text),
            timeframe: extract_timeframe(text),
            martingale_times: extract_martingale_times(text),
            timezone: extract_timezone(text),
            generated_martingale: false,
        };

        if draft.martingale_times.is_empty() && self.is_trusted_source(text) {
            if let Some(entry) = draft.entry_time.filter(|_| self.fallback_levels > 0) {
                draft.martingale_times =
                    martingale::generate(entry, draft.timeframe, self.fallback_levels);
                draft.generated_martingale = true;
                info!(
                    "🔁 Default martingale times applied: {}",
                    draft
                        .martingale_times
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        draft
    }

    /// Parse raw text into a valid signal, or `None`
    pub fn parse(&self, text: &str) -> Option<Signal> {
        let draft = self.extract(text);
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            debug!("Signal rejected, missing: {}", missing.join(", "));
        }
        draft.into_signal()
    }
}
