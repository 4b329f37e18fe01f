//! Cascade state and the shared cascade registry
//!
//! A cascade is one signal's lineage: a primary attempt at level 0 plus the
//! martingale retries. Attempt tasks, the result router, the command handler
//! and the health endpoint all look at the same `CascadeBook`; every read and
//! write goes through its mutex so the gate check and the result update never
//! interleave.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::core::types::{Direction, Outcome, TimeOfDay};

pub type CascadeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    TradingInactive, // /stop was issued before the fire time
    PriorLevelWon,   // A lower level already reported WIN
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionReason::TradingInactive => write!(f, "trading inactive"),
            SuppressionReason::PriorLevelWon => write!(f, "previous level already won"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum AttemptState {
    Scheduled,
    Executed,
    Failed(String), // Placement was attempted and the executor reported an error
    Suppressed(SuppressionReason),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Scheduled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttemptState::Scheduled => "scheduled",
            AttemptState::Executed => "executed",
            AttemptState::Failed(_) => "failed",
            AttemptState::Suppressed(_) => "suppressed",
        }
    }

    /// Free-text detail for the journal
    pub fn reason(&self) -> Option<String> {
        match self {
            AttemptState::Failed(msg) => Some(msg.clone()),
            AttemptState::Suppressed(reason) => Some(reason.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub level: u32,
    pub fire_time: TimeOfDay,
    pub stake_amount: f64,
    pub direction: Direction,
    pub state: AttemptState,
}

/// A placed trade that has not been resolved by a result yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveTrade {
    pub level: u32,
    pub pair: String,
    pub direction: Direction,
    pub stake_amount: f64,
    pub placed_at: DateTime<Utc>,
}

/// What the execution collaborator is asked to do
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOrder {
    pub cascade_id: CascadeId,
    pub level: u32,
    pub pair: String,
    pub direction: Direction,
    pub stake_amount: f64,
}

/// Outcome of the fire-time gate check
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    Proceed(TradeOrder),
    Suppressed(SuppressionReason),
    Unknown, // Cascade retired or attempt already handled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ResultEffect {
    Won { level: u32 },
    Continued { level: u32 },
    Exhausted { level: u32 },
    Duplicate { level: u32 },
    NoPlacedAttempt,
}

impl ResultEffect {
    pub fn level(&self) -> Option<u32> {
        match self {
            ResultEffect::Won { level }
            | ResultEffect::Continued { level }
            | ResultEffect::Exhausted { level }
            | ResultEffect::Duplicate { level } => Some(*level),
            ResultEffect::NoPlacedAttempt => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Cascade {
    pub id: CascadeId,
    pub pair: String,
    pub direction: Direction,
    pub entry_time: TimeOfDay,
    pub attempts: Vec<Attempt>, // Index == level
    pub active_level: u32,
    pub max_levels: u32,
    pub last_placed_level: Option<u32>,
    pub won_at: Option<u32>,
    pub exhausted: bool,
    pub last_result: Option<(u32, Outcome)>,
    pub active_trades: BTreeMap<String, ActiveTrade>,
    pub created_at: DateTime<Utc>,
}

impl Cascade {
    pub fn new(
        pair: String,
        direction: Direction,
        entry_time: TimeOfDay,
        attempts: Vec<Attempt>,
        max_levels: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair,
            direction,
            entry_time,
            attempts,
            active_level: 0,
            max_levels,
            last_placed_level: None,
            won_at: None,
            exhausted: false,
            last_result: None,
            active_trades: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn attempt(&self, level: u32) -> Option<&Attempt> {
        self.attempts.get(level as usize)
    }

    fn last_level(&self) -> u32 {
        self.attempts.len().saturating_sub(1) as u32
    }

    /// Decide whether the attempt at `level` may execute now
    pub fn gate(&mut self, level: u32, trading_active: bool) -> Gate {
        let pair = self.pair.clone();
        let cascade_id = self.id;
        let won_at = self.won_at;

        let Some(attempt) = self.attempts.get_mut(level as usize) else {
            return Gate::Unknown;
        };
        if attempt.state != AttemptState::Scheduled {
            return Gate::Unknown;
        }

        let suppression = if !trading_active {
            Some(SuppressionReason::TradingInactive)
        } else if level > 0 && won_at.is_some_and(|won| won < level) {
            Some(SuppressionReason::PriorLevelWon)
        } else {
            None
        };

        match suppression {
            Some(reason) => {
                attempt.state = AttemptState::Suppressed(reason);
                Gate::Suppressed(reason)
            }
            None => Gate::Proceed(TradeOrder {
                cascade_id,
                level,
                pair,
                direction: attempt.direction,
                stake_amount: attempt.stake_amount,
            }),
        }
    }

    /// Record what the executor said about a placement
    pub fn record_placement(
        &mut self,
        level: u32,
        placement: Result<(), String>,
        placed_at: DateTime<Utc>,
    ) -> Option<AttemptState> {
        let attempt = self.attempts.get_mut(level as usize)?;
        if attempt.state.is_terminal() {
            return None;
        }

        match placement {
            Ok(()) => {
                attempt.state = AttemptState::Executed;
                let trade = ActiveTrade {
                    level,
                    pair: self.pair.clone(),
                    direction: attempt.direction,
                    stake_amount: attempt.stake_amount,
                    placed_at,
                };
                if level > 0 {
                    self.active_level = level;
                }
                self.last_placed_level = Some(self.last_placed_level.map_or(level, |l| l.max(level)));
                self.active_trades
                    .insert(format!("{}_L{}", placed_at.timestamp(), level), trade);
            }
            Err(msg) => {
                attempt.state = AttemptState::Failed(msg);
            }
        }

        Some(attempt.state.clone())
    }

    /// Apply a WIN/LOSS to the most recently placed level.
    ///
    /// Detectors report one result per placed trade, so a second identical
    /// `(level, outcome)` is taken as a replay of the first and ignored.
    /// Two genuine LOSS reports for the same level collapse into one.
    pub fn apply_result(&mut self, outcome: Outcome) -> ResultEffect {
        let Some(level) = self.last_placed_level else {
            return ResultEffect::NoPlacedAttempt;
        };
        if self.last_result == Some((level, outcome)) {
            return ResultEffect::Duplicate { level };
        }
        self.last_result = Some((level, outcome));
        self.active_trades.retain(|_, trade| trade.level > level);

        match outcome {
            Outcome::Win => {
                self.active_level = 0;
                self.won_at = Some(self.won_at.map_or(level, |w| w.min(level)));
                ResultEffect::Won { level }
            }
            Outcome::Loss if self.active_level >= self.max_levels || level >= self.last_level() => {
                self.active_level = 0;
                self.exhausted = true;
                ResultEffect::Exhausted { level }
            }
            Outcome::Loss => ResultEffect::Continued { level },
        }
    }

    fn awaiting_result(&self) -> bool {
        match (self.last_placed_level, self.last_result) {
            (Some(placed), Some((resolved, _))) => resolved < placed,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Every attempt is terminal and nothing placed awaits a result
    pub fn is_settled(&self) -> bool {
        self.attempts.iter().all(|a| a.state.is_terminal()) && !self.awaiting_result()
    }
}

/// Something that wants to hear about cascade lifecycle events.
///
/// Called with the registry lock released.
pub trait AttemptSink: Send + Sync {
    fn cascade_opened(&self, _cascade: &Cascade) {}
    fn attempt_settled(&self, _cascade_id: CascadeId, _attempt: &Attempt) {}
    fn result_applied(&self, _cascade_id: CascadeId, _level: u32, _outcome: Outcome) {}
    fn cascade_closed(&self, _cascade: &Cascade) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl AttemptSink for NoopSink {}

#[derive(Debug, Default)]
struct BookInner {
    cascades: HashMap<CascadeId, Cascade>,
    last_executed: Option<CascadeId>,
}

/// Registry of live cascades; clones share state
#[derive(Debug, Clone, Default)]
pub struct CascadeBook {
    inner: Arc<Mutex<BookInner>>,
}

impl CascadeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cascade: Cascade) -> CascadeId {
        let id = cascade.id;
        self.inner.lock().cascades.insert(id, cascade);
        id
    }

    pub fn gate(&self, id: CascadeId, level: u32, trading_active: bool) -> Gate {
        let mut inner = self.inner.lock();
        match inner.cascades.get_mut(&id) {
            Some(cascade) => cascade.gate(level, trading_active),
            None => Gate::Unknown,
        }
    }

    pub fn record_placement(
        &self,
        id: CascadeId,
        level: u32,
        placement: Result<(), String>,
    ) -> Option<Attempt> {
        let mut inner = self.inner.lock();
        let cascade = inner.cascades.get_mut(&id)?;
        let state = cascade.record_placement(level, placement, Utc::now())?;
        let attempt = cascade.attempt(level).cloned();
        if state == AttemptState::Executed {
            inner.last_executed = Some(id);
        }
        attempt
    }

    /// Apply an outcome to `target`, or to the most recently executed cascade
    pub fn apply_result(
        &self,
        target: Option<CascadeId>,
        outcome: Outcome,
    ) -> Option<(CascadeId, ResultEffect)> {
        let mut inner = self.inner.lock();
        let id = target.or(inner.last_executed)?;
        let cascade = inner.cascades.get_mut(&id)?;
        let effect = cascade.apply_result(outcome);
        debug!("Result {} on cascade {}: {:?}", outcome, id, effect);
        Some((id, effect))
    }

    /// Remove the cascade if it has nothing left to do
    pub fn retire_if_settled(&self, id: CascadeId) -> Option<Cascade> {
        let mut inner = self.inner.lock();
        if !inner.cascades.get(&id)?.is_settled() {
            return None;
        }
        if inner.last_executed == Some(id) {
            inner.last_executed = None;
        }
        inner.cascades.remove(&id)
    }

    /// Drop cascades older than `max_age` whose attempts have all fired.
    ///
    /// Covers results that never arrive; such a cascade would otherwise stay
    /// in the registry forever.
    pub fn prune_stale(&self, max_age: chrono::Duration) -> Vec<Cascade> {
        let cutoff = Utc::now() - max_age;
        let mut inner = self.inner.lock();
        let stale: Vec<CascadeId> = inner
            .cascades
            .values()
            .filter(|c| c.created_at < cutoff && c.attempts.iter().all(|a| a.state.is_terminal()))
            .map(|c| c.id)
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for id in stale {
            if inner.last_executed == Some(id) {
                inner.last_executed = None;
            }
            if let Some(cascade) = inner.cascades.remove(&id) {
                removed.push(cascade);
            }
        }
        removed
    }

    pub fn attempt(&self, id: CascadeId, level: u32) -> Option<Attempt> {
        self.inner
            .lock()
            .cascades
            .get(&id)
            .and_then(|c| c.attempt(level))
            .cloned()
    }

    pub fn last_executed(&self) -> Option<CascadeId> {
        self.inner.lock().last_executed
    }

    pub fn active_trade_count(&self) -> usize {
        self.inner
            .lock()
            .cascades
            .values()
            .map(|c| c.active_trades.len())
            .sum()
    }

    pub fn live_cascades(&self) -> usize {
        self.inner.lock().cascades.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cascade(levels: u32, max_levels: u32) -> Cascade {
        let entry = TimeOfDay::new(10, 0, 0).unwrap();
        let attempts = (0..=levels)
            .map(|level| Attempt {
                level,
                fire_time: entry.add_minutes(i64::from(level)),
                stake_amount: 2f64.powi(level as i32),
                direction: Direction::Buy,
                state: AttemptState::Scheduled,
            })
            .collect();
        Cascade::new("EUR/USD".into(), Direction::Buy, entry, attempts, max_levels)
    }

    fn place(c: &mut Cascade, level: u32) {
        assert!(matches!(c.gate(level, true), Gate::Proceed(_)));
        c.record_placement(level, Ok(()), Utc::now());
    }

    #[test]
    fn test_gate_suppresses_when_inactive() {
        let mut c = cascade(2, 2);
        assert_eq!(c.gate(0, false), Gate::Suppressed(SuppressionReason::TradingInactive));
        assert_eq!(
            c.attempt(0).unwrap().state,
            AttemptState::Suppressed(SuppressionReason::TradingInactive)
        );
        // Already handled
        assert_eq!(c.gate(0, true), Gate::Unknown);
    }

    #[test]
    fn test_gate_builds_order() {
        let mut c = cascade(2, 2);
        match c.gate(1, true) {
            Gate::Proceed(order) => {
                assert_eq!(order.level, 1);
                assert_eq!(order.stake_amount, 2.0);
                assert_eq!(order.pair, "EUR/USD");
            }
            other => panic!("expected proceed, got {:?}", other),
        }
    }

    #[test]
    fn test_win_suppresses_higher_levels() {
        let mut c = cascade(2, 2);
        place(&mut c, 0);
        assert_eq!(c.apply_result(Outcome::Win), ResultEffect::Won { level: 0 });
        assert_eq!(c.active_level, 0);
        assert_eq!(c.gate(1, true), Gate::Suppressed(SuppressionReason::PriorLevelWon));
        assert_eq!(c.gate(2, true), Gate::Suppressed(SuppressionReason::PriorLevelWon));
        assert!(c.is_settled());
    }

    #[test]
    fn test_loss_continues_then_exhausts() {
        let mut c = cascade(2, 2);
        place(&mut c, 0);
        assert_eq!(c.apply_result(Outcome::Loss), ResultEffect::Continued { level: 0 });

        place(&mut c, 1);
        assert_eq!(c.active_level, 1);
        assert_eq!(c.apply_result(Outcome::Loss), ResultEffect::Continued { level: 1 });

        place(&mut c, 2);
        assert_eq!(c.active_level, 2);
        assert_eq!(c.apply_result(Outcome::Loss), ResultEffect::Exhausted { level: 2 });
        assert_eq!(c.active_level, 0);
        assert!(c.exhausted);
        assert!(c.is_settled());
    }

    #[test]
    fn test_replayed_result_is_noop() {
        let mut c = cascade(2, 2);
        place(&mut c, 0);
        c.apply_result(Outcome::Loss);
        assert_eq!(c.apply_result(Outcome::Loss), ResultEffect::Duplicate { level: 0 });
        assert_eq!(c.active_level, 0);
        assert!(matches!(c.gate(1, true), Gate::Proceed(_)));
    }

    #[test]
    fn test_result_without_placement() {
        let mut c = cascade(1, 2);
        assert_eq!(c.apply_result(Outcome::Win), ResultEffect::NoPlacedAttempt);
    }

    #[test]
    fn test_failed_placement_not_tracked() {
        let mut c = cascade(1, 2);
        assert!(matches!(c.gate(0, true), Gate::Proceed(_)));
        let state = c.record_placement(0, Err("no window".into()), Utc::now());
        assert_eq!(state, Some(AttemptState::Failed("no window".into())));
        assert!(c.active_trades.is_empty());
        assert_eq!(c.last_placed_level, None);
        // The next level still proceeds
        assert!(matches!(c.gate(1, true), Gate::Proceed(_)));
    }

    #[test]
    fn test_active_trade_key_and_clearing() {
        let mut c = cascade(2, 2);
        place(&mut c, 0);
        let key = c.active_trades.keys().next().unwrap().clone();
        assert!(key.ends_with("_L0"));

        place(&mut c, 1);
        assert_eq!(c.active_trades.len(), 2);
        c.apply_result(Outcome::Loss);
        assert!(c.active_trades.is_empty());
    }

    #[test]
    fn test_settled_waits_for_result() {
        let mut c = cascade(0, 2);
        place(&mut c, 0);
        assert!(!c.is_settled());
        c.apply_result(Outcome::Win);
        assert!(c.is_settled());
    }

    #[test]
    fn test_book_routes_to_last_executed() {
        let book = CascadeBook::new();
        let first = book.insert(cascade(1, 2));
        let second = book.insert(cascade(1, 2));

        assert!(matches!(book.gate(first, 0, true), Gate::Proceed(_)));
        book.record_placement(first, 0, Ok(()));
        assert!(matches!(book.gate(second, 0, true), Gate::Proceed(_)));
        book.record_placement(second, 0, Ok(()));

        assert_eq!(book.last_executed(), Some(second));
        assert_eq!(book.active_trade_count(), 2);

        let (id, effect) = book.apply_result(None, Outcome::Win).unwrap();
        assert_eq!(id, second);
        assert_eq!(effect, ResultEffect::Won { level: 0 });
        assert_eq!(book.active_trade_count(), 1);
    }

    #[test]
    fn test_book_retires_settled_cascade() {
        let book = CascadeBook::new();
        let id = book.insert(cascade(0, 2));
        assert!(book.retire_if_settled(id).is_none());

        book.gate(id, 0, false);
        let retired = book.retire_if_settled(id).unwrap();
        assert_eq!(retired.id, id);
        assert_eq!(book.live_cascades(), 0);
        assert_eq!(book.gate(id, 0, true), Gate::Unknown);
        assert!(book.apply_result(Some(id), Outcome::Win).is_none());
    }

    #[test]
    fn test_prune_keeps_pending_attempts() {
        let book = CascadeBook::new();
        let id = book.insert(cascade(1, 2));
        assert!(book.prune_stale(chrono::Duration::seconds(-1)).is_empty());
        book.gate(id, 0, false);
        book.gate(id, 1, false);
        assert_eq!(book.prune_stale(chrono::Duration::seconds(-1)).len(), 1);
    }
}
