//! Per-generation state.
//!
//! A [`GenerationContext`] is owned by one schedule-generation request: it
//! holds the turns produced so far (counted as in-memory shifts by the
//! validator) and the assignment ledger used for rotation scoring. Both are
//! reset when a run begins unless the caller asked to carry rotation over.
//! Nothing here is persisted. [`GenerationRegistry`] keeps contexts by id
//! and drops those nobody touched for the idle timeout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant as StdInstant};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ScheduledTurn, ShiftInterval};
use crate::time_window::{Instant, TerminalClock, WeekBounds};

/// One assignment as seen by the rotation scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub sampler_name: String,
    pub hours: f64,
    pub start: Instant,
    pub end: Instant,
}

#[derive(Debug, Clone)]
pub struct GenerationContext {
    id: Uuid,
    turns: Vec<ScheduledTurn>,
    ledger: Vec<LedgerEntry>,
    carry_rotation: bool,
    last_activity: StdInstant,
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            turns: Vec::new(),
            ledger: Vec::new(),
            carry_rotation: false,
            last_activity: StdInstant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Keep the ledger across [`begin_run`](Self::begin_run), so the next
    /// pass rotates away from the samplers this one used.
    pub fn set_carry_rotation(&mut self, carry: bool) {
        self.carry_rotation = carry;
    }

    pub fn carries_rotation(&self) -> bool {
        self.carry_rotation
    }

    /// Starts a new pass: in-memory turns are dropped, and so is the ledger
    /// unless rotation is carried over.
    pub fn begin_run(&mut self) {
        self.turns.clear();
        if !self.carry_rotation {
            self.ledger.clear();
        }
        self.touch();
    }

    pub fn turns(&self) -> &[ScheduledTurn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<ScheduledTurn> {
        self.turns
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    /// Adds a turn to the run and records it in the ledger.
    pub fn record(&mut self, turn: ScheduledTurn) {
        self.ledger.push(LedgerEntry {
            sampler_name: turn.sampler_name.clone(),
            hours: turn.hours,
            start: turn.start,
            end: turn.end,
        });
        self.turns.push(turn);
        self.touch();
    }

    /// In-memory turns as intervals for the validator.
    pub fn memory_intervals(&self) -> Vec<ShiftInterval> {
        self.turns.iter().map(ScheduledTurn::to_interval).collect()
    }

    /// Samplers of the last `window` assignments, most recent last.
    pub fn recent_samplers(&self, window: usize) -> Vec<&str> {
        let skip = self.ledger.len().saturating_sub(window);
        self.ledger[skip..]
            .iter()
            .map(|e| e.sampler_name.as_str())
            .collect()
    }

    /// Ledger hours of `sampler_name` that fall inside `week`.
    pub fn hours_in_week(&self, sampler_name: &str, week: &WeekBounds) -> f64 {
        self.ledger
            .iter()
            .filter(|e| e.sampler_name == sampler_name)
            .map(|e| week.clip_hours(e.start, e.end))
            .sum()
    }

    /// In-memory turn hours of `sampler_name` starting on the local day of `day_of`.
    pub fn hours_on_day(&self, sampler_name: &str, day_of: Instant, clock: &TerminalClock) -> f64 {
        let date = clock.local_date(day_of);
        self.turns
            .iter()
            .filter(|t| t.sampler_name == sampler_name && clock.local_date(t.start) == date)
            .map(|t| t.hours)
            .sum()
    }

    pub fn touch(&mut self) {
        self.last_activity = StdInstant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Contexts of in-flight generation runs, keyed by generation id.
pub struct GenerationRegistry {
    contexts: Mutex<HashMap<Uuid, GenerationContext>>,
    idle_timeout: Duration,
}

impl GenerationRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Takes the context for `id` out of the registry, or starts a fresh one.
    ///
    /// The caller owns it for the duration of the run and hands it back with
    /// [`check_in`](Self::check_in).
    pub fn check_out(&self, id: Option<Uuid>) -> GenerationContext {
        self.evict_idle();
        let mut contexts = self.contexts.lock();
        match id {
            Some(id) => contexts
                .remove(&id)
                .unwrap_or_else(|| GenerationContext::with_id(id)),
            None => GenerationContext::new(),
        }
    }

    pub fn check_in(&self, mut context: GenerationContext) {
        context.touch();
        self.contexts.lock().insert(context.id(), context);
    }

    pub fn discard(&self, id: Uuid) -> bool {
        self.contexts.lock().remove(&id).is_some()
    }

    /// Drops contexts idle for longer than the timeout.
    pub fn evict_idle(&self) -> usize {
        let mut contexts = self.contexts.lock();
        let before = contexts.len();
        contexts.retain(|_, c| c.idle_for() < self.idle_timeout);
        let evicted = before - contexts.len();
        if evicted > 0 {
            debug!(evicted, "Idle generation contexts dropped");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Assignment;
    use chrono::{TimeZone, Utc};

    fn at(day: u32, hour: u32) -> Instant {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn turn(name: &str, start: Instant, end: Instant) -> ScheduledTurn {
        ScheduledTurn::new(name, start, end, Assignment::Validated)
    }

    #[test]
    fn test_recent_samplers_window() {
        let mut ctx = GenerationContext::new();
        ctx.record(turn("A", at(6, 7), at(6, 19)));
        ctx.record(turn("B", at(6, 19), at(7, 7)));
        ctx.record(turn("C", at(7, 7), at(7, 19)));
        ctx.record(turn("D", at(7, 19), at(8, 7)));
        assert_eq!(ctx.recent_samplers(3), vec!["B", "C", "D"]);
        assert_eq!(ctx.recent_samplers(10).len(), 4);
    }

    #[test]
    fn test_hours_in_week_and_day() {
        let clock = TerminalClock::utc();
        let mut ctx = GenerationContext::new();
        ctx.record(turn("A", at(6, 7), at(6, 19)));
        ctx.record(turn("A", at(12, 19), at(13, 7)));
        let week = clock.work_week_bounds(at(8, 0));
        assert_eq!(ctx.hours_in_week("A", &week), 17.0);
        assert_eq!(ctx.hours_on_day("A", at(6, 23), &clock), 12.0);
        assert_eq!(ctx.hours_on_day("B", at(6, 23), &clock), 0.0);
    }

    #[test]
    fn test_begin_run_resets_ledger() {
        let mut ctx = GenerationContext::new();
        ctx.record(turn("A", at(6, 7), at(6, 19)));
        ctx.begin_run();
        assert!(ctx.turns().is_empty());
        assert!(ctx.ledger().is_empty());
        assert!(ctx.recent_samplers(3).is_empty());
    }

    #[test]
    fn test_begin_run_keeps_ledger_when_carrying_rotation() {
        let mut ctx = GenerationContext::new();
        ctx.set_carry_rotation(true);
        ctx.record(turn("A", at(6, 7), at(6, 19)));
        ctx.begin_run();
        assert!(ctx.turns().is_empty());
        assert_eq!(ctx.ledger().len(), 1);
    }

    #[test]
    fn test_registry_round_trip_and_eviction() {
        let registry = GenerationRegistry::new(Duration::from_secs(60));
        let mut ctx = registry.check_out(None);
        let id = ctx.id();
        ctx.record(turn("A", at(6, 7), at(6, 19)));
        registry.check_in(ctx);
        assert_eq!(registry.len(), 1);

        let again = registry.check_out(Some(id));
        assert_eq!(again.ledger().len(), 1);
        assert!(registry.is_empty());
        registry.check_in(again);

        let expired = GenerationRegistry::new(Duration::ZERO);
        expired.check_in(GenerationContext::new());
        assert_eq!(expired.evict_idle(), 1);
    }

    #[test]
    fn test_separate_runs_do_not_share_rotation() {
        let registry = GenerationRegistry::new(Duration::from_secs(60));
        let mut first = registry.check_out(None);
        let second = registry.check_out(None);
        first.record(turn("A", at(6, 7), at(6, 19)));
        assert_ne!(first.id(), second.id());
        assert!(second.recent_samplers(3).is_empty());
    }
}
