//! Turn generation.
//!
//! [`ScheduleCalculator`] walks forward from the end of the office shift in
//! turns aligned to the terminal's block boundaries. For every turn it asks
//! the [`ValidationEngine`] which samplers may take it, picks one by rotation
//! score, and falls back to the relaxed daily-hours rule when nobody passes.
//!
//! Validation data comes from the week cache; when a week cannot be
//! preloaded the run degrades to direct reads for that week instead of
//! failing.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ValidationCache;
use crate::config::SchedulerConfig;
use crate::context::GenerationContext;
use crate::domain::{Assignment, OfficeSamplingSlot, ScheduledTurn, ShiftInterval};
use crate::error::{RepositoryError, ScheduleError};
use crate::time_window::{hours_between, hours_duration, round_hours, Instant, WeekBounds};
use crate::validation::{
    CachedSource, DataOrigin, DirectSource, Proposal, TurnValidation, ValidationDataSource,
    ValidationEngine,
};

// Rotation scoring weights.
const RECENT_ASSIGNMENT_PENALTY: f64 = 1000.0;
const LOAD_BALANCE_WEIGHT: f64 = 10.0;
const HEADROOM_WEIGHT: f64 = 5.0;
const UNCAPPED_BONUS: f64 = 50.0;

/// Hour counts are rounded to 3 decimals; anything below this is zero.
const HOURS_EPSILON: f64 = 0.0005;

type SharedSource = dyn ValidationDataSource + Send + Sync;

/// Input of [`ScheduleCalculator::generate_schedule`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub office: OfficeSamplingSlot,
    /// Discharge hours to cover with generated turns.
    pub total_hours: u32,
    /// Candidates in preference order; ties go to the earlier one.
    pub samplers: Vec<String>,
    /// Roster being (re)generated; excluded from the conflict data.
    pub roster_id: Option<String>,
    pub vessel_name: Option<String>,
}

/// Input of [`ScheduleCalculator::generate_single_turn`].
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTurnRequest {
    /// Estimated time of completion; the turn starts here.
    pub etc: Instant,
    pub samplers: Vec<String>,
    pub office: Option<OfficeSamplingSlot>,
    pub roster_id: Option<String>,
    pub vessel_name: Option<String>,
}

/// Input of [`ScheduleCalculator::recalculate_from_edited_first_turn`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecalculationRequest {
    pub edited_first_turn: ScheduledTurn,
    pub etc: Instant,
    pub samplers: Vec<String>,
    pub office: Option<OfficeSamplingSlot>,
    pub roster_id: Option<String>,
    pub vessel_name: Option<String>,
}

/// Input of [`ScheduleCalculator::validate_proposed_shift`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftProposal {
    pub sampler_name: String,
    pub start: Instant,
    pub end: Instant,
    pub turns_in_memory: Vec<ShiftInterval>,
    pub office: Option<OfficeSamplingSlot>,
    pub roster_id: Option<String>,
    pub vessel_name: Option<String>,
}

/// Ordered turns of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSchedule {
    pub generation_id: Uuid,
    pub turns: Vec<ScheduledTurn>,
    pub total_hours: f64,
    /// Hours no sampler could take, even under the fallback rule.
    pub unassigned_hours: f64,
    /// At least one week was validated against direct reads.
    pub degraded: bool,
}

impl GeneratedSchedule {
    pub fn is_complete(&self) -> bool {
        self.unassigned_hours < HOURS_EPSILON
    }

    pub fn fallback_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.assignment == Assignment::Fallback)
            .count()
    }
}

/// What every turn of one run is validated against.
struct RunScope<'a> {
    samplers: &'a [String],
    office: Option<&'a OfficeSamplingSlot>,
    exclude_roster_id: Option<&'a str>,
    vessel_name: Option<&'a str>,
}

impl<'a> RunScope<'a> {
    fn proposal<'p>(
        &self,
        sampler_name: &'p str,
        start: Instant,
        end: Instant,
        memory: &'p [ShiftInterval],
    ) -> Proposal<'p>
    where
        'a: 'p,
    {
        Proposal::new(sampler_name, start, end)
            .with_turns(memory)
            .with_office(self.office)
            .with_vessel(self.vessel_name)
    }
}

/// Data sources loaded during one run, one per week touched.
struct WeekSources<'c> {
    calculator: &'c ScheduleCalculator,
    exclude_roster_id: Option<&'c str>,
    loaded: Vec<(WeekBounds, Box<SharedSource>)>,
}

impl<'c> WeekSources<'c> {
    fn new(calculator: &'c ScheduleCalculator, exclude_roster_id: Option<&'c str>) -> Self {
        Self {
            calculator,
            exclude_roster_id,
            loaded: Vec::new(),
        }
    }

    async fn at(&mut self, instant: Instant) -> Result<&SharedSource, RepositoryError> {
        let week = self.calculator.cache.week_of(instant);
        let index = match self.loaded.iter().position(|(w, _)| *w == week) {
            Some(index) => index,
            None => {
                let source = self
                    .calculator
                    .load_source(week, self.exclude_roster_id)
                    .await?;
                self.loaded.push((week, source));
                self.loaded.len() - 1
            }
        };
        Ok(self.loaded[index].1.as_ref())
    }

    fn degraded(&self) -> bool {
        self.loaded
            .iter()
            .any(|(_, s)| s.origin() == DataOrigin::Direct)
    }
}

pub struct ScheduleCalculator {
    cache: Arc<ValidationCache>,
    engine: ValidationEngine,
    config: SchedulerConfig,
}

impl ScheduleCalculator {
    pub fn new(cache: Arc<ValidationCache>, config: SchedulerConfig) -> Self {
        Self {
            engine: ValidationEngine::new(&config),
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Generates turns covering `total_hours` from the end of the office shift.
    ///
    /// Malformed input is an error. Running out of samplers is not: the
    /// schedule comes back with `unassigned_hours` set.
    pub async fn generate_schedule(
        &self,
        ctx: &mut GenerationContext,
        request: &ScheduleRequest,
    ) -> Result<GeneratedSchedule, ScheduleError> {
        validate_office(&request.office)?;
        validate_samplers(&request.samplers)?;
        if request.total_hours == 0 {
            return Err(ScheduleError::InvalidInput(
                "total discharge hours must be positive".to_string(),
            ));
        }

        ctx.begin_run();
        let scope = RunScope {
            samplers: &request.samplers,
            office: Some(&request.office),
            exclude_roster_id: request.roster_id.as_deref(),
            vessel_name: request.vessel_name.as_deref(),
        };
        info!(
            generation_id = %ctx.id(),
            office_sampler = %request.office.sampler_name,
            office_end = %request.office.end,
            total_hours = request.total_hours,
            samplers = request.samplers.len(),
            "Generating schedule"
        );

        let mut sources = WeekSources::new(self, scope.exclude_roster_id);
        let mut remaining = f64::from(request.total_hours);
        let mut cursor = request.office.end;

        if let Some(turn) = self
            .office_continuation(&mut sources, ctx, &scope, &request.office, remaining)
            .await?
        {
            remaining = round_hours(remaining - turn.hours);
            cursor = turn.end;
            ctx.record(turn);
        }

        while remaining > HOURS_EPSILON {
            let hours = self.turn_hours(cursor, remaining);
            let end = cursor + hours_duration(hours);
            let source = sources.at(cursor).await?;
            let Some(turn) = self.assign_turn(source, ctx, &scope, cursor, end) else {
                break;
            };
            remaining = round_hours(remaining - turn.hours);
            cursor = turn.end;
            ctx.record(turn);
        }

        Ok(self.finish(ctx, remaining, sources.degraded()))
    }

    /// One fixed-duration turn starting at the completion estimate.
    ///
    /// The first sampler in input order that passes validation takes it.
    pub async fn generate_single_turn(
        &self,
        ctx: &mut GenerationContext,
        request: &SingleTurnRequest,
    ) -> Result<GeneratedSchedule, ScheduleError> {
        validate_samplers(&request.samplers)?;
        if let Some(office) = &request.office {
            validate_office(office)?;
        }

        ctx.begin_run();
        let scope = RunScope {
            samplers: &request.samplers,
            office: request.office.as_ref(),
            exclude_roster_id: request.roster_id.as_deref(),
            vessel_name: request.vessel_name.as_deref(),
        };
        let hours = f64::from(self.config.single_turn_hours.max(1));
        let start = request.etc;
        let end = start + hours_duration(hours);

        let mut sources = WeekSources::new(self, scope.exclude_roster_id);
        let source = sources.at(start).await?;
        let memory = ctx.memory_intervals();
        let chosen = request
            .samplers
            .iter()
            .find(|name| {
                let proposal = scope.proposal(name, start, end, &memory);
                self.engine
                    .validate_sampler_for_turn(source, &proposal)
                    .is_valid()
            })
            .map(|name| ScheduledTurn::new(name.as_str(), start, end, Assignment::FixedSingleTurn))
            .or_else(|| self.fallback(ctx, &scope, start, end));

        let unassigned = match chosen {
            Some(turn) => {
                ctx.record(turn);
                0.0
            }
            None => hours,
        };
        Ok(self.finish(ctx, unassigned, sources.degraded()))
    }

    /// Rebuilds everything after a hand-edited first turn up to the
    /// (unchanged) completion estimate.
    ///
    /// Turns are recomputed, not shifted: short remainders collapse into one
    /// turn, longer ones are cut into full-length turns with the last one
    /// absorbing the remainder.
    pub async fn recalculate_from_edited_first_turn(
        &self,
        ctx: &mut GenerationContext,
        request: &RecalculationRequest,
    ) -> Result<GeneratedSchedule, ScheduleError> {
        let edited = &request.edited_first_turn;
        if edited.sampler_name.trim().is_empty() {
            return Err(ScheduleError::InvalidInput(
                "edited turn needs a sampler".to_string(),
            ));
        }
        if edited.end <= edited.start {
            return Err(ScheduleError::InconsistentData(format!(
                "edited turn ends ({}) before it starts ({})",
                edited.end, edited.start
            )));
        }

        ctx.begin_run();
        ctx.record(ScheduledTurn::new(
            edited.sampler_name.as_str(),
            edited.start,
            edited.end,
            Assignment::ManualEdit,
        ));

        let remaining = hours_between(edited.end, request.etc);
        if remaining < HOURS_EPSILON {
            debug!(
                generation_id = %ctx.id(),
                "Edited turn reaches the completion estimate"
            );
            return Ok(self.finish(ctx, 0.0, false));
        }
        validate_samplers(&request.samplers)?;
        let plan = self.recalculation_plan(remaining, request.samplers.len());

        let scope = RunScope {
            samplers: &request.samplers,
            office: request.office.as_ref(),
            exclude_roster_id: request.roster_id.as_deref(),
            vessel_name: request.vessel_name.as_deref(),
        };
        info!(
            generation_id = %ctx.id(),
            from = %edited.end,
            etc = %request.etc,
            turns = plan.len(),
            "Recalculating after edited first turn"
        );

        let mut sources = WeekSources::new(self, scope.exclude_roster_id);
        let mut cursor = edited.end;
        let mut unassigned: f64 = 0.0;
        for (index, hours) in plan.iter().enumerate() {
            let end = if index + 1 == plan.len() {
                request.etc
            } else {
                cursor + hours_duration(*hours)
            };
            let source = sources.at(cursor).await?;
            match self.assign_turn(source, ctx, &scope, cursor, end) {
                Some(turn) => {
                    cursor = turn.end;
                    ctx.record(turn);
                }
                None => {
                    unassigned = plan[index..].iter().sum::<f64>();
                    break;
                }
            }
        }

        Ok(self.finish(ctx, unassigned, sources.degraded()))
    }

    /// Validates a caller-supplied shift. Never fails: missing data yields a
    /// rejection tagged [`DataOrigin::Unavailable`].
    pub async fn validate_proposed_shift(&self, request: &ShiftProposal) -> TurnValidation {
        let week = self.cache.week_of(request.start);
        match self.load_source(week, request.roster_id.as_deref()).await {
            Ok(source) => {
                let proposal = Proposal::new(&request.sampler_name, request.start, request.end)
                    .with_turns(&request.turns_in_memory)
                    .with_office(request.office.as_ref())
                    .with_vessel(request.vessel_name.as_deref());
                self.engine
                    .validate_sampler_for_turn(source.as_ref(), &proposal)
            }
            Err(e) => {
                warn!(
                    sampler = %request.sampler_name,
                    week = %week.key(),
                    error = %e,
                    "No validation data, rejecting proposed shift"
                );
                TurnValidation::rejected(
                    &request.sampler_name,
                    request.start,
                    request.end,
                    DataOrigin::Unavailable,
                    &format!("Validation data unavailable: {}", e),
                )
            }
        }
    }

    /// Turn lengths for `remaining` hours after an edited first turn.
    ///
    /// Full-length turns with the last one absorbing the remainder, unless
    /// there are fewer samplers than turns: then one turn per sampler, each
    /// taking an even share in whole hours and the last the rest.
    pub fn recalculation_plan(&self, remaining: f64, samplers: usize) -> Vec<f64> {
        if remaining < HOURS_EPSILON {
            return Vec::new();
        }
        if remaining <= self.config.recalc_single_turn_threshold_hours {
            return vec![round_hours(remaining)];
        }
        let max = f64::from(self.config.max_hours_per_shift.max(1));
        let ideal = (remaining / max).ceil() as usize;
        let count = ideal.min(samplers.max(1));
        let share = if count < ideal {
            (remaining / count as f64).ceil()
        } else {
            max
        };
        let mut plan = vec![share; count];
        if let Some(last) = plan.last_mut() {
            *last = round_hours(remaining - share * (count - 1) as f64);
        }
        plan
    }

    /// Length of the turn starting at `cursor`, in whole hours.
    fn turn_hours(&self, cursor: Instant, remaining: f64) -> f64 {
        let clock = self.engine.clock();
        let max = f64::from(self.config.max_hours_per_shift.max(1));
        if clock.is_block_boundary(cursor) {
            return remaining.min(max);
        }
        let next = clock.next_block_boundary(cursor);
        let to_next = hours_between(cursor, next).floor();
        let span = if to_next >= 1.0 {
            to_next
        } else {
            // Under an hour to the boundary: run on to the following one.
            hours_between(cursor, clock.next_block_boundary(next)).floor()
        };
        span.min(remaining).min(max)
    }

    /// Lets the office sampler run on to the next block boundary when the
    /// daily cap, their day restrictions and their weekly limit allow it.
    async fn office_continuation(
        &self,
        sources: &mut WeekSources<'_>,
        ctx: &GenerationContext,
        scope: &RunScope<'_>,
        office: &OfficeSamplingSlot,
        remaining: f64,
    ) -> Result<Option<ScheduledTurn>, RepositoryError> {
        let clock = self.engine.clock();
        let to_boundary = hours_between(office.end, clock.next_block_boundary(office.end)).floor();
        let hours = to_boundary.min(remaining);
        if hours < 1.0 {
            return Ok(None);
        }
        if round_hours(office.hours + to_boundary) > self.config.max_hours_per_day {
            debug!(
                sampler = %office.sampler_name,
                office_hours = office.hours,
                to_boundary,
                "Office sampler would exceed the daily cap, no continuation"
            );
            return Ok(None);
        }

        let end = office.end + hours_duration(hours);
        let source = sources.at(office.end).await?;
        let allowed = match source.sampler_data(&office.sampler_name) {
            Some(data) => {
                let memory = ctx.memory_intervals();
                let proposal = scope.proposal(&office.sampler_name, office.end, end, &memory);
                let day = self
                    .engine
                    .check_day_restriction(&data.day_restrictions, office.end);
                let weekly = self.engine.check_weekly_hours(
                    &data.weekly,
                    source.week(),
                    &proposal,
                    &data.schedule_intervals,
                    hours,
                );
                if !day.is_valid || !weekly.is_valid {
                    debug!(
                        sampler = %office.sampler_name,
                        day = %day.message,
                        weekly = %weekly.message,
                        "Office sampler cannot continue"
                    );
                }
                day.is_valid && weekly.is_valid
            }
            None => {
                debug!(
                    sampler = %office.sampler_name,
                    "No validation data for office sampler, assuming available"
                );
                true
            }
        };

        Ok(allowed.then(|| {
            ScheduledTurn::new(
                office.sampler_name.as_str(),
                office.end,
                end,
                Assignment::OfficeContinuation,
            )
        }))
    }

    /// Best valid sampler for `[start, end)`, or the fallback pick.
    fn assign_turn(
        &self,
        source: &dyn ValidationDataSource,
        ctx: &GenerationContext,
        scope: &RunScope<'_>,
        start: Instant,
        end: Instant,
    ) -> Option<ScheduledTurn> {
        let memory = ctx.memory_intervals();
        let eligible: Vec<&str> = scope
            .samplers
            .iter()
            .filter(|name| {
                let proposal = scope.proposal(name, start, end, &memory);
                self.engine
                    .validate_sampler_for_turn(source, &proposal)
                    .is_valid()
            })
            .map(String::as_str)
            .collect();

        match self.pick_by_rotation(source, ctx, &eligible) {
            Some(name) => Some(ScheduledTurn::new(name, start, end, Assignment::Validated)),
            None => self.fallback(ctx, scope, start, end),
        }
    }

    /// Highest rotation score wins; ties go to the earlier candidate.
    fn pick_by_rotation<'n>(
        &self,
        source: &dyn ValidationDataSource,
        ctx: &GenerationContext,
        candidates: &[&'n str],
    ) -> Option<&'n str> {
        let week = source.week();
        let load: Vec<(&'n str, f64, Option<f64>)> = candidates
            .iter()
            .map(|name| {
                let (current, limit) = source
                    .sampler_data(name)
                    .map_or((0.0, None), |d| (d.weekly.current_hours, d.weekly.limit));
                (*name, current + ctx.hours_in_week(name, week), limit)
            })
            .collect();
        let peak = load.iter().map(|(_, hours, _)| *hours).fold(0.0, f64::max);
        let recent = ctx.recent_samplers(self.config.rotation_window);

        let mut best: Option<(&'n str, f64)> = None;
        for (name, hours, limit) in load {
            let mut score = (peak - hours) * LOAD_BALANCE_WEIGHT;
            if recent.iter().any(|r| *r == name) {
                score -= RECENT_ASSIGNMENT_PENALTY;
            }
            score += match limit {
                Some(limit) => (limit - hours).max(0.0) * HEADROOM_WEIGHT,
                None => UNCAPPED_BONUS,
            };
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((name, score));
            }
        }
        best.map(|(name, _)| name)
    }

    /// Emergency pick: first sampler whose hours on the turn's calendar day
    /// stay within the daily cap. Every other check is skipped.
    fn fallback(
        &self,
        ctx: &GenerationContext,
        scope: &RunScope<'_>,
        start: Instant,
        end: Instant,
    ) -> Option<ScheduledTurn> {
        if !self.config.allow_fallback_assignment {
            return None;
        }
        let clock = self.engine.clock();
        let day = clock.local_date(start);
        let hours = hours_between(start, end);
        let name = scope.samplers.iter().find(|name| {
            let office_hours = scope
                .office
                .filter(|o| o.sampler_name == **name && clock.local_date(o.start) == day)
                .map_or(0.0, |o| o.hours);
            let day_hours = round_hours(office_hours + ctx.hours_on_day(name, start, clock) + hours);
            day_hours <= self.config.max_hours_per_day
        })?;
        warn!(
            generation_id = %ctx.id(),
            sampler = %name,
            start = %start,
            end = %end,
            hours,
            "No sampler passed validation, assigning under the daily-hours rule only"
        );
        Some(ScheduledTurn::new(name.as_str(), start, end, Assignment::Fallback))
    }

    async fn load_source(
        &self,
        week: WeekBounds,
        exclude_roster_id: Option<&str>,
    ) -> Result<Box<SharedSource>, RepositoryError> {
        match self.cache.preload_week(week, exclude_roster_id).await {
            Ok(snapshot) => Ok(Box::new(CachedSource::new(snapshot))),
            Err(e) => {
                warn!(
                    week = %week.key(),
                    error = %e,
                    "Week cache unavailable, validating against direct reads"
                );
                let direct = DirectSource::load(
                    self.cache.repository(),
                    week,
                    self.cache.fetch_window(&week),
                    exclude_roster_id,
                    self.cache.default_weekly_limit(),
                )
                .await?;
                Ok(Box::new(direct))
            }
        }
    }

    fn finish(&self, ctx: &GenerationContext, unassigned: f64, degraded: bool) -> GeneratedSchedule {
        let turns = ctx.turns().to_vec();
        let schedule = GeneratedSchedule {
            generation_id: ctx.id(),
            total_hours: round_hours(turns.iter().map(|t| t.hours).sum()),
            turns,
            unassigned_hours: round_hours(unassigned.max(0.0)),
            degraded,
        };
        if schedule.is_complete() {
            info!(
                generation_id = %schedule.generation_id,
                turns = schedule.turns.len(),
                total_hours = schedule.total_hours,
                fallbacks = schedule.fallback_count(),
                degraded,
                "Schedule generated"
            );
        } else {
            warn!(
                generation_id = %schedule.generation_id,
                turns = schedule.turns.len(),
                unassigned_hours = schedule.unassigned_hours,
                "Schedule incomplete, no sampler available for the remaining hours"
            );
        }
        schedule
    }
}

fn validate_office(office: &OfficeSamplingSlot) -> Result<(), ScheduleError> {
    if office.sampler_name.trim().is_empty() {
        return Err(ScheduleError::InvalidInput(
            "office shift needs a sampler".to_string(),
        ));
    }
    if !office.hours.is_finite() || office.hours <= 0.0 {
        return Err(ScheduleError::InvalidInput(format!(
            "office hours must be positive, got {}",
            office.hours
        )));
    }
    if office.end <= office.start {
        return Err(ScheduleError::InconsistentData(format!(
            "office shift finishes ({}) before it starts ({})",
            office.end, office.start
        )));
    }
    Ok(())
}

fn validate_samplers(samplers: &[String]) -> Result<(), ScheduleError> {
    if samplers.is_empty() {
        return Err(ScheduleError::InvalidInput(
            "at least one sampler is required".to_string(),
        ));
    }
    if samplers.iter().any(|s| s.trim().is_empty()) {
        return Err(ScheduleError::InvalidInput(
            "sampler names must not be blank".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RosterRecord, Sampler, SamplingAssignment, ShipNomination, WorkDayShift};
    use crate::repository::{FetchWindow, InMemoryRepository, ScheduleRepository};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc, Weekday};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(day: u32, hour: u32) -> Instant {
        // 2025-01-06 is a Monday
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn setup(repo: InMemoryRepository) -> (Arc<InMemoryRepository>, ScheduleCalculator) {
        let repo = Arc::new(repo);
        let config = SchedulerConfig::default();
        let shared: Arc<dyn ScheduleRepository> = repo.clone();
        let cache = Arc::new(ValidationCache::new(shared, &config));
        (repo, ScheduleCalculator::new(cache, config))
    }

    fn request(office: OfficeSamplingSlot, total_hours: u32, samplers: &[&str]) -> ScheduleRequest {
        ScheduleRequest {
            office,
            total_hours,
            samplers: samplers.iter().map(|s| s.to_string()).collect(),
            roster_id: None,
            vessel_name: None,
        }
    }

    fn summary(schedule: &GeneratedSchedule) -> Vec<(&str, Instant, Instant, Assignment)> {
        schedule
            .turns
            .iter()
            .map(|t| (t.sampler_name.as_str(), t.start, t.end, t.assignment))
            .collect()
    }

    #[tokio::test]
    async fn test_office_end_to_boundary_then_remainder() {
        let (_, calculator) = setup(InMemoryRepository::new().with_samplers(vec![Sampler::new("A")]));
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 12, &["A"]))
            .await
            .unwrap();

        assert_eq!(
            summary(&schedule),
            vec![
                ("A", at(6, 9), at(6, 19), Assignment::Validated),
                ("A", at(6, 19), at(6, 21), Assignment::Fallback),
            ]
        );
        assert_eq!(schedule.total_hours, 12.0);
        assert!(schedule.is_complete());
        assert!(!schedule.degraded);
    }

    #[tokio::test]
    async fn test_rotation_spreads_turns() {
        let samplers = vec![Sampler::new("A"), Sampler::new("B"), Sampler::new("C")];
        let (_, calculator) = setup(InMemoryRepository::new().with_samplers(samplers));
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 48, &["A", "B", "C"]))
            .await
            .unwrap();

        let names: Vec<&str> = schedule.turns.iter().map(|t| t.sampler_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "A", "B"]);
        assert_eq!(schedule.total_hours, 48.0);
        assert_eq!(schedule.fallback_count(), 0);
        for pair in schedule.turns.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!(pair[1].hours <= 12.0);
        }
    }

    #[tokio::test]
    async fn test_weekly_cap_skips_capped_sampler() {
        let roster = RosterRecord {
            id: "r-other".to_string(),
            vessel_name: "MV Kestrel".to_string(),
            office_sampling: None,
            line_sampling: vec![
                SamplingAssignment::new("A", at(8, 7), at(8, 19)),
                SamplingAssignment::new("A", at(9, 7), at(9, 15)),
            ],
        };
        let repo = InMemoryRepository::new()
            .with_samplers(vec![Sampler::new("A").with_weekly_restriction(), Sampler::new("B")])
            .with_rosters(vec![roster]);
        let (_, calculator) = setup(repo);
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 10, &["A", "B"]))
            .await
            .unwrap();
        assert_eq!(
            summary(&schedule),
            vec![("B", at(6, 9), at(6, 19), Assignment::Validated)]
        );
    }

    #[tokio::test]
    async fn test_office_sampler_continues_to_boundary() {
        let repo = InMemoryRepository::new().with_samplers(vec![Sampler::new("A"), Sampler::new("B")]);
        let (_, calculator) = setup(repo);
        let office = OfficeSamplingSlot::new("A", at(6, 1), at(6, 5));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 14, &["A", "B"]))
            .await
            .unwrap();
        assert_eq!(
            summary(&schedule),
            vec![
                ("A", at(6, 5), at(6, 7), Assignment::OfficeContinuation),
                ("B", at(6, 7), at(6, 19), Assignment::Validated),
            ]
        );
    }

    #[tokio::test]
    async fn test_halts_with_unassigned_hours() {
        let repo = InMemoryRepository::new().with_samplers(vec![
            Sampler::new("A").with_restricted_day(Weekday::Mon),
            Sampler::new("B"),
        ]);
        let (_, calculator) = setup(repo);
        let office = OfficeSamplingSlot::new("A", at(6, 1), at(6, 5));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 14, &["A", "B"]))
            .await
            .unwrap();

        // A is restricted on Monday, so B takes 05-07 and nobody may take 07-19.
        assert_eq!(
            summary(&schedule),
            vec![("B", at(6, 5), at(6, 7), Assignment::Validated)]
        );
        assert!(!schedule.is_complete());
        assert_eq!(schedule.unassigned_hours, 12.0);
    }

    #[tokio::test]
    async fn test_fallback_can_be_disabled() {
        let (_, calculator) = setup(InMemoryRepository::new().with_samplers(vec![Sampler::new("A")]));
        let calculator = ScheduleCalculator::new(
            calculator.cache().clone(),
            SchedulerConfig {
                allow_fallback_assignment: false,
                ..SchedulerConfig::default()
            },
        );
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 12, &["A"]))
            .await
            .unwrap();
        assert_eq!(schedule.turns.len(), 1);
        assert_eq!(schedule.unassigned_hours, 2.0);
    }

    #[tokio::test]
    async fn test_rejects_malformed_input() {
        let (_, calculator) = setup(InMemoryRepository::new());
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();

        let err = calculator
            .generate_schedule(&mut ctx, &request(office.clone(), 12, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidInput(_)));

        let err = calculator
            .generate_schedule(&mut ctx, &request(office, 0, &["A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidInput(_)));

        let inverted = OfficeSamplingSlot {
            hours: 6.0,
            ..OfficeSamplingSlot::new("Office", at(6, 9), at(6, 3))
        };
        let err = calculator
            .generate_schedule(&mut ctx, &request(inverted, 12, &["A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InconsistentData(_)));
    }

    #[tokio::test]
    async fn test_offline_repository_is_an_upstream_error() {
        let (repo, calculator) = setup(InMemoryRepository::new().with_samplers(vec![Sampler::new("A")]));
        repo.set_offline(true);
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();
        let err = calculator
            .generate_schedule(&mut ctx, &request(office, 12, &["A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Upstream(_)));
    }

    /// Upstream whose nominations read fails a set number of times.
    struct FlakyRepository {
        inner: InMemoryRepository,
        nomination_failures: AtomicUsize,
    }

    impl FlakyRepository {
        fn new(inner: InMemoryRepository, nomination_failures: usize) -> Self {
            Self {
                inner,
                nomination_failures: AtomicUsize::new(nomination_failures),
            }
        }
    }

    #[async_trait]
    impl ScheduleRepository for FlakyRepository {
        async fn active_rosters(
            &self,
            window: FetchWindow,
            exclude_roster_id: Option<&str>,
        ) -> Result<Vec<RosterRecord>, RepositoryError> {
            self.inner.active_rosters(window, exclude_roster_id).await
        }

        async fn ship_nominations(
            &self,
            window: FetchWindow,
        ) -> Result<Vec<ShipNomination>, RepositoryError> {
            let failing = self
                .nomination_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(RepositoryError::unavailable("nominations", "connection reset"));
            }
            self.inner.ship_nominations(window).await
        }

        async fn samplers(&self) -> Result<Vec<Sampler>, RepositoryError> {
            self.inner.samplers().await
        }

        async fn truck_work_days(
            &self,
            window: FetchWindow,
        ) -> Result<Vec<WorkDayShift>, RepositoryError> {
            self.inner.truck_work_days(window).await
        }

        async fn other_jobs(
            &self,
            window: FetchWindow,
        ) -> Result<Vec<WorkDayShift>, RepositoryError> {
            self.inner.other_jobs(window).await
        }
    }

    fn flaky_calculator(nomination_failures: usize) -> ScheduleCalculator {
        let inner = InMemoryRepository::new().with_samplers(vec![Sampler::new("A"), Sampler::new("B")]);
        let config = SchedulerConfig::default();
        let shared: Arc<dyn ScheduleRepository> =
            Arc::new(FlakyRepository::new(inner, nomination_failures));
        ScheduleCalculator::new(Arc::new(ValidationCache::new(shared, &config)), config)
    }

    #[tokio::test]
    async fn test_failed_preload_degrades_to_direct_reads() {
        let calculator = flaky_calculator(1);
        let office = OfficeSamplingSlot::new("Office", at(6, 3), at(6, 9));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 12, &["A", "B"]))
            .await
            .unwrap();

        assert!(schedule.degraded);
        assert!(schedule.is_complete());
        assert_eq!(schedule.total_hours, 12.0);
        assert_eq!(
            summary(&schedule),
            vec![
                ("A", at(6, 9), at(6, 19), Assignment::Validated),
                ("B", at(6, 19), at(6, 21), Assignment::Validated),
            ]
        );
        assert!(calculator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_proposed_shift_falls_back_to_direct_reads() {
        let calculator = flaky_calculator(1);
        let proposal = ShiftProposal {
            sampler_name: "A".to_string(),
            start: at(6, 7),
            end: at(6, 19),
            turns_in_memory: vec![],
            office: None,
            roster_id: None,
            vessel_name: None,
        };
        let result = calculator.validate_proposed_shift(&proposal).await;
        assert!(result.is_valid());
        assert_eq!(result.origin, DataOrigin::Direct);

        // The next call preloads normally.
        let cached = calculator.validate_proposed_shift(&proposal).await;
        assert_eq!(cached.origin, DataOrigin::Cached);
    }

    #[tokio::test]
    async fn test_turns_in_next_week_use_that_week() {
        let samplers = vec![Sampler::new("A"), Sampler::new("B"), Sampler::new("C")];
        let (_, calculator) = setup(InMemoryRepository::new().with_samplers(samplers));
        // Sunday
        let office = OfficeSamplingSlot::new("Office", at(12, 3), at(12, 9));
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_schedule(&mut ctx, &request(office, 24, &["A", "B", "C"]))
            .await
            .unwrap();
        assert_eq!(schedule.total_hours, 24.0);
        assert_eq!(schedule.turns.last().map(|t| t.end), Some(at(13, 9)));
        assert_eq!(calculator.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_single_turn_skips_restricted_sampler() {
        let repo = InMemoryRepository::new().with_samplers(vec![
            Sampler::new("A").with_restricted_day(Weekday::Mon),
            Sampler::new("B"),
        ]);
        let (_, calculator) = setup(repo);
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .generate_single_turn(
                &mut ctx,
                &SingleTurnRequest {
                    etc: at(6, 10),
                    samplers: vec!["A".to_string(), "B".to_string()],
                    office: None,
                    roster_id: None,
                    vessel_name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            summary(&schedule),
            vec![("B", at(6, 10), at(6, 14), Assignment::FixedSingleTurn)]
        );
    }

    fn recalculation(edited: ScheduledTurn, etc: Instant, samplers: &[&str]) -> RecalculationRequest {
        RecalculationRequest {
            edited_first_turn: edited,
            etc,
            samplers: samplers.iter().map(|s| s.to_string()).collect(),
            office: None,
            roster_id: None,
            vessel_name: None,
        }
    }

    #[tokio::test]
    async fn test_recalculation_after_edit() {
        let repo = InMemoryRepository::new().with_samplers(vec![
            Sampler::new("B"),
            Sampler::new("C"),
            Sampler::new("D"),
        ]);
        let (_, calculator) = setup(repo);
        let edited = ScheduledTurn::new("A", at(6, 9), at(6, 15), Assignment::Validated);
        let mut ctx = GenerationContext::new();
        let schedule = calculator
            .recalculate_from_edited_first_turn(
                &mut ctx,
                &recalculation(edited, at(7, 19), &["B", "C", "D"]),
            )
            .await
            .unwrap();

        assert_eq!(
            summary(&schedule),
            vec![
                ("A", at(6, 9), at(6, 15), Assignment::ManualEdit),
                ("B", at(6, 15), at(7, 3), Assignment::Validated),
                ("C", at(7, 3), at(7, 15), Assignment::Validated),
                ("D", at(7, 15), at(7, 19), Assignment::Validated),
            ]
        );
        assert_eq!(schedule.total_hours, 34.0);
    }

    #[tokio::test]
    async fn test_recalculation_spreads_over_fewer_samplers() {
        let repo = InMemoryRepository::new().with_samplers(vec![Sampler::new("B"), Sampler::new("C")]);
        let (_, calculator) = setup(repo);
        let edited = ScheduledTurn::new("A", at(6, 9), at(6, 15), Assignment::Validated);
        let mut ctx = GenerationContext::new();
        // 28h left would be three turns, but only two samplers are offered.
        let schedule = calculator
            .recalculate_from_edited_first_turn(&mut ctx, &recalculation(edited, at(7, 19), &["B", "C"]))
            .await
            .unwrap();

        assert_eq!(
            summary(&schedule),
            vec![
                ("A", at(6, 9), at(6, 15), Assignment::ManualEdit),
                ("B", at(6, 15), at(7, 5), Assignment::Validated),
                ("C", at(7, 5), at(7, 19), Assignment::Validated),
            ]
        );
        assert_eq!(schedule.fallback_count(), 0);
        assert!(schedule.is_complete());
    }

    #[tokio::test]
    async fn test_recalculation_short_remainder_and_overrun() {
        let (_, calculator) = setup(InMemoryRepository::new().with_samplers(vec![Sampler::new("B")]));
        let edited = ScheduledTurn::new("A", at(6, 9), at(6, 15), Assignment::Validated);
        let mut ctx = GenerationContext::new();

        let short = calculator
            .recalculate_from_edited_first_turn(&mut ctx, &recalculation(edited.clone(), at(6, 18), &["B"]))
            .await
            .unwrap();
        assert_eq!(short.turns.len(), 2);
        assert_eq!(short.turns[1].hours, 3.0);

        let overrun = calculator
            .recalculate_from_edited_first_turn(&mut ctx, &recalculation(edited, at(6, 12), &[]))
            .await
            .unwrap();
        assert_eq!(overrun.turns.len(), 1);
        assert!(overrun.is_complete());

        let inverted = ScheduledTurn::new("A", at(6, 15), at(6, 9), Assignment::Validated);
        let err = calculator
            .recalculate_from_edited_first_turn(&mut ctx, &recalculation(inverted, at(7, 19), &["B"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InconsistentData(_)));
    }

    #[test]
    fn test_recalculation_plan() {
        let (_, calculator) = setup(InMemoryRepository::new());
        assert!(calculator.recalculation_plan(0.0, 3).is_empty());
        assert_eq!(calculator.recalculation_plan(3.5, 3), vec![3.5]);
        assert_eq!(calculator.recalculation_plan(24.0, 3), vec![12.0, 12.0]);
        assert_eq!(calculator.recalculation_plan(30.5, 3), vec![12.0, 12.0, 6.5]);
        assert_eq!(calculator.recalculation_plan(30.5, 2), vec![16.0, 14.5]);
        assert_eq!(calculator.recalculation_plan(30.0, 1), vec![30.0]);
    }

    #[tokio::test]
    async fn test_validate_proposed_shift_never_fails() {
        let (repo, calculator) = setup(InMemoryRepository::new().with_samplers(vec![Sampler::new("A")]));
        let proposal = ShiftProposal {
            sampler_name: "A".to_string(),
            start: at(6, 7),
            end: at(6, 19),
            turns_in_memory: vec![],
            office: None,
            roster_id: None,
            vessel_name: None,
        };

        let ok = calculator.validate_proposed_shift(&proposal).await;
        assert!(ok.is_valid());
        assert_eq!(ok.origin, DataOrigin::Cached);

        repo.set_offline(true);
        calculator.cache().clear();
        let unavailable = calculator.validate_proposed_shift(&proposal).await;
        assert!(!unavailable.is_valid());
        assert_eq!(unavailable.origin, DataOrigin::Unavailable);
    }
}
