//! Shift validation.
//!
//! [`ValidationEngine`] evaluates five independent checks for a proposed
//! `[start, end)` shift of one sampler:
//!
//! - **Weekly limit**: cached hours + in-run hours + proposed hours within the cap
//! - **Day restriction**: the start's weekday is not flagged for the sampler
//! - **Minimum rest**: at least `min_rest_hours` around the proposed shift
//! - **Cross assignment**: no overlap with any committed shift, any vessel or module
//! - **POB conflict**: no overlap with a pilot-on-board window the sampler is nominated for
//!
//! All five are always evaluated so callers can show every reason at once.
//! The engine reads sampler data through [`ValidationDataSource`], backed
//! either by a cached [`WeekSnapshot`] or by freshly fetched [`WeekData`].

use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{PobWindow, SamplerValidationData, WeekData, WeekSnapshot, WeeklyHours};
use crate::config::SchedulerConfig;
use crate::domain::{OfficeSamplingSlot, ShiftInterval, WeekDayRestrictions};
use crate::error::RepositoryError;
use crate::repository::{FetchWindow, ScheduleRepository};
use crate::time_window::{
    hours_between, intervals_overlap, round_hours, Instant, TerminalClock, WeekBounds,
};

/// Where the data behind a validation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataOrigin {
    /// Indexed week snapshot.
    Cached,
    /// Recomputed from a direct upstream read.
    Direct,
    /// The sampler had no entry; only in-run data was checked.
    UncachedOptimistic,
    /// No data could be loaded; the shift is rejected.
    Unavailable,
}

/// Extra numbers behind a check, for display and audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum CheckDetails {
    #[serde(rename_all = "camelCase")]
    Weekly {
        limit: f64,
        current_hours: f64,
        in_memory_hours: f64,
        proposed_hours: f64,
        total_hours: f64,
    },
    #[serde(rename_all = "camelCase")]
    DayRestriction { weekday: String },
    #[serde(rename_all = "camelCase")]
    Rest {
        min_rest_hours: f64,
        shortest_gap_hours: f64,
        neighbour_start: Instant,
        neighbour_end: Instant,
    },
    #[serde(rename_all = "camelCase")]
    Conflicts { intervals: Vec<ShiftInterval> },
    #[serde(rename_all = "camelCase")]
    Pob { windows: Vec<PobWindow> },
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub is_valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckDetails>,
}

impl CheckResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: CheckDetails) -> Self {
        self.details = Some(details);
        self
    }
}

/// All five checks for one sampler and one proposed shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnValidation {
    pub sampler_name: String,
    pub start: Instant,
    pub end: Instant,
    pub origin: DataOrigin,
    pub weekly: CheckResult,
    pub day_restriction: CheckResult,
    pub rest: CheckResult,
    pub cross_assignment: CheckResult,
    pub pob_conflict: CheckResult,
    pub overall: CheckResult,
}

impl TurnValidation {
    pub fn is_valid(&self) -> bool {
        self.overall.is_valid
    }

    /// Names of the failing checks, in reasoning order.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        [
            ("weekly", &self.weekly),
            ("dayRestriction", &self.day_restriction),
            ("rest", &self.rest),
            ("crossAssignment", &self.cross_assignment),
            ("pobConflict", &self.pob_conflict),
        ]
        .into_iter()
        .filter(|(_, check)| !check.is_valid)
        .map(|(name, _)| name)
        .collect()
    }

    /// Every check rejected for the same reason.
    pub fn rejected(
        sampler_name: &str,
        start: Instant,
        end: Instant,
        origin: DataOrigin,
        reason: &str,
    ) -> Self {
        let fail = CheckResult::fail(reason);
        Self {
            sampler_name: sampler_name.to_string(),
            start,
            end,
            origin,
            weekly: fail.clone(),
            day_restriction: fail.clone(),
            rest: fail.clone(),
            cross_assignment: fail.clone(),
            pob_conflict: fail.clone(),
            overall: fail,
        }
    }
}

/// Source of per-sampler validation data for one week.
pub trait ValidationDataSource {
    fn origin(&self) -> DataOrigin;

    fn week(&self) -> &WeekBounds;

    /// `None` when the sampler is unknown to this source.
    fn sampler_data(&self, name: &str) -> Option<Cow<'_, SamplerValidationData>>;
}

/// O(1) lookups into a cached snapshot.
#[derive(Debug, Clone)]
pub struct CachedSource {
    snapshot: Arc<WeekSnapshot>,
}

impl CachedSource {
    pub fn new(snapshot: Arc<WeekSnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Arc<WeekSnapshot> {
        &self.snapshot
    }
}

impl ValidationDataSource for CachedSource {
    fn origin(&self) -> DataOrigin {
        DataOrigin::Cached
    }

    fn week(&self) -> &WeekBounds {
        &self.snapshot.week
    }

    fn sampler_data(&self, name: &str) -> Option<Cow<'_, SamplerValidationData>> {
        self.snapshot.sampler(name).map(Cow::Borrowed)
    }
}

/// Recomputes a sampler's view on every lookup from directly fetched data.
#[derive(Debug, Clone)]
pub struct DirectSource {
    week: WeekBounds,
    data: WeekData,
    default_weekly_limit: f64,
}

impl DirectSource {
    pub fn new(week: WeekBounds, data: WeekData, default_weekly_limit: f64) -> Self {
        Self {
            week,
            data,
            default_weekly_limit,
        }
    }

    /// Reads the sources one after another, without the cache.
    pub async fn load(
        repository: &dyn ScheduleRepository,
        week: WeekBounds,
        window: FetchWindow,
        exclude_roster_id: Option<&str>,
        default_weekly_limit: f64,
    ) -> Result<Self, RepositoryError> {
        let data = WeekData {
            samplers: repository.samplers().await?,
            rosters: repository.active_rosters(window, exclude_roster_id).await?,
            nominations: repository.ship_nominations(window).await?,
            truck_work_days: repository.truck_work_days(window).await?,
            other_jobs: repository.other_jobs(window).await?,
        };
        Ok(Self::new(week, data, default_weekly_limit))
    }
}

impl ValidationDataSource for DirectSource {
    fn origin(&self) -> DataOrigin {
        DataOrigin::Direct
    }

    fn week(&self) -> &WeekBounds {
        &self.week
    }

    fn sampler_data(&self, name: &str) -> Option<Cow<'_, SamplerValidationData>> {
        self.data
            .samplers
            .iter()
            .find(|s| s.name == name)
            .map(|s| Cow::Owned(self.data.sampler_view(s, &self.week, self.default_weekly_limit)))
    }
}

/// A shift to validate together with the in-run context around it.
#[derive(Debug, Clone, Copy)]
pub struct Proposal<'a> {
    pub sampler_name: &'a str,
    pub start: Instant,
    pub end: Instant,
    /// Turns produced earlier in the same run, not yet persisted.
    pub turns_in_memory: &'a [ShiftInterval],
    pub office: Option<&'a OfficeSamplingSlot>,
    /// Vessel being scheduled; its own nomination never blocks.
    pub vessel_name: Option<&'a str>,
}

impl<'a> Proposal<'a> {
    pub fn new(sampler_name: &'a str, start: Instant, end: Instant) -> Self {
        Self {
            sampler_name,
            start,
            end,
            turns_in_memory: &[],
            office: None,
            vessel_name: None,
        }
    }

    pub fn with_turns(mut self, turns: &'a [ShiftInterval]) -> Self {
        self.turns_in_memory = turns;
        self
    }

    pub fn with_office(mut self, office: Option<&'a OfficeSamplingSlot>) -> Self {
        self.office = office;
        self
    }

    pub fn with_vessel(mut self, vessel_name: Option<&'a str>) -> Self {
        self.vessel_name = vessel_name;
        self
    }

    pub fn hours(&self) -> f64 {
        hours_between(self.start, self.end)
    }

    fn is_same(&self, start: Instant, end: Instant) -> bool {
        self.start == start && self.end == end
    }

    /// In-run shifts of this sampler (turns plus office), without the
    /// proposal itself and without anything already committed.
    fn own_uncommitted(&self, committed: &[ShiftInterval]) -> Vec<(Instant, Instant)> {
        let office = self
            .office
            .filter(|o| o.sampler_name == self.sampler_name)
            .map(|o| (o.start, o.end));
        self.turns_in_memory
            .iter()
            .filter(|t| t.sampler_name == self.sampler_name)
            .map(|t| (t.start, t.end))
            .chain(office)
            .filter(|(s, e)| !self.is_same(*s, *e))
            .filter(|(s, e)| !committed.iter().any(|c| c.start == *s && c.end == *e))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationEngine {
    clock: TerminalClock,
    min_rest_hours: f64,
}

impl ValidationEngine {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            clock: config.clock(),
            min_rest_hours: config.min_rest_hours,
        }
    }

    pub fn clock(&self) -> &TerminalClock {
        &self.clock
    }

    /// Runs the five checks. Never short-circuits.
    pub fn validate_sampler_for_turn(
        &self,
        source: &dyn ValidationDataSource,
        proposal: &Proposal<'_>,
    ) -> TurnValidation {
        if proposal.end <= proposal.start {
            return TurnValidation::rejected(
                proposal.sampler_name,
                proposal.start,
                proposal.end,
                source.origin(),
                "Shift end must be after its start",
            );
        }

        let (data, origin) = match source.sampler_data(proposal.sampler_name) {
            Some(data) => (data, source.origin()),
            None => {
                debug!(
                    sampler = proposal.sampler_name,
                    week = %source.week().key(),
                    "No validation data for sampler, assuming available"
                );
                (
                    Cow::Owned(empty_view(proposal.sampler_name)),
                    DataOrigin::UncachedOptimistic,
                )
            }
        };

        let weekly = self.check_weekly(&data, source.week(), proposal);
        let day_restriction = self.check_day_restriction(&data.day_restrictions, proposal.start);
        let rest = self.check_rest(&data, proposal);
        let cross_assignment = self.check_cross_assignment(&data, proposal);
        let pob_conflict = self.check_pob_conflict(&data, proposal);

        let checks = [
            &weekly,
            &day_restriction,
            &rest,
            &cross_assignment,
            &pob_conflict,
        ];
        let overall = if checks.iter().all(|c| c.is_valid) {
            CheckResult::pass("Sampler available")
        } else {
            let reasons: Vec<&str> = checks
                .iter()
                .filter(|c| !c.is_valid)
                .map(|c| c.message.as_str())
                .collect();
            CheckResult::fail(reasons.join("; "))
        };

        let validation = TurnValidation {
            sampler_name: proposal.sampler_name.to_string(),
            start: proposal.start,
            end: proposal.end,
            origin,
            weekly,
            day_restriction,
            rest,
            cross_assignment,
            pob_conflict,
            overall,
        };
        if !validation.is_valid() {
            debug!(
                sampler = proposal.sampler_name,
                start = %proposal.start,
                end = %proposal.end,
                failed = ?validation.failed_checks(),
                "Sampler rejected"
            );
        }
        validation
    }

    /// Cached hours + uncommitted in-run hours + proposed hours against the cap.
    pub fn check_weekly(
        &self,
        data: &SamplerValidationData,
        week: &WeekBounds,
        proposal: &Proposal<'_>,
    ) -> CheckResult {
        self.check_weekly_hours(
            &data.weekly,
            week,
            proposal,
            &data.schedule_intervals,
            proposal.hours(),
        )
    }

    /// Weekly check for an explicit number of additional hours.
    pub fn check_weekly_hours(
        &self,
        weekly: &WeeklyHours,
        week: &WeekBounds,
        proposal: &Proposal<'_>,
        committed: &[ShiftInterval],
        proposed_hours: f64,
    ) -> CheckResult {
        let Some(limit) = weekly.limit else {
            return CheckResult::pass("No weekly limit");
        };
        let in_memory_hours = round_hours(
            proposal
                .own_uncommitted(committed)
                .into_iter()
                .map(|(s, e)| week.clip_hours(s, e))
                .sum(),
        );
        // A turn crossing into the next week only charges its share of this one.
        let proposed_hours =
            round_hours(proposed_hours.min(week.clip_hours(proposal.start, proposal.end)));
        let total_hours = round_hours(weekly.current_hours + in_memory_hours + proposed_hours);
        let details = CheckDetails::Weekly {
            limit,
            current_hours: weekly.current_hours,
            in_memory_hours,
            proposed_hours,
            total_hours,
        };
        if total_hours <= limit {
            CheckResult::pass(format!("{}h of {}h weekly limit", total_hours, limit))
                .with_details(details)
        } else {
            CheckResult::fail(format!(
                "Weekly limit exceeded: {}h would exceed {}h",
                total_hours, limit
            ))
            .with_details(details)
        }
    }

    pub fn check_day_restriction(
        &self,
        restrictions: &WeekDayRestrictions,
        start: Instant,
    ) -> CheckResult {
        let weekday = self.clock.weekday(start);
        if restrictions.is_restricted(weekday) {
            CheckResult::fail(format!("Sampler is restricted on {}", weekday)).with_details(
                CheckDetails::DayRestriction {
                    weekday: weekday.to_string(),
                },
            )
        } else {
            CheckResult::pass("No day restriction")
        }
    }

    /// Checks only the gaps adjacent to the proposed shift; committed shifts
    /// are never re-validated against each other.
    pub fn check_rest(&self, data: &SamplerValidationData, proposal: &Proposal<'_>) -> CheckResult {
        let mut timeline: Vec<(Instant, Instant, bool)> = data
            .schedule_intervals
            .iter()
            .map(|i| (i.start, i.end, false))
            .chain(
                proposal
                    .own_uncommitted(&data.schedule_intervals)
                    .into_iter()
                    .map(|(s, e)| (s, e, false)),
            )
            .collect();
        timeline.push((proposal.start, proposal.end, true));
        timeline.sort_by_key(|(start, end, _)| (*start, *end));

        let mut shortest: Option<(f64, Instant, Instant)> = None;
        for pair in timeline.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if !earlier.2 && !later.2 {
                continue;
            }
            let gap = hours_between(earlier.1, later.0);
            let neighbour = if earlier.2 { later } else { earlier };
            if gap < self.min_rest_hours && shortest.map_or(true, |(g, _, _)| gap < g) {
                shortest = Some((gap, neighbour.0, neighbour.1));
            }
        }

        match shortest {
            None => CheckResult::pass(format!("At least {}h rest", self.min_rest_hours)),
            Some((gap, neighbour_start, neighbour_end)) => CheckResult::fail(format!(
                "Only {}h rest between shifts, minimum is {}h",
                gap.max(0.0),
                self.min_rest_hours
            ))
            .with_details(CheckDetails::Rest {
                min_rest_hours: self.min_rest_hours,
                shortest_gap_hours: gap,
                neighbour_start,
                neighbour_end,
            }),
        }
    }

    pub fn check_cross_assignment(
        &self,
        data: &SamplerValidationData,
        proposal: &Proposal<'_>,
    ) -> CheckResult {
        let conflicts: Vec<ShiftInterval> = data
            .schedule_intervals
            .iter()
            .filter(|i| i.overlaps(proposal.start, proposal.end))
            .cloned()
            .collect();
        if conflicts.is_empty() {
            return CheckResult::pass("No conflicting assignment");
        }
        let labels: Vec<String> = conflicts.iter().map(describe_interval).collect();
        CheckResult::fail(format!("Already assigned: {}", labels.join(", ")))
            .with_details(CheckDetails::Conflicts {
                intervals: conflicts,
            })
    }

    pub fn check_pob_conflict(
        &self,
        data: &SamplerValidationData,
        proposal: &Proposal<'_>,
    ) -> CheckResult {
        let windows: Vec<PobWindow> = data
            .pob_windows
            .iter()
            .filter(|w| proposal.vessel_name != Some(w.vessel_name.as_str()))
            .filter(|w| intervals_overlap(w.start, w.end, proposal.start, proposal.end))
            .cloned()
            .collect();
        if windows.is_empty() {
            return CheckResult::pass("No POB conflict");
        }
        let vessels: Vec<&str> = windows.iter().map(|w| w.vessel_name.as_str()).collect();
        CheckResult::fail(format!("Nominated for {} during this shift", vessels.join(", ")))
            .with_details(CheckDetails::Pob { windows })
    }
}

fn describe_interval(interval: &ShiftInterval) -> String {
    match &interval.vessel_name {
        Some(vessel) => format!("{:?} on {}", interval.source, vessel),
        None => format!("{:?}", interval.source),
    }
}

fn empty_view(sampler_name: &str) -> SamplerValidationData {
    SamplerValidationData {
        sampler_name: sampler_name.to_string(),
        weekly: WeeklyHours {
            has_limit: false,
            limit: None,
            current_hours: 0.0,
        },
        day_restrictions: WeekDayRestrictions::default(),
        has_day_restrictions: false,
        schedule_intervals: Vec::new(),
        pob_windows: Vec::new(),
    }
}
