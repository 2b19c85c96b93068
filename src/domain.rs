//! Domain model for vessel sampling rosters.
//!
//! The records shaped like the upstream collaborators' payloads (samplers,
//! rosters, ship nominations, truck work days, other jobs) deserialize
//! directly from their camelCase JSON. The core only reads them.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::time_window::{hours_between, intervals_overlap, Instant};

/// Days of the week on which a sampler must not start a shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekDayRestrictions {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl WeekDayRestrictions {
    pub fn is_restricted(&self, day: Weekday) -> bool {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    pub fn any(&self) -> bool {
        [
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
            self.sunday,
        ]
        .contains(&true)
    }

    /// Builder-style helper used by demo data and tests.
    pub fn with_day(mut self, day: Weekday) -> Self {
        match day {
            Weekday::Mon => self.monday = true,
            Weekday::Tue => self.tuesday = true,
            Weekday::Wed => self.wednesday = true,
            Weekday::Thu => self.thursday = true,
            Weekday::Fri => self.friday = true,
            Weekday::Sat => self.saturday = true,
            Weekday::Sun => self.sunday = true,
        }
        self
    }
}

/// Personnel master record. `name` is the authoritative identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub name: String,
    #[serde(default)]
    pub weekly_restriction: bool,
    #[serde(default)]
    pub week_day_restrictions: WeekDayRestrictions,
    /// Per-sampler override of the weekly cap; only read when
    /// `weekly_restriction` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_limit_hours: Option<f64>,
}

impl Sampler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weekly_restriction: false,
            week_day_restrictions: WeekDayRestrictions::default(),
            weekly_limit_hours: None,
        }
    }

    pub fn with_weekly_restriction(mut self) -> Self {
        self.weekly_restriction = true;
        self
    }

    pub fn with_restricted_day(mut self, day: Weekday) -> Self {
        self.week_day_restrictions = self.week_day_restrictions.with_day(day);
        self
    }

    /// Weekly cap in hours, or `None` when the sampler has no cap.
    pub fn weekly_limit(&self, default_limit: f64) -> Option<f64> {
        self.weekly_restriction
            .then(|| self.weekly_limit_hours.unwrap_or(default_limit))
    }
}

/// Where a shift interval came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShiftSource {
    Office,
    Line,
    Truck,
    OtherJob,
    /// A not-yet-committed shift under validation.
    Proposed,
}

/// A contiguous work assignment for one sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftInterval {
    pub sampler_name: String,
    pub start: Instant,
    pub end: Instant,
    pub source: ShiftSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vessel_name: Option<String>,
}

impl ShiftInterval {
    pub fn new(
        sampler_name: impl Into<String>,
        start: Instant,
        end: Instant,
        source: ShiftSource,
    ) -> Self {
        Self {
            sampler_name: sampler_name.into(),
            start,
            end,
            source,
            vessel_name: None,
        }
    }

    pub fn with_vessel(mut self, vessel_name: impl Into<String>) -> Self {
        self.vessel_name = Some(vessel_name.into());
        self
    }

    pub fn hours(&self) -> f64 {
        hours_between(self.start, self.end)
    }

    pub fn overlaps(&self, start: Instant, end: Instant) -> bool {
        intervals_overlap(self.start, self.end, start, end)
    }
}

/// The fixed office shift that precedes the generated line turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeSamplingSlot {
    pub sampler_name: String,
    pub start: Instant,
    pub end: Instant,
    pub hours: f64,
}

impl OfficeSamplingSlot {
    pub fn new(sampler_name: impl Into<String>, start: Instant, end: Instant) -> Self {
        Self {
            sampler_name: sampler_name.into(),
            start,
            end,
            hours: hours_between(start, end),
        }
    }

    pub fn to_interval(&self) -> ShiftInterval {
        ShiftInterval::new(&self.sampler_name, self.start, self.end, ShiftSource::Office)
    }
}

/// `{ name }` reference as embedded in roster and nomination payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerRef {
    pub name: String,
}

/// An office or line sampling entry inside a persisted roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingAssignment {
    pub sampler: SamplerRef,
    pub start_time: Instant,
    pub finish_time: Instant,
    pub hours: f64,
}

impl SamplingAssignment {
    pub fn new(sampler_name: impl Into<String>, start_time: Instant, finish_time: Instant) -> Self {
        Self {
            sampler: SamplerRef {
                name: sampler_name.into(),
            },
            start_time,
            finish_time,
            hours: hours_between(start_time, finish_time),
        }
    }
}

impl From<&SamplingAssignment> for OfficeSamplingSlot {
    fn from(a: &SamplingAssignment) -> Self {
        Self {
            sampler_name: a.sampler.name.clone(),
            start: a.start_time,
            end: a.finish_time,
            hours: a.hours,
        }
    }
}

/// One roster per vessel nomination, owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRecord {
    pub id: String,
    pub vessel_name: String,
    #[serde(default)]
    pub office_sampling: Option<SamplingAssignment>,
    #[serde(default)]
    pub line_sampling: Vec<SamplingAssignment>,
}

impl RosterRecord {
    /// Office and line shifts of this roster as tagged intervals.
    pub fn intervals(&self) -> impl Iterator<Item = ShiftInterval> + '_ {
        let office = self
            .office_sampling
            .iter()
            .map(|a| (a, ShiftSource::Office));
        let line = self.line_sampling.iter().map(|a| (a, ShiftSource::Line));
        office.chain(line).map(move |(a, source)| {
            ShiftInterval::new(&a.sampler.name, a.start_time, a.finish_time, source)
                .with_vessel(&self.vessel_name)
        })
    }

    /// Earliest start and latest finish over all shifts.
    pub fn span(&self) -> Option<(Instant, Instant)> {
        let mut intervals = self.intervals();
        let first = intervals.next()?;
        Some(intervals.fold((first.start, first.end), |(s, e), i| {
            (s.min(i.start), e.max(i.end))
        }))
    }
}

/// A vessel nomination; its designated sampler is reserved from pilot on
/// board until the estimated time of completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipNomination {
    pub vessel_name: String,
    #[serde(default)]
    pub sampler: Option<SamplerRef>,
    pub pilot_on_board: Instant,
    pub etc: Instant,
}

impl ShipNomination {
    pub fn sampler_name(&self) -> Option<&str> {
        self.sampler.as_ref().map(|s| s.name.as_str())
    }
}

/// Shift block of a truck-loading day or a miscellaneous job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkShift {
    pub start_time: Instant,
    pub end_time: Instant,
    pub hours: f64,
}

/// Truck work day or other-job entry. Names come from a different subsystem
/// and are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkDayShift {
    pub sampler_name: String,
    pub shift: WorkShift,
}

impl WorkDayShift {
    pub fn new(sampler_name: impl Into<String>, start_time: Instant, end_time: Instant) -> Self {
        Self {
            sampler_name: sampler_name.into(),
            shift: WorkShift {
                start_time,
                end_time,
                hours: hours_between(start_time, end_time),
            },
        }
    }

    pub fn to_interval(&self, source: ShiftSource) -> ShiftInterval {
        ShiftInterval::new(
            &self.sampler_name,
            self.shift.start_time,
            self.shift.end_time,
            source,
        )
    }
}

/// How a generated turn got its sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Assignment {
    /// The office sampler continuing up to the next block boundary.
    OfficeContinuation,
    /// Passed every check and won the rotation score.
    Validated,
    /// Emergency assignment under the relaxed same-day rule only.
    Fallback,
    /// Fixed-duration single turn at the completion estimate.
    FixedSingleTurn,
    /// First turn edited by hand; kept exactly as given.
    ManualEdit,
}

/// A generated line-sampling turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTurn {
    pub sampler_name: String,
    pub start: Instant,
    pub end: Instant,
    pub hours: f64,
    pub assignment: Assignment,
}

impl ScheduledTurn {
    pub fn new(
        sampler_name: impl Into<String>,
        start: Instant,
        end: Instant,
        assignment: Assignment,
    ) -> Self {
        Self {
            sampler_name: sampler_name.into(),
            start,
            end,
            hours: hours_between(start, end),
            assignment,
        }
    }

    pub fn to_interval(&self) -> ShiftInterval {
        ShiftInterval::new(&self.sampler_name, self.start, self.end, ShiftSource::Line)
    }
}
