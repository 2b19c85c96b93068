//! Time-window arithmetic for sampling shifts.
//!
//! Instants are absolute (`DateTime<Utc>`). Everything that depends on the
//! wall clock at the terminal (block boundaries, weekdays, calendar days and
//! Monday-Sunday weeks) goes through a [`TerminalClock`] configured with the
//! terminal's UTC offset.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

/// Absolute point in time used across the crate.
pub type Instant = DateTime<Utc>;

/// Default shift-change hours (07:00 and 19:00 local).
pub const DEFAULT_BLOCK_HOURS: [u32; 2] = [7, 19];

/// Rounds an hour count to 3 decimals to suppress floating-point drift.
///
/// # Examples
///
/// ```
/// use sampling_roster::time_window::round_hours;
///
/// assert_eq!(round_hours(12.000_000_3), 12.0);
/// assert_eq!(round_hours(1.23456), 1.235);
/// ```
pub fn round_hours(hours: f64) -> f64 {
    (hours * 1000.0).round() / 1000.0
}

/// Hours between two instants, rounded. Negative when `end` precedes `start`.
pub fn hours_between(start: Instant, end: Instant) -> f64 {
    round_hours((end - start).num_milliseconds() as f64 / 3_600_000.0)
}

/// Duration of a (possibly fractional) number of hours, to the second.
///
/// ```
/// use sampling_roster::time_window::hours_duration;
///
/// assert_eq!(hours_duration(1.5).num_minutes(), 90);
/// ```
pub fn hours_duration(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0).round() as i64)
}

/// Hours of interval A that fall inside window B.
///
/// Returns 0 when the intervals do not intersect or either one is inverted.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use sampling_roster::time_window::overlap_hours;
///
/// let at = |h| Utc.with_ymd_and_hms(2025, 1, 6, h, 0, 0).unwrap();
///
/// assert_eq!(overlap_hours(at(6), at(18), at(0), at(12)), 6.0);
/// assert_eq!(overlap_hours(at(6), at(8), at(8), at(12)), 0.0);
/// assert_eq!(overlap_hours(at(8), at(6), at(0), at(12)), 0.0);
/// ```
pub fn overlap_hours(a_start: Instant, a_end: Instant, b_start: Instant, b_end: Instant) -> f64 {
    if a_end <= a_start || b_end <= b_start {
        return 0.0;
    }
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);
    if end <= start {
        0.0
    } else {
        hours_between(start, end).max(0.0)
    }
}

/// Half-open overlap test: touching endpoints do not overlap.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use sampling_roster::time_window::intervals_overlap;
///
/// let at = |h| Utc.with_ymd_and_hms(2025, 1, 6, h, 0, 0).unwrap();
///
/// assert!(intervals_overlap(at(6), at(10), at(9), at(12)));
/// assert!(!intervals_overlap(at(6), at(9), at(9), at(12)));
/// ```
pub fn intervals_overlap(s1: Instant, e1: Instant, s2: Instant, e2: Instant) -> bool {
    !(e1 <= s2 || e2 <= s1)
}

/// A Monday 00:00:00.000 to Sunday 23:59:59.999 window in terminal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekBounds {
    pub week_start: Instant,
    pub week_end: Instant,
    pub iso_year: i32,
    pub iso_week: u32,
}

impl WeekBounds {
    /// Cache key in the `{year}_W{isoWeekNumber}` form.
    pub fn key(&self) -> String {
        format!("{}_W{}", self.iso_year, self.iso_week)
    }

    /// Exclusive end of the week (next Monday 00:00).
    pub fn end_exclusive(&self) -> Instant {
        self.week_end + Duration::milliseconds(1)
    }

    pub fn contains(&self, instant: Instant) -> bool {
        instant >= self.week_start && instant <= self.week_end
    }

    /// Hours of `[start, end)` falling inside this week.
    pub fn clip_hours(&self, start: Instant, end: Instant) -> f64 {
        overlap_hours(start, end, self.week_start, self.end_exclusive())
    }
}

/// Wall clock of the terminal: a fixed UTC offset plus the block boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalClock {
    offset: FixedOffset,
    block_hours: Vec<u32>,
}

impl Default for TerminalClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl TerminalClock {
    /// Creates a clock; invalid or empty block hours fall back to 07:00/19:00.
    pub fn new(offset: FixedOffset, block_hours: &[u32]) -> Self {
        let mut hours: Vec<u32> = block_hours.iter().copied().filter(|h| *h < 24).collect();
        hours.sort_unstable();
        hours.dedup();
        if hours.is_empty() {
            hours = DEFAULT_BLOCK_HOURS.to_vec();
        }
        Self {
            offset,
            block_hours: hours,
        }
    }

    /// UTC terminal with the default block boundaries.
    pub fn utc() -> Self {
        Self::new(Utc.fix(), &DEFAULT_BLOCK_HOURS)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn block_hours(&self) -> &[u32] {
        &self.block_hours
    }

    fn local(&self, instant: Instant) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    fn to_instant(&self, local: NaiveDateTime) -> Instant {
        (local - Duration::seconds(self.offset.local_minus_utc() as i64)).and_utc()
    }

    /// Calendar day of `instant` at the terminal.
    pub fn local_date(&self, instant: Instant) -> NaiveDate {
        self.local(instant).date()
    }

    pub fn weekday(&self, instant: Instant) -> Weekday {
        self.local(instant).weekday()
    }

    /// True when `instant` sits exactly on a block boundary.
    pub fn is_block_boundary(&self, instant: Instant) -> bool {
        let local = self.local(instant);
        local.minute() == 0
            && local.second() == 0
            && local.nanosecond() == 0
            && self.block_hours.contains(&local.hour())
    }

    /// The first block boundary strictly after `instant`.
    pub fn next_block_boundary(&self, instant: Instant) -> Instant {
        let local = self.local(instant);
        for day in 0..=1 {
            let date = local.date() + Duration::days(day);
            for hour in &self.block_hours {
                let candidate = NaiveDateTime::new(date, hm(*hour));
                if candidate > local {
                    return self.to_instant(candidate);
                }
            }
        }
        // Unreachable with at least one block hour; keep a sane answer anyway.
        instant + Duration::hours(24)
    }

    /// Monday-Sunday week containing `reference`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use sampling_roster::time_window::TerminalClock;
    ///
    /// let clock = TerminalClock::utc();
    /// // Wednesday 2025-01-08
    /// let week = clock.work_week_bounds(Utc.with_ymd_and_hms(2025, 1, 8, 15, 0, 0).unwrap());
    /// assert_eq!(week.week_start, Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap());
    /// assert_eq!(week.key(), "2025_W2");
    /// ```
    pub fn work_week_bounds(&self, reference: Instant) -> WeekBounds {
        let date = self.local_date(reference);
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        let week_start = self.to_instant(NaiveDateTime::new(monday, hm(0)));
        let week_end = week_start + Duration::days(7) - Duration::milliseconds(1);
        let iso = monday.iso_week();
        WeekBounds {
            week_start,
            week_end,
            iso_year: iso.year(),
            iso_week: iso.week(),
        }
    }
}

fn hm(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}
