//! Week-scoped validation cache.
//!
//! One [`WeekSnapshot`] per Monday-Sunday week holds everything needed to
//! validate any shift starting in that week: the raw upstream data and a
//! per-sampler index (weekly hours consumed, day restrictions, conflict
//! intervals, POB windows). Snapshots are immutable and shared as `Arc`;
//! expiry is checked on access and an expired week is rebuilt wholesale.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::domain::{
    RosterRecord, Sampler, ShiftInterval, ShiftSource, ShipNomination, WeekDayRestrictions,
    WorkDayShift,
};
use crate::error::RepositoryError;
use crate::repository::{FetchWindow, ScheduleRepository};
use crate::time_window::{round_hours, Instant, TerminalClock, WeekBounds};

/// Weekly-hours summary for one sampler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyHours {
    pub has_limit: bool,
    pub limit: Option<f64>,
    /// Hours already committed inside the week, across every source.
    pub current_hours: f64,
}

impl WeeklyHours {
    /// Hours left before the cap, `None` for uncapped samplers.
    pub fn headroom(&self) -> Option<f64> {
        self.limit.map(|limit| round_hours(limit - self.current_hours))
    }
}

/// Window during which a nominated sampler is reserved for a vessel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PobWindow {
    pub vessel_name: String,
    pub start: Instant,
    pub end: Instant,
}

/// Indexed validation view of one sampler within one week.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerValidationData {
    pub sampler_name: String,
    pub weekly: WeeklyHours,
    pub day_restrictions: WeekDayRestrictions,
    pub has_day_restrictions: bool,
    /// Committed shifts (office, line, truck, other job) kept with their tags.
    pub schedule_intervals: Vec<ShiftInterval>,
    pub pob_windows: Vec<PobWindow>,
}

/// Raw upstream data for a week (plus fetch margin).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekData {
    pub rosters: Vec<RosterRecord>,
    pub nominations: Vec<ShipNomination>,
    pub samplers: Vec<Sampler>,
    pub truck_work_days: Vec<WorkDayShift>,
    pub other_jobs: Vec<WorkDayShift>,
}

impl WeekData {
    /// Fetches the five sources concurrently; any failure fails the whole load.
    pub async fn fetch(
        repository: &dyn ScheduleRepository,
        window: FetchWindow,
        exclude_roster_id: Option<&str>,
    ) -> Result<Self, RepositoryError> {
        let (rosters, nominations, samplers, truck_work_days, other_jobs) = tokio::try_join!(
            repository.active_rosters(window, exclude_roster_id),
            repository.ship_nominations(window),
            repository.samplers(),
            repository.truck_work_days(window),
            repository.other_jobs(window),
        )?;
        Ok(Self {
            rosters,
            nominations,
            samplers,
            truck_work_days,
            other_jobs,
        })
    }

    /// One sampler's view, recomputed by scanning every event.
    pub fn sampler_view(
        &self,
        sampler: &Sampler,
        week: &WeekBounds,
        default_weekly_limit: f64,
    ) -> SamplerValidationData {
        let lowered = sampler.name.to_lowercase();
        let mut intervals: Vec<ShiftInterval> = self
            .rosters
            .iter()
            .flat_map(|r| r.intervals())
            .filter(|i| i.sampler_name == sampler.name)
            .collect();
        intervals.extend(
            self.truck_work_days
                .iter()
                .filter(|s| s.sampler_name.to_lowercase() == lowered)
                .map(|s| s.to_interval(ShiftSource::Truck)),
        );
        intervals.extend(
            self.other_jobs
                .iter()
                .filter(|s| s.sampler_name.to_lowercase() == lowered)
                .map(|s| s.to_interval(ShiftSource::OtherJob)),
        );
        let pob_windows = self
            .nominations
            .iter()
            .filter(|n| n.sampler_name() == Some(sampler.name.as_str()))
            .map(pob_window)
            .collect();
        build_view(sampler, intervals, pob_windows, week, default_weekly_limit)
    }
}

/// Builds the per-sampler index in one pass over the events.
///
/// Roster shifts match the sampler name exactly; truck and other-job shifts
/// match case-insensitively.
pub fn calculate_all_validations(
    data: &WeekData,
    week: &WeekBounds,
    default_weekly_limit: f64,
) -> HashMap<String, SamplerValidationData> {
    let mut exact: HashMap<String, Vec<ShiftInterval>> = HashMap::new();
    for interval in data.rosters.iter().flat_map(|r| r.intervals()) {
        exact
            .entry(interval.sampler_name.clone())
            .or_default()
            .push(interval);
    }

    let mut folded: HashMap<String, Vec<ShiftInterval>> = HashMap::new();
    let work = data
        .truck_work_days
        .iter()
        .map(|s| s.to_interval(ShiftSource::Truck))
        .chain(
            data.other_jobs
                .iter()
                .map(|s| s.to_interval(ShiftSource::OtherJob)),
        );
    for interval in work {
        folded
            .entry(interval.sampler_name.to_lowercase())
            .or_default()
            .push(interval);
    }

    let mut pob: HashMap<&str, Vec<PobWindow>> = HashMap::new();
    for nomination in &data.nominations {
        if let Some(name) = nomination.sampler_name() {
            pob.entry(name).or_default().push(pob_window(nomination));
        }
    }

    data.samplers
        .iter()
        .map(|sampler| {
            let mut intervals = exact.get(&sampler.name).cloned().unwrap_or_default();
            if let Some(work) = folded.get(&sampler.name.to_lowercase()) {
                intervals.extend(work.iter().cloned());
            }
            let pob_windows = pob.get(sampler.name.as_str()).cloned().unwrap_or_default();
            let view = build_view(sampler, intervals, pob_windows, week, default_weekly_limit);
            (sampler.name.clone(), view)
        })
        .collect()
}

fn pob_window(nomination: &ShipNomination) -> PobWindow {
    PobWindow {
        vessel_name: nomination.vessel_name.clone(),
        start: nomination.pilot_on_board,
        end: nomination.etc,
    }
}

fn build_view(
    sampler: &Sampler,
    mut intervals: Vec<ShiftInterval>,
    pob_windows: Vec<PobWindow>,
    week: &WeekBounds,
    default_weekly_limit: f64,
) -> SamplerValidationData {
    intervals.sort_by_key(|i| i.start);
    let current_hours = round_hours(
        intervals
            .iter()
            .map(|i| week.clip_hours(i.start, i.end))
            .sum(),
    );
    let limit = sampler.weekly_limit(default_weekly_limit);
    SamplerValidationData {
        sampler_name: sampler.name.clone(),
        weekly: WeeklyHours {
            has_limit: limit.is_some(),
            limit,
            current_hours,
        },
        day_restrictions: sampler.week_day_restrictions,
        has_day_restrictions: sampler.week_day_restrictions.any(),
        schedule_intervals: intervals,
        pob_windows,
    }
}

/// Immutable validation data for one week.
#[derive(Debug, Clone)]
pub struct WeekSnapshot {
    pub key: String,
    pub week: WeekBounds,
    pub exclude_roster_id: Option<String>,
    pub data: WeekData,
    pub per_sampler: HashMap<String, SamplerValidationData>,
}

impl WeekSnapshot {
    pub fn build(
        key: String,
        week: WeekBounds,
        exclude_roster_id: Option<String>,
        data: WeekData,
        default_weekly_limit: f64,
    ) -> Self {
        let per_sampler = calculate_all_validations(&data, &week, default_weekly_limit);
        Self {
            key,
            week,
            exclude_roster_id,
            data,
            per_sampler,
        }
    }

    pub fn sampler(&self, name: &str) -> Option<&SamplerValidationData> {
        self.per_sampler.get(name)
    }
}

impl PartialEq for WeekSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.data == other.data && self.per_sampler == other.per_sampler
    }
}

struct CacheEntry {
    snapshot: Arc<WeekSnapshot>,
    loaded_at: StdInstant,
}

/// TTL cache of [`WeekSnapshot`]s keyed by ISO week.
pub struct ValidationCache {
    repository: Arc<dyn ScheduleRepository>,
    clock: TerminalClock,
    ttl: Duration,
    fetch_margin: chrono::Duration,
    default_weekly_limit: f64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ValidationCache {
    pub fn new(repository: Arc<dyn ScheduleRepository>, config: &SchedulerConfig) -> Self {
        Self {
            repository,
            clock: config.clock(),
            ttl: config.cache_ttl(),
            fetch_margin: config.fetch_margin(),
            default_weekly_limit: config.default_weekly_limit_hours,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &TerminalClock {
        &self.clock
    }

    pub fn repository(&self) -> &dyn ScheduleRepository {
        self.repository.as_ref()
    }

    pub fn default_weekly_limit(&self) -> f64 {
        self.default_weekly_limit
    }

    /// Upstream query window for a week: the week padded by the fetch margin.
    pub fn fetch_window(&self, week: &WeekBounds) -> FetchWindow {
        FetchWindow::new(
            week.week_start - self.fetch_margin,
            week.end_exclusive() + self.fetch_margin,
        )
    }

    /// Week containing `reference` on the terminal clock.
    pub fn week_of(&self, reference: Instant) -> WeekBounds {
        self.clock.work_week_bounds(reference)
    }

    /// Returns the snapshot for `week`, fetching it on a miss or after expiry.
    ///
    /// A hit issues no upstream call at all.
    pub async fn preload_week(
        &self,
        week: WeekBounds,
        exclude_roster_id: Option<&str>,
    ) -> Result<Arc<WeekSnapshot>, RepositoryError> {
        let key = cache_key(&week, exclude_roster_id);
        if let Some(snapshot) = self.fresh(&key) {
            debug!(key = %key, "Validation cache hit");
            return Ok(snapshot);
        }

        debug!(key = %key, "Validation cache miss, fetching week");
        let started = StdInstant::now();
        let window = self.fetch_window(&week);
        let data = match WeekData::fetch(self.repository.as_ref(), window, exclude_roster_id).await
        {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Week preload failed");
                return Err(e);
            }
        };

        let snapshot = Arc::new(WeekSnapshot::build(
            key.clone(),
            week,
            exclude_roster_id.map(str::to_string),
            data,
            self.default_weekly_limit,
        ));
        info!(
            key = %key,
            rosters = snapshot.data.rosters.len(),
            nominations = snapshot.data.nominations.len(),
            samplers = snapshot.per_sampler.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Week snapshot built"
        );

        self.entries.write().insert(
            key,
            CacheEntry {
                snapshot: snapshot.clone(),
                loaded_at: StdInstant::now(),
            },
        );
        Ok(snapshot)
    }

    /// Convenience over [`preload_week`](Self::preload_week) for the week of an instant.
    pub async fn preload_week_of(
        &self,
        reference: Instant,
        exclude_roster_id: Option<&str>,
    ) -> Result<Arc<WeekSnapshot>, RepositoryError> {
        self.preload_week(self.week_of(reference), exclude_roster_id)
            .await
    }

    /// Cached, unexpired snapshot without fetching.
    pub fn cached_week(
        &self,
        week: &WeekBounds,
        exclude_roster_id: Option<&str>,
    ) -> Option<Arc<WeekSnapshot>> {
        self.fresh(&cache_key(week, exclude_roster_id))
    }

    fn fresh(&self, key: &str) -> Option<Arc<WeekSnapshot>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.loaded_at.elapsed() < self.ttl)
            .map(|e| e.snapshot.clone())
    }

    /// Drops every snapshot of `week`, whatever roster they exclude.
    pub fn invalidate_week(&self, week: &WeekBounds) {
        let prefix = week.key();
        self.entries
            .write()
            .retain(|k, _| k != &prefix && !k.starts_with(&format!("{}#", prefix)));
        debug!(week = %prefix, "Week invalidated");
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        info!(dropped, "Validation cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cache_key(week: &WeekBounds, exclude_roster_id: Option<&str>) -> String {
    match exclude_roster_id {
        Some(id) => format!("{}#{}", week.key(), id),
        None => week.key(),
    }
}
