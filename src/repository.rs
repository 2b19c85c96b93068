//! Read access to the upstream collaborators.
//!
//! Storage lives outside this crate; [`ScheduleRepository`] is the seam the
//! validation cache fetches through. [`InMemoryRepository`] backs the demo
//! server and the tests, and counts fetches so cache behaviour is observable.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::domain::{RosterRecord, Sampler, ShipNomination, WorkDayShift};
use crate::error::RepositoryError;
use crate::time_window::{intervals_overlap, Instant};

/// Half-open time range used to scope upstream queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: Instant,
    pub end: Instant,
}

impl FetchWindow {
    pub fn new(start: Instant, end: Instant) -> Self {
        Self { start, end }
    }

    pub fn intersects(&self, start: Instant, end: Instant) -> bool {
        intervals_overlap(self.start, self.end, start, end)
    }
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Rosters with at least one shift inside `window`, minus the excluded one.
    async fn active_rosters(
        &self,
        window: FetchWindow,
        exclude_roster_id: Option<&str>,
    ) -> Result<Vec<RosterRecord>, RepositoryError>;

    /// Nominations whose pilot-on-board to ETC span intersects `window`.
    async fn ship_nominations(
        &self,
        window: FetchWindow,
    ) -> Result<Vec<ShipNomination>, RepositoryError>;

    async fn samplers(&self) -> Result<Vec<Sampler>, RepositoryError>;

    async fn truck_work_days(
        &self,
        window: FetchWindow,
    ) -> Result<Vec<WorkDayShift>, RepositoryError>;

    async fn other_jobs(&self, window: FetchWindow)
        -> Result<Vec<WorkDayShift>, RepositoryError>;
}

#[derive(Debug, Default, Clone)]
struct Store {
    samplers: Vec<Sampler>,
    rosters: Vec<RosterRecord>,
    nominations: Vec<ShipNomination>,
    truck_work_days: Vec<WorkDayShift>,
    other_jobs: Vec<WorkDayShift>,
}

/// Repository over in-process vectors.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
    fetches: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samplers(self, samplers: Vec<Sampler>) -> Self {
        self.store.write().samplers = samplers;
        self
    }

    pub fn with_rosters(self, rosters: Vec<RosterRecord>) -> Self {
        self.store.write().rosters = rosters;
        self
    }

    pub fn with_nominations(self, nominations: Vec<ShipNomination>) -> Self {
        self.store.write().nominations = nominations;
        self
    }

    pub fn with_truck_work_days(self, shifts: Vec<WorkDayShift>) -> Self {
        self.store.write().truck_work_days = shifts;
        self
    }

    pub fn with_other_jobs(self, shifts: Vec<WorkDayShift>) -> Self {
        self.store.write().other_jobs = shifts;
        self
    }

    /// Inserts or replaces a roster by id.
    pub fn upsert_roster(&self, roster: RosterRecord) {
        let mut store = self.store.write();
        match store.rosters.iter_mut().find(|r| r.id == roster.id) {
            Some(existing) => *existing = roster,
            None => store.rosters.push(roster),
        }
    }

    pub fn add_sampler(&self, sampler: Sampler) {
        self.store.write().samplers.push(sampler);
    }

    /// Total number of fetch calls served (or refused) so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Makes every subsequent fetch fail, simulating an upstream outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn begin(&self, source_name: &'static str) -> Result<(), RepositoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::unavailable(source_name, "repository offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryRepository {
    async fn active_rosters(
        &self,
        window: FetchWindow,
        exclude_roster_id: Option<&str>,
    ) -> Result<Vec<RosterRecord>, RepositoryError> {
        self.begin("rosters")?;
        let store = self.store.read();
        Ok(store
            .rosters
            .iter()
            .filter(|r| exclude_roster_id != Some(r.id.as_str()))
            .filter(|r| r.intervals().any(|i| window.intersects(i.start, i.end)))
            .cloned()
            .collect())
    }

    async fn ship_nominations(
        &self,
        window: FetchWindow,
    ) -> Result<Vec<ShipNomination>, RepositoryError> {
        self.begin("ship nominations")?;
        let store = self.store.read();
        Ok(store
            .nominations
            .iter()
            .filter(|n| window.intersects(n.pilot_on_board, n.etc))
            .cloned()
            .collect())
    }

    async fn samplers(&self) -> Result<Vec<Sampler>, RepositoryError> {
        self.begin("samplers")?;
        Ok(self.store.read().samplers.clone())
    }

    async fn truck_work_days(
        &self,
        window: FetchWindow,
    ) -> Result<Vec<WorkDayShift>, RepositoryError> {
        self.begin("truck work days")?;
        let store = self.store.read();
        Ok(filter_work_days(&store.truck_work_days, window))
    }

    async fn other_jobs(
        &self,
        window: FetchWindow,
    ) -> Result<Vec<WorkDayShift>, RepositoryError> {
        self.begin("other jobs")?;
        let store = self.store.read();
        Ok(filter_work_days(&store.other_jobs, window))
    }
}

fn filter_work_days(shifts: &[WorkDayShift], window: FetchWindow) -> Vec<WorkDayShift> {
    shifts
        .iter()
        .filter(|s| window.intersects(s.shift.start_time, s.shift.end_time))
        .cloned()
        .collect()
}
