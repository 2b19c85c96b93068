//! Demo data generators for the sampling roster.
//!
//! Builds one week of port activity (samplers, rosters with office and line
//! sampling, ship nominations, truck work days and other jobs) from a fixed
//! seed, plus a ready-to-post schedule request for a new vessel.

use chrono::{Duration, TimeZone, Utc, Weekday};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::domain::{
    RosterRecord, Sampler, SamplerRef, SamplingAssignment, ShipNomination, WorkDayShift,
};
use crate::dto::{GenerateScheduleDto, OfficeSamplingDto};
use crate::repository::InMemoryRepository;
use crate::time_window::{Instant, TerminalClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Small,
    Large,
}

impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SMALL" => Ok(DemoData::Small),
            "LARGE" => Ok(DemoData::Large),
            _ => Err(()),
        }
    }
}

impl DemoData {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
        }
    }

    fn parameters(&self) -> DemoDataParameters {
        match self {
            DemoData::Small => DemoDataParameters {
                sampler_count: 8,
                vessel_count: 4,
                weekly_restriction_share: 0.4,
                restricted_day_distribution: vec![(0, 6.0), (1, 3.0), (2, 1.0)],
                line_turn_distribution: vec![(1, 2.0), (2, 2.0), (3, 1.0)],
                truck_day_count: 4,
                other_job_count: 2,
            },
            DemoData::Large => DemoDataParameters {
                sampler_count: 40,
                vessel_count: 24,
                weekly_restriction_share: 0.5,
                restricted_day_distribution: vec![(0, 5.0), (1, 3.0), (2, 2.0)],
                line_turn_distribution: vec![(1, 1.0), (2, 3.0), (3, 3.0), (4, 1.0)],
                truck_day_count: 30,
                other_job_count: 15,
            },
        }
    }
}

struct DemoDataParameters {
    sampler_count: usize,
    vessel_count: usize,
    weekly_restriction_share: f64,
    restricted_day_distribution: Vec<(usize, f64)>,
    line_turn_distribution: Vec<(usize, f64)>,
    truck_day_count: usize,
    other_job_count: usize,
}

/// One generated week of upstream data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoDataSet {
    pub samplers: Vec<Sampler>,
    pub rosters: Vec<RosterRecord>,
    pub nominations: Vec<ShipNomination>,
    pub truck_work_days: Vec<WorkDayShift>,
    pub other_jobs: Vec<WorkDayShift>,
    /// A schedule request for a vessel that has no roster yet.
    pub request: GenerateScheduleDto,
}

impl DemoDataSet {
    /// An in-memory repository serving this data set.
    pub fn repository(&self) -> InMemoryRepository {
        InMemoryRepository::new()
            .with_samplers(self.samplers.clone())
            .with_rosters(self.rosters.clone())
            .with_nominations(self.nominations.clone())
            .with_truck_work_days(self.truck_work_days.clone())
            .with_other_jobs(self.other_jobs.clone())
    }

    pub fn sampler_names(&self) -> Vec<String> {
        self.samplers.iter().map(|s| s.name.clone()).collect()
    }
}

/// List of available demo data sets.
pub fn list_demo_data() -> Vec<&'static str> {
    vec!["SMALL", "LARGE"]
}

/// Monday 00:00 UTC of the demo week.
pub fn demo_week_start() -> Instant {
    Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Generates the demo week for the given size.
pub fn generate(demo: DemoData) -> DemoDataSet {
    let params = demo.parameters();
    let mut rng = StdRng::seed_from_u64(0);
    let clock = TerminalClock::utc();
    let week_start = demo_week_start();

    let names = generate_name_permutations(&mut rng);
    let samplers: Vec<Sampler> = names
        .iter()
        .take(params.sampler_count)
        .map(|name| {
            let mut sampler = Sampler::new(name.as_str());
            if rng.gen_bool(params.weekly_restriction_share) {
                sampler = sampler.with_weekly_restriction();
            }
            let restricted = pick_count(&mut rng, &params.restricted_day_distribution);
            for day in WEEKDAYS.choose_multiple(&mut rng, restricted) {
                sampler = sampler.with_restricted_day(*day);
            }
            sampler
        })
        .collect();

    let mut rosters = Vec::with_capacity(params.vessel_count);
    let mut nominations = Vec::with_capacity(params.vessel_count);
    for index in 0..params.vessel_count {
        let vessel_name = format!(
            "{} {}",
            VESSEL_NAMES[index % VESSEL_NAMES.len()],
            index / VESSEL_NAMES.len() + 1
        );
        let day = rng.gen_range(0..6);
        let hour = *OFFICE_START_HOURS.choose(&mut rng).unwrap_or(&3);
        let office_start = week_start + Duration::days(day) + Duration::hours(hour);
        let office_end = office_start + Duration::hours(6);
        let office_sampler = pick_sampler(&mut rng, &samplers);

        // Line turns run boundary to boundary after the office shift.
        let mut line_sampling = Vec::new();
        let mut cursor = office_end;
        for _ in 0..pick_count(&mut rng, &params.line_turn_distribution) {
            let end = clock.next_block_boundary(cursor);
            line_sampling.push(SamplingAssignment::new(
                pick_sampler(&mut rng, &samplers),
                cursor,
                end,
            ));
            cursor = end;
        }

        nominations.push(ShipNomination {
            vessel_name: vessel_name.clone(),
            sampler: Some(SamplerRef {
                name: office_sampler.clone(),
            }),
            pilot_on_board: office_start - Duration::hours(2),
            etc: cursor,
        });
        rosters.push(RosterRecord {
            id: format!("roster-{}", index + 1),
            vessel_name,
            office_sampling: Some(SamplingAssignment::new(
                office_sampler,
                office_start,
                office_end,
            )),
            line_sampling,
        });
    }

    // Names from the other subsystems come in varying case.
    let truck_work_days = (0..params.truck_day_count)
        .map(|_| {
            let start = week_start + Duration::days(rng.gen_range(0..7)) + Duration::hours(7);
            WorkDayShift::new(
                pick_sampler(&mut rng, &samplers).to_lowercase(),
                start,
                start + Duration::hours(8),
            )
        })
        .collect();
    let other_jobs = (0..params.other_job_count)
        .map(|_| {
            let start = week_start + Duration::days(rng.gen_range(0..7)) + Duration::hours(8);
            WorkDayShift::new(
                pick_sampler(&mut rng, &samplers).to_uppercase(),
                start,
                start + Duration::hours(4),
            )
        })
        .collect();

    let office_start = week_start + Duration::days(2) + Duration::hours(3);
    let request = GenerateScheduleDto {
        generation_id: None,
        continue_rotation: false,
        office_sampling: OfficeSamplingDto {
            sampler: SamplerRef {
                name: pick_sampler(&mut rng, &samplers),
            },
            start_time: office_start,
            finish_time: office_start + Duration::hours(6),
            hours: Some(6.0),
        },
        total_discharge_hours: 36,
        samplers: samplers.iter().map(|s| s.name.clone()).collect(),
        roster_id: None,
        vessel_name: Some("MT Demo Star".to_string()),
    };

    DemoDataSet {
        samplers,
        rosters,
        nominations,
        truck_work_days,
        other_jobs,
        request,
    }
}

fn pick_sampler(rng: &mut StdRng, samplers: &[Sampler]) -> String {
    samplers
        .choose(rng)
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

/// Pick a count based on weighted distribution.
fn pick_count(rng: &mut StdRng, distribution: &[(usize, f64)]) -> usize {
    let total_weight: f64 = distribution.iter().map(|(_, w)| w).sum();
    let mut choice = rng.gen::<f64>() * total_weight;

    for (count, weight) in distribution {
        if choice < *weight {
            return *count;
        }
        choice -= weight;
    }
    distribution.last().map(|(c, _)| *c).unwrap_or(1)
}

const WEEKDAYS: &[Weekday] = &[
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const OFFICE_START_HOURS: &[i64] = &[1, 3, 5, 13, 15];

const VESSEL_NAMES: &[&str] = &[
    "MT Aurora",
    "MV Kestrel",
    "MT Polar Dawn",
    "MV Sea Harmony",
    "MT Coral Bay",
    "MV Atlantic Star",
    "MT Gulf Pioneer",
    "MV Baltic Wind",
];

const FIRST_NAMES: &[&str] = &[
    "Amy", "Beth", "Carl", "Dan", "Elsa", "Flo", "Gus", "Hugo", "Ivy", "Jay",
];
const LAST_NAMES: &[&str] = &[
    "Cole", "Fox", "Green", "Jones", "King", "Li", "Poe", "Rye", "Smith", "Watt",
];

fn generate_name_permutations(rng: &mut StdRng) -> Vec<String> {
    let mut names = Vec::with_capacity(FIRST_NAMES.len() * LAST_NAMES.len());
    for first in FIRST_NAMES {
        for last in LAST_NAMES {
            names.push(format!("{} {}", first, last));
        }
    }
    names.shuffle(rng);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FetchWindow, ScheduleRepository};

    #[test]
    fn test_generate_small() {
        let data = generate(DemoData::Small);
        assert_eq!(data.samplers.len(), 8);
        assert_eq!(data.rosters.len(), 4);
        assert_eq!(data.nominations.len(), 4);
        assert_eq!(data.truck_work_days.len(), 4);
        assert_eq!(data.request.samplers.len(), 8);
    }

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(
            generate(DemoData::Large).rosters,
            generate(DemoData::Large).rosters
        );
    }

    #[test]
    fn test_line_turns_are_contiguous() {
        let data = generate(DemoData::Large);
        for roster in &data.rosters {
            let mut previous = roster.office_sampling.as_ref().map(|o| o.finish_time);
            for turn in &roster.line_sampling {
                assert_eq!(Some(turn.start_time), previous);
                assert!(turn.hours > 0.0 && turn.hours <= 12.0);
                previous = Some(turn.finish_time);
            }
        }
    }

    #[test]
    fn test_work_day_names_vary_in_case() {
        let data = generate(DemoData::Small);
        assert!(data
            .truck_work_days
            .iter()
            .all(|t| t.sampler_name == t.sampler_name.to_lowercase()));
        assert!(data
            .other_jobs
            .iter()
            .all(|t| t.sampler_name == t.sampler_name.to_uppercase()));
    }

    #[test]
    fn test_demo_data_from_str() {
        assert_eq!("SMALL".parse::<DemoData>(), Ok(DemoData::Small));
        assert_eq!("large".parse::<DemoData>(), Ok(DemoData::Large));
        assert!("invalid".parse::<DemoData>().is_err());
    }

    #[tokio::test]
    async fn test_repository_serves_the_week() {
        let data = generate(DemoData::Small);
        let repo = data.repository();
        let start = demo_week_start();
        let window = FetchWindow::new(start, start + Duration::days(7));
        let rosters = repo.active_rosters(window, None).await.unwrap();
        assert_eq!(rosters.len(), data.rosters.len());
        assert_eq!(repo.samplers().await.unwrap().len(), 8);
    }
}
