//! Benchmark for cached versus direct validation throughput.
//!
//! Run with: cargo run --release --bin bench

use chrono::Duration;
use sampling_roster::cache::ValidationCache;
use sampling_roster::config::SchedulerConfig;
use sampling_roster::demo_data::{self, DemoData};
use sampling_roster::repository::ScheduleRepository;
use sampling_roster::validation::{
    CachedSource, DirectSource, Proposal, ValidationDataSource, ValidationEngine,
};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data = demo_data::generate(DemoData::Large);
    let config = SchedulerConfig::default();
    let repository: Arc<dyn ScheduleRepository> = Arc::new(data.repository());
    let cache = ValidationCache::new(repository.clone(), &config);
    let engine = ValidationEngine::new(&config);

    println!("Benchmark: Shift Validation");
    println!("  Samplers: {}", data.samplers.len());
    println!("  Rosters: {}", data.rosters.len());
    println!();

    let week = cache.week_of(demo_data::demo_week_start());
    let load_start = Instant::now();
    let snapshot = cache.preload_week(week, None).await?;
    println!("Snapshot built: {} samplers ({:?})", snapshot.per_sampler.len(), load_start.elapsed());
    let cached = CachedSource::new(snapshot);

    let direct = DirectSource::load(
        repository.as_ref(),
        week,
        cache.fetch_window(&week),
        None,
        config.default_weekly_limit_hours,
    )
    .await?;
    println!();

    // Every sampler against every 12h block of the week.
    let names = data.sampler_names();
    let blocks: Vec<_> = (0..14)
        .map(|i| {
            let start = week.week_start + Duration::hours(7 + 12 * i);
            (start, start + Duration::hours(12))
        })
        .collect();

    let sources: [(&str, &dyn ValidationDataSource); 2] = [("cached", &cached), ("direct", &direct)];
    let mut valid_counts = Vec::new();
    for (label, source) in sources {
        let bench_start = Instant::now();
        let mut validations: u64 = 0;
        let mut valid: u64 = 0;
        for (start, end) in &blocks {
            for name in &names {
                let result = engine.validate_sampler_for_turn(source, &Proposal::new(name, *start, *end));
                validations += 1;
                if result.is_valid() {
                    valid += 1;
                }
            }
        }
        let elapsed = bench_start.elapsed();
        println!("Results ({}):", label);
        println!("  Validations: {}", validations);
        println!("  Valid: {}", valid);
        println!("  Time: {:.2?}", elapsed);
        println!("  Validations/sec: {:.0}", validations as f64 / elapsed.as_secs_f64());
        println!();
        valid_counts.push(valid);
    }

    assert_eq!(valid_counts[0], valid_counts[1], "Cached and direct disagree!");
    println!("Cached and direct results agree (verified)");
    Ok(())
}
