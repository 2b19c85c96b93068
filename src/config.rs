//! Scheduler configuration: business rules plus runtime knobs.
//!
//! Every field has a default, so a partial source (environment, JSON body)
//! only overrides what it names. Keys are snake_case in every source.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::time_window::{TerminalClock, DEFAULT_BLOCK_HOURS};

/// Environment variable prefix, e.g. `ROSTER__MIN_REST_HOURS=11`.
pub const ENV_PREFIX: &str = "ROSTER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum gap between two shifts of the same sampler.
    pub min_rest_hours: f64,
    /// Longest single turn.
    pub max_hours_per_shift: u32,
    /// Longest working day; gates the office continuation and the fallback rule.
    pub max_hours_per_day: f64,
    /// Weekly cap for samplers flagged `weeklyRestriction` without an override.
    pub default_weekly_limit_hours: f64,
    /// Local shift-change hours.
    pub block_hours: Vec<u32>,
    /// Offset of the terminal's wall clock from UTC.
    pub utc_offset_minutes: i32,
    pub cache_ttl_secs: u64,
    /// Padding around the week when fetching intervals, so rest checks see
    /// shifts just across the week edge.
    pub fetch_margin_hours: i64,
    /// Duration of the special-case single turn.
    pub single_turn_hours: u32,
    /// How many recent assignments count as "just worked" for rotation.
    pub rotation_window: usize,
    /// At or below this many hours a recalculation collapses to one turn.
    pub recalc_single_turn_threshold_hours: f64,
    /// Whether the relaxed same-day rule may assign a turn nobody passes.
    pub allow_fallback_assignment: bool,
    pub generation_idle_timeout_secs: u64,
    pub bind_addr: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_rest_hours: 10.0,
            max_hours_per_shift: 12,
            max_hours_per_day: 12.0,
            default_weekly_limit_hours: 24.0,
            block_hours: DEFAULT_BLOCK_HOURS.to_vec(),
            utc_offset_minutes: 0,
            cache_ttl_secs: 300,
            fetch_margin_hours: 24,
            single_turn_hours: 4,
            rotation_window: 3,
            recalc_single_turn_threshold_hours: 4.0,
            allow_fallback_assignment: true,
            generation_idle_timeout_secs: 1800,
            bind_addr: "0.0.0.0:7860".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Defaults overlaid with `ROSTER__*` environment variables.
    ///
    /// Lists use commas: `ROSTER__BLOCK_HOURS=6,18`.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("block_hours"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn clock(&self) -> TerminalClock {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| TerminalClock::utc().offset());
        TerminalClock::new(offset, &self.block_hours)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn generation_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_idle_timeout_secs)
    }

    pub fn fetch_margin(&self) -> chrono::Duration {
        chrono::Duration::hours(self.fetch_margin_hours.max(0))
    }
}
