//! DTOs for REST API requests/responses.
//!
//! Shifts cross the wire in the same `{ sampler: { name }, startTime,
//! finishTime, hours }` shape the rosters use, so a generated schedule can be
//! stored as a roster's `lineSampling` without reshaping.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calculator::{
    GeneratedSchedule, RecalculationRequest, ScheduleRequest, ShiftProposal, SingleTurnRequest,
};
use crate::domain::{
    Assignment, OfficeSamplingSlot, SamplerRef, ScheduledTurn, ShiftInterval, ShiftSource,
};
use crate::time_window::{hours_between, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeSamplingDto {
    pub sampler: SamplerRef,
    pub start_time: Instant,
    pub finish_time: Instant,
    /// Derived from the times when omitted.
    #[serde(default)]
    pub hours: Option<f64>,
}

impl OfficeSamplingDto {
    pub fn to_slot(&self) -> OfficeSamplingSlot {
        OfficeSamplingSlot {
            sampler_name: self.sampler.name.clone(),
            start: self.start_time,
            end: self.finish_time,
            hours: self
                .hours
                .unwrap_or_else(|| hours_between(self.start_time, self.finish_time)),
        }
    }
}

impl From<&OfficeSamplingSlot> for OfficeSamplingDto {
    fn from(slot: &OfficeSamplingSlot) -> Self {
        Self {
            sampler: SamplerRef {
                name: slot.sampler_name.clone(),
            },
            start_time: slot.start,
            finish_time: slot.end,
            hours: Some(slot.hours),
        }
    }
}

/// A line-sampling turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnDto {
    pub sampler: SamplerRef,
    pub start_time: Instant,
    pub finish_time: Instant,
    #[serde(default)]
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

impl From<&ScheduledTurn> for TurnDto {
    fn from(turn: &ScheduledTurn) -> Self {
        Self {
            sampler: SamplerRef {
                name: turn.sampler_name.clone(),
            },
            start_time: turn.start,
            finish_time: turn.end,
            hours: turn.hours,
            assignment: Some(turn.assignment),
        }
    }
}

impl TurnDto {
    pub fn to_turn(&self) -> ScheduledTurn {
        ScheduledTurn::new(
            self.sampler.name.as_str(),
            self.start_time,
            self.finish_time,
            self.assignment.unwrap_or(Assignment::ManualEdit),
        )
    }

    pub fn to_interval(&self) -> ShiftInterval {
        ShiftInterval::new(
            self.sampler.name.as_str(),
            self.start_time,
            self.finish_time,
            ShiftSource::Line,
        )
    }
}

/// Body of `POST /schedules/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateScheduleDto {
    /// Id of an earlier run to reuse.
    #[serde(default)]
    pub generation_id: Option<Uuid>,
    /// Score rotation against that run's assignments too.
    #[serde(default)]
    pub continue_rotation: bool,
    pub office_sampling: OfficeSamplingDto,
    pub total_discharge_hours: u32,
    pub samplers: Vec<String>,
    #[serde(default)]
    pub roster_id: Option<String>,
    #[serde(default)]
    pub vessel_name: Option<String>,
}

impl GenerateScheduleDto {
    pub fn to_request(&self) -> ScheduleRequest {
        ScheduleRequest {
            office: self.office_sampling.to_slot(),
            total_hours: self.total_discharge_hours,
            samplers: self.samplers.clone(),
            roster_id: self.roster_id.clone(),
            vessel_name: self.vessel_name.clone(),
        }
    }
}

/// Body of `POST /schedules/single-turn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleTurnDto {
    #[serde(default)]
    pub generation_id: Option<Uuid>,
    #[serde(default)]
    pub continue_rotation: bool,
    pub etc: Instant,
    pub samplers: Vec<String>,
    #[serde(default)]
    pub office_sampling: Option<OfficeSamplingDto>,
    #[serde(default)]
    pub roster_id: Option<String>,
    #[serde(default)]
    pub vessel_name: Option<String>,
}

impl SingleTurnDto {
    pub fn to_request(&self) -> SingleTurnRequest {
        SingleTurnRequest {
            etc: self.etc,
            samplers: self.samplers.clone(),
            office: self.office_sampling.as_ref().map(OfficeSamplingDto::to_slot),
            roster_id: self.roster_id.clone(),
            vessel_name: self.vessel_name.clone(),
        }
    }
}

/// Body of `POST /schedules/recalculate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateDto {
    #[serde(default)]
    pub generation_id: Option<Uuid>,
    #[serde(default)]
    pub continue_rotation: bool,
    pub edited_first_turn: TurnDto,
    pub etc: Instant,
    pub samplers: Vec<String>,
    #[serde(default)]
    pub office_sampling: Option<OfficeSamplingDto>,
    #[serde(default)]
    pub roster_id: Option<String>,
    #[serde(default)]
    pub vessel_name: Option<String>,
}

impl RecalculateDto {
    pub fn to_request(&self) -> RecalculationRequest {
        RecalculationRequest {
            edited_first_turn: self.edited_first_turn.to_turn(),
            etc: self.etc,
            samplers: self.samplers.clone(),
            office: self.office_sampling.as_ref().map(OfficeSamplingDto::to_slot),
            roster_id: self.roster_id.clone(),
            vessel_name: self.vessel_name.clone(),
        }
    }
}

/// Body of `POST /schedules/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateShiftDto {
    pub sampler_name: String,
    pub start_time: Instant,
    pub finish_time: Instant,
    /// Turns of the schedule being edited that are not saved yet.
    #[serde(default)]
    pub line_sampling: Vec<TurnDto>,
    #[serde(default)]
    pub office_sampling: Option<OfficeSamplingDto>,
    #[serde(default)]
    pub roster_id: Option<String>,
    #[serde(default)]
    pub vessel_name: Option<String>,
}

impl ValidateShiftDto {
    pub fn to_proposal(&self) -> ShiftProposal {
        ShiftProposal {
            sampler_name: self.sampler_name.clone(),
            start: self.start_time,
            end: self.finish_time,
            turns_in_memory: self.line_sampling.iter().map(TurnDto::to_interval).collect(),
            office: self.office_sampling.as_ref().map(OfficeSamplingDto::to_slot),
            roster_id: self.roster_id.clone(),
            vessel_name: self.vessel_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDto {
    pub generation_id: Uuid,
    pub line_sampling: Vec<TurnDto>,
    pub total_hours: f64,
    pub unassigned_hours: f64,
    pub complete: bool,
    pub degraded: bool,
}

impl From<&GeneratedSchedule> for ScheduleDto {
    fn from(schedule: &GeneratedSchedule) -> Self {
        Self {
            generation_id: schedule.generation_id,
            line_sampling: schedule.turns.iter().map(TurnDto::from).collect(),
            total_hours: schedule.total_hours,
            unassigned_hours: schedule.unassigned_hours,
            complete: schedule.is_complete(),
            degraded: schedule.degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_generate_body_shape() {
        let json = r#"{
            "officeSampling": {
                "sampler": { "name": "Amy Cole" },
                "startTime": "2025-01-06T03:00:00Z",
                "finishTime": "2025-01-06T09:00:00Z"
            },
            "totalDischargeHours": 12,
            "samplers": ["Amy Cole", "Beth Fox"],
            "rosterId": "r-17"
        }"#;
        let dto: GenerateScheduleDto = serde_json::from_str(json).unwrap();
        let request = dto.to_request();
        assert_eq!(request.office.hours, 6.0);
        assert_eq!(request.total_hours, 12);
        assert_eq!(request.roster_id.as_deref(), Some("r-17"));
        assert_eq!(dto.generation_id, None);
    }

    #[test]
    fn test_turn_serializes_as_line_sampling() {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 6, 19, 0, 0).unwrap();
        let turn = ScheduledTurn::new("Amy Cole", start, end, Assignment::Fallback);
        let value = serde_json::to_value(TurnDto::from(&turn)).unwrap();
        assert_eq!(value["sampler"]["name"], "Amy Cole");
        assert_eq!(value["hours"], 10.0);
        assert_eq!(value["assignment"], "fallback");
        assert_eq!(value["finishTime"], "2025-01-06T19:00:00Z");
    }

    #[test]
    fn test_edited_turn_defaults_to_manual() {
        let json = r#"{
            "sampler": { "name": "Amy Cole" },
            "startTime": "2025-01-06T09:00:00Z",
            "finishTime": "2025-01-06T15:00:00Z"
        }"#;
        let dto: TurnDto = serde_json::from_str(json).unwrap();
        let turn = dto.to_turn();
        assert_eq!(turn.assignment, Assignment::ManualEdit);
        assert_eq!(turn.hours, 6.0);
    }
}
