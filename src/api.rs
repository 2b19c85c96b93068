//! REST API handlers for the sampling roster.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::ValidationCache;
use crate::calculator::ScheduleCalculator;
use crate::config::SchedulerConfig;
use crate::context::GenerationRegistry;
use crate::demo_data::{self, DemoData, DemoDataSet};
use crate::dto::{GenerateScheduleDto, RecalculateDto, ScheduleDto, SingleTurnDto, ValidateShiftDto};
use crate::error::ScheduleError;
use crate::repository::ScheduleRepository;
use crate::validation::TurnValidation;

/// Application state shared across handlers.
pub struct AppState {
    calculator: ScheduleCalculator,
    /// Rotation ledgers of runs a caller may continue, by generation id.
    registry: GenerationRegistry,
}

impl AppState {
    pub fn new(repository: Arc<dyn ScheduleRepository>, config: SchedulerConfig) -> Self {
        let cache = Arc::new(ValidationCache::new(repository, &config));
        Self {
            registry: GenerationRegistry::new(config.generation_idle_timeout()),
            calculator: ScheduleCalculator::new(cache, config),
        }
    }

    pub fn calculator(&self) -> &ScheduleCalculator {
        &self.calculator
    }

    pub fn registry(&self) -> &GenerationRegistry {
        &self.registry
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for ScheduleError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ScheduleError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalidInput"),
            ScheduleError::InconsistentData(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "inconsistentData")
            }
            ScheduleError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstreamUnavailable"),
        };
        let body = ErrorResponse {
            error,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router and Handlers
// ============================================================================

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{id}", get(get_demo_data))
        // Schedules
        .route("/schedules/generate", post(generate_schedule))
        .route("/schedules/single-turn", post(generate_single_turn))
        .route("/schedules/recalculate", post(recalculate))
        .route("/schedules/validate", post(validate_shift))
        .route("/generations/{id}", delete(discard_generation))
        // Cache
        .route("/cache", delete(clear_cache))
        .with_state(state)
}

// ============================================================================
// Health & Info
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health - Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub cached_weeks: usize,
    pub active_generations: usize,
}

/// GET /info - Application info endpoint.
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Sampling Roster",
        version: env!("CARGO_PKG_VERSION"),
        cached_weeks: state.calculator.cache().len(),
        active_generations: state.registry.len(),
    })
}

/// GET /demo-data - List available demo data sets.
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(demo_data::list_demo_data())
}

/// GET /demo-data/{id} - Get a specific demo data set.
async fn get_demo_data(Path(id): Path<String>) -> Result<Json<DemoDataSet>, StatusCode> {
    match id.parse::<DemoData>() {
        Ok(demo) => Ok(Json(demo_data::generate(demo))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// POST /schedules/generate - Generate line turns after an office shift.
async fn generate_schedule(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<GenerateScheduleDto>,
) -> Result<Json<ScheduleDto>, ScheduleError> {
    let mut ctx = state.registry.check_out(dto.generation_id);
    ctx.set_carry_rotation(dto.continue_rotation);
    let result = state
        .calculator
        .generate_schedule(&mut ctx, &dto.to_request())
        .await;
    state.registry.check_in(ctx);
    Ok(Json(ScheduleDto::from(&result?)))
}

/// POST /schedules/single-turn - One fixed turn at the completion estimate.
async fn generate_single_turn(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<SingleTurnDto>,
) -> Result<Json<ScheduleDto>, ScheduleError> {
    let mut ctx = state.registry.check_out(dto.generation_id);
    ctx.set_carry_rotation(dto.continue_rotation);
    let result = state
        .calculator
        .generate_single_turn(&mut ctx, &dto.to_request())
        .await;
    state.registry.check_in(ctx);
    Ok(Json(ScheduleDto::from(&result?)))
}

/// POST /schedules/recalculate - Rebuild the turns after an edited first turn.
async fn recalculate(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<RecalculateDto>,
) -> Result<Json<ScheduleDto>, ScheduleError> {
    let mut ctx = state.registry.check_out(dto.generation_id);
    ctx.set_carry_rotation(dto.continue_rotation);
    let result = state
        .calculator
        .recalculate_from_edited_first_turn(&mut ctx, &dto.to_request())
        .await;
    state.registry.check_in(ctx);
    Ok(Json(ScheduleDto::from(&result?)))
}

/// POST /schedules/validate - Run every check on a proposed shift.
///
/// Always 200: a shift that cannot be validated comes back rejected.
async fn validate_shift(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<ValidateShiftDto>,
) -> Json<TurnValidation> {
    Json(
        state
            .calculator
            .validate_proposed_shift(&dto.to_proposal())
            .await,
    )
}

/// DELETE /generations/{id} - Drop the rotation ledger of a run.
async fn discard_generation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.registry.discard(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClearedResponse {
    pub dropped_weeks: usize,
}

/// DELETE /cache - Drop every cached week snapshot.
async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<CacheClearedResponse> {
    let cache = state.calculator.cache();
    let dropped_weeks = cache.len();
    cache.clear();
    Json(CacheClearedResponse { dropped_weeks })
}
