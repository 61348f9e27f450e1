// libs/token-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::AppError;
use shared_store::DocumentStore;

use crate::models::{
    AdvanceStatusPayload, CallNextPayload, CreateSlotsPayload, FeedbackPayload,
    RequestTokenPayload, SlotDefinition, StartingTokenPayload,
};
use crate::services::{
    ClinicClock, ClinicServingCursor, ExpiryPolicy, QueueProjectionService, ServingCursor,
    SlotRegistryService, TokenLedgerService,
};

/// All queue state is reached through these services; nothing else writes to
/// the store, which is what keeps the slot invariants enforceable.
pub struct AppState {
    pub config: AppConfig,
    pub registry: SlotRegistryService,
    pub ledger: TokenLedgerService,
    pub cursor: Arc<dyn ServingCursor>,
    pub projection: QueueProjectionService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn ClinicClock>,
    ) -> Self {
        let policy = ExpiryPolicy::new(clock);
        let cursor: Arc<dyn ServingCursor> =
            Arc::new(ClinicServingCursor::new(Arc::clone(&store)));
        Self {
            registry: SlotRegistryService::new(Arc::clone(&store), policy.clone()),
            ledger: TokenLedgerService::new(&config, Arc::clone(&store), policy),
            projection: QueueProjectionService::new(&config, Arc::clone(&store), Arc::clone(&cursor)),
            cursor,
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    pub patient_id: Option<Uuid>,
}

/// Create the day's slots (staff). Idempotent: slots already present are
/// left untouched so mid-day counters survive a repeat call.
pub async fn create_slots(
    State(state): State<Arc<AppState>>,
    Path(day): Path<NaiveDate>,
    Json(payload): Json<CreateSlotsPayload>,
) -> Result<Json<Value>, AppError> {
    let definitions = payload
        .definitions
        .unwrap_or_else(SlotDefinition::default_daily);
    let outcome = state.registry.create_daily_slots(day, &definitions).await?;

    Ok(Json(json!({
        "success": true,
        "created": outcome.created,
        "skipped": outcome.skipped
    })))
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Path(day): Path<NaiveDate>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state.registry.get_slots(day, query.patient_id).await?;
    Ok(Json(json!({ "slots": slots })))
}

pub async fn list_slot_tokens(
    State(state): State<Arc<AppState>>,
    Path((day, slot_id)): Path<(NaiveDate, String)>,
) -> Result<Json<Value>, AppError> {
    let tokens = state.ledger.get_slot_tokens(day, &slot_id).await?;
    Ok(Json(json!({ "tokens": tokens })))
}

pub async fn request_token(
    State(state): State<Arc<AppState>>,
    Path((day, slot_id)): Path<(NaiveDate, String)>,
    Json(payload): Json<RequestTokenPayload>,
) -> Result<Json<Value>, AppError> {
    info!(
        "Token request from patient {} for slot {} on {}",
        payload.patient_id, slot_id, day
    );
    let token = state.ledger.request_token(day, &slot_id, payload).await?;

    Ok(Json(json!({
        "success": true,
        "token": token
    })))
}

pub async fn cancel_token(
    State(state): State<Arc<AppState>>,
    Path((day, slot_id, token_id)): Path<(NaiveDate, String, Uuid)>,
) -> Result<Json<Value>, AppError> {
    state.ledger.cancel_token(day, &slot_id, token_id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn advance_token_status(
    State(state): State<Arc<AppState>>,
    Path((day, slot_id, token_id)): Path<(NaiveDate, String, Uuid)>,
    Json(payload): Json<AdvanceStatusPayload>,
) -> Result<Json<Value>, AppError> {
    let token = state
        .ledger
        .advance_status(day, &slot_id, token_id, payload.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "token": token
    })))
}

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path((day, slot_id, token_id)): Path<(NaiveDate, String, Uuid)>,
    Json(payload): Json<FeedbackPayload>,
) -> Result<Json<Value>, AppError> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    let feedback = state
        .ledger
        .submit_feedback(day, &slot_id, token_id, payload)
        .await?;

    Ok(Json(json!({
        "success": true,
        "feedback": feedback
    })))
}

pub async fn current_serving(
    State(state): State<Arc<AppState>>,
    Path(day): Path<NaiveDate>,
) -> Result<Json<Value>, AppError> {
    let record = state.cursor.current(day).await?;
    Ok(Json(json!({ "current": record })))
}

pub async fn set_starting_token(
    State(state): State<Arc<AppState>>,
    Path(day): Path<NaiveDate>,
    Json(payload): Json<StartingTokenPayload>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .cursor
        .set_starting_token(day, payload.number, &payload.slot_name)
        .await?;

    Ok(Json(json!({
        "success": true,
        "current": record
    })))
}

pub async fn call_next(
    State(state): State<Arc<AppState>>,
    Path(day): Path<NaiveDate>,
    Json(payload): Json<CallNextPayload>,
) -> Result<Json<Value>, AppError> {
    let record = state.cursor.call_next(day, payload.cursor_type).await?;

    Ok(Json(json!({
        "success": true,
        "current": record
    })))
}

pub async fn queue_projection(
    State(state): State<Arc<AppState>>,
    Path((day, patient_id)): Path<(NaiveDate, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let view = state.projection.project_for_patient(day, patient_id).await?;
    Ok(Json(json!({ "queue": view })))
}
