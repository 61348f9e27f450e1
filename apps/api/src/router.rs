use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::json;

use shared_config::AppConfig;
use shared_store::{DocumentStore, InMemoryStore};
use token_cell::handlers::AppState;
use token_cell::services::{ClinicClock, SystemClock};

pub fn create_router(config: AppConfig) -> Router {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::with_timeout(
        Duration::from_millis(config.store_timeout_ms),
    ));
    let clock: Arc<dyn ClinicClock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::new(config, store, clock));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", token_cell::create_token_router(state))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "clinic-queue-api"
    }))
}
