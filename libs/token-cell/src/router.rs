use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{
    advance_token_status, call_next, cancel_token, create_slots, current_serving, list_slot_tokens,
    list_slots, queue_projection, request_token, set_starting_token, submit_feedback, AppState,
};

pub fn create_token_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/slots/{day}", post(create_slots).get(list_slots))
        .route(
            "/slots/{day}/{slot_id}/tokens",
            get(list_slot_tokens).post(request_token),
        )
        .route(
            "/slots/{day}/{slot_id}/tokens/{token_id}",
            delete(cancel_token),
        )
        .route(
            "/slots/{day}/{slot_id}/tokens/{token_id}/status",
            post(advance_token_status),
        )
        .route(
            "/slots/{day}/{slot_id}/tokens/{token_id}/feedback",
            post(submit_feedback),
        )
        .route("/serving/{day}", get(current_serving))
        .route("/serving/{day}/start", post(set_starting_token))
        .route("/serving/{day}/next", post(call_next))
        .route("/queue/{day}/{patient_id}", get(queue_projection))
        .with_state(state)
}
