pub mod cursor;
pub mod expiry;
pub mod ledger;
pub mod projection;
pub mod registry;

pub use cursor::{ClinicServingCursor, ServingCursor};
pub use expiry::{ClinicClock, ExpiryPolicy, FixedClock, SlotSelectability, SystemClock};
pub use ledger::TokenLedgerService;
pub use projection::QueueProjectionService;
pub use registry::SlotRegistryService;

use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use crate::error::TokenError;
use crate::models::Token;

// Key space, mirroring the day-partitioned layout the clinic's data has
// always used: slots (with their tokens nested underneath) per day, one
// serving-cursor document per day, feedback per day.

pub(crate) fn day_path(day: NaiveDate) -> String {
    format!("token_slots/{}", day)
}

pub(crate) fn slot_path(day: NaiveDate, slot_id: &str) -> String {
    format!("token_slots/{}/{}", day, slot_id)
}

pub(crate) fn tokens_path(day: NaiveDate, slot_id: &str) -> String {
    format!("token_slots/{}/{}/tokens", day, slot_id)
}

pub(crate) fn token_path(day: NaiveDate, slot_id: &str, token_id: Uuid) -> String {
    format!("token_slots/{}/{}/tokens/{}", day, slot_id, token_id)
}

pub(crate) fn cursor_path(day: NaiveDate) -> String {
    format!("clinic_status/{}/current_token", day)
}

pub(crate) fn feedback_path(day: NaiveDate, feedback_id: Uuid) -> String {
    format!("feedback/{}/{}", day, feedback_id)
}

/// Decode the `tokens` subtree of a slot document into a list of tokens.
/// Accepts the subtree being absent (a fresh slot has no tokens child).
pub(crate) fn decode_tokens(value: Option<&Value>) -> Result<Vec<Token>, TokenError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Some(entries) = value.as_object() else {
        return Err(TokenError::DatabaseError(
            "tokens subtree is not an object".to_string(),
        ));
    };
    entries
        .values()
        .map(|entry| {
            serde_json::from_value::<Token>(entry.clone())
                .map_err(|e| TokenError::DatabaseError(format!("Failed to parse token: {}", e)))
        })
        .collect()
}
