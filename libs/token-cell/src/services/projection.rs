// libs/token-cell/src/services/projection.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_store::DocumentStore;

use crate::error::TokenError;
use crate::models::{QueueView, Token, TurnStatus};
use crate::services::cursor::ServingCursor;
use crate::services::{day_path, decode_tokens};

/// Answers "where do I stand" for a patient: position, patients ahead, and
/// ETA, derived from ledger and cursor snapshots. Pure reads, no mutation.
pub struct QueueProjectionService {
    store: Arc<dyn DocumentStore>,
    cursor: Arc<dyn ServingCursor>,
    interval_minutes: u32,
}

impl QueueProjectionService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        cursor: Arc<dyn ServingCursor>,
    ) -> Self {
        Self {
            store,
            cursor,
            interval_minutes: config.token_interval_minutes,
        }
    }

    /// Locate the patient's live token across the day's slots and project
    /// their queue standing. `None` when they hold no live token today.
    pub async fn project_for_patient(
        &self,
        day: NaiveDate,
        patient_id: Uuid,
    ) -> Result<Option<QueueView>, TokenError> {
        let Some(found) = self.find_live_token(day, patient_id).await? else {
            return Ok(None);
        };
        let (slot_id, slot_name, token, slot_tokens) = found;

        let live: Vec<&Token> = slot_tokens.iter().filter(|t| t.is_live()).collect();
        let patients_ahead = live
            .iter()
            .filter(|t| t.token_number < token.token_number)
            .count() as u32;
        let patients_waiting = live.len() as u32;

        let turn = match self.cursor.current(day).await? {
            None => TurnStatus::NotStarted,
            Some(cursor) if token.token_number > cursor.number => TurnStatus::Waiting {
                eta_minutes: (token.token_number - cursor.number) * self.interval_minutes,
            },
            Some(cursor) if token.token_number == cursor.number => TurnStatus::YourTurnNow,
            Some(_) => TurnStatus::Completed,
        };

        debug!(
            "Queue projection for patient {} on {}: token #{} in {}, {} ahead, turn {:?}",
            patient_id, day, token.token_number, slot_id, patients_ahead, turn
        );

        Ok(Some(QueueView {
            position: patients_ahead + 1,
            patients_ahead,
            patients_waiting,
            slot_id,
            slot_name,
            token,
            turn,
        }))
    }

    async fn find_live_token(
        &self,
        day: NaiveDate,
        patient_id: Uuid,
    ) -> Result<Option<(String, String, Token, Vec<Token>)>, TokenError> {
        let Some(value) = self.store.get(&day_path(day)).await? else {
            return Ok(None);
        };
        let Some(entries) = value.as_object() else {
            return Err(TokenError::DatabaseError(format!(
                "day document for {} is not an object",
                day
            )));
        };

        for (slot_id, slot_value) in entries {
            let tokens = decode_tokens(slot_value.get("tokens"))?;
            let Some(token) = tokens
                .iter()
                .find(|t| t.patient_id == patient_id && t.is_live())
                .cloned()
            else {
                continue;
            };
            let slot_name = slot_value
                .get("name")
                .and_then(|name| name.as_str())
                .unwrap_or_default()
                .to_string();
            return Ok(Some((slot_id.clone(), slot_name, token, tokens)));
        }

        Ok(None)
    }
}
