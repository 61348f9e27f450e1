// libs/token-cell/src/services/registry.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info};

use shared_store::DocumentStore;

use crate::error::TokenError;
use crate::models::{CreateSlotsOutcome, Slot, SlotDefinition, SlotSummary};
use crate::services::expiry::ExpiryPolicy;
use crate::services::{day_path, decode_tokens, slot_path};
use uuid::Uuid;

/// Creates and reads the day's time slots.
///
/// Creation is create-if-absent, never overwrite: calling it twice on the
/// same day must not reset counters a morning of issuance already moved.
/// Slots are retired by the day rolling over, never deleted.
pub struct SlotRegistryService {
    store: Arc<dyn DocumentStore>,
    policy: ExpiryPolicy,
}

impl SlotRegistryService {
    pub fn new(store: Arc<dyn DocumentStore>, policy: ExpiryPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn create_daily_slots(
        &self,
        day: NaiveDate,
        definitions: &[SlotDefinition],
    ) -> Result<CreateSlotsOutcome, TokenError> {
        let mut created = 0;
        let mut skipped = 0;

        for (index, definition) in definitions.iter().enumerate() {
            let slot_id = format!("slot{}", index + 1);
            let path = slot_path(day, &slot_id);

            if self.store.get(&path).await?.is_some() {
                debug!("Slot {} already exists for {}, leaving it untouched", slot_id, day);
                skipped += 1;
                continue;
            }

            let slot = Slot {
                name: definition.name.clone(),
                start_time: definition.start_time,
                end_time: definition.end_time,
                allocated: definition.allocated,
                available: definition.allocated,
                used: 0,
                created_at: Utc::now(),
            };
            let document = serde_json::to_value(&slot)
                .map_err(|e| TokenError::DatabaseError(format!("Failed to encode slot: {}", e)))?;
            self.store.set(&path, document).await?;
            created += 1;
        }

        info!(
            "Daily slots for {}: {} created, {} already present",
            day, created, skipped
        );
        Ok(CreateSlotsOutcome { created, skipped })
    }

    /// The day's slots sorted by start time, each with its selectability for
    /// the given patient (advisory; the ledger enforces the same rules).
    pub async fn get_slots(
        &self,
        day: NaiveDate,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<SlotSummary>, TokenError> {
        let Some(value) = self.store.get(&day_path(day)).await? else {
            return Ok(Vec::new());
        };
        let Some(entries) = value.as_object() else {
            return Err(TokenError::DatabaseError(format!(
                "day document for {} is not an object",
                day
            )));
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for (slot_id, slot_value) in entries {
            let slot = parse_slot(slot_id, slot_value)?;
            let tokens = decode_tokens(slot_value.get("tokens"))?;
            let selectability = self.policy.slot_selectability(&slot, &tokens, patient_id);
            summaries.push(SlotSummary {
                id: slot_id.clone(),
                slot,
                selectable: selectability.selectable,
                disable_reason: selectability.reason,
            });
        }

        summaries.sort_by_key(|summary| summary.slot.start_time);
        Ok(summaries)
    }

    pub async fn get_slot(
        &self,
        day: NaiveDate,
        slot_id: &str,
    ) -> Result<Option<Slot>, TokenError> {
        match self.store.get(&slot_path(day, slot_id)).await? {
            Some(value) => Ok(Some(parse_slot(slot_id, &value)?)),
            None => Ok(None),
        }
    }
}

fn parse_slot(slot_id: &str, value: &Value) -> Result<Slot, TokenError> {
    serde_json::from_value::<Slot>(value.clone())
        .map_err(|e| TokenError::DatabaseError(format!("Failed to parse slot {}: {}", slot_id, e)))
}
