// libs/token-cell/src/services/cursor.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::info;

use shared_store::{DocumentStore, Subscription};

use crate::error::TokenError;
use crate::models::{CursorType, ServingCursorRecord};
use crate::services::cursor_path;

/// The "currently serving" pointer, kept behind a trait so the single
/// clinic-wide counter modeled today could be swapped for a per-slot cursor
/// without touching the ledger or the projection.
#[async_trait]
pub trait ServingCursor: Send + Sync {
    async fn current(&self, day: NaiveDate) -> Result<Option<ServingCursorRecord>, TokenError>;

    /// Staff-entered walk-in baseline. Overwrites unconditionally; this is
    /// how an offline counter gets (re)anchored, so no validation against
    /// any slot's token set.
    async fn set_starting_token(
        &self,
        day: NaiveDate,
        number: u32,
        slot_name: &str,
    ) -> Result<ServingCursorRecord, TokenError>;

    /// Advance by exactly one. The cursor is a clinic-wide display and ETA
    /// pointer, not a per-slot queue head; it moves regardless of how many
    /// tokens any slot holds.
    async fn call_next(
        &self,
        day: NaiveDate,
        cursor_type: CursorType,
    ) -> Result<ServingCursorRecord, TokenError>;

    /// Live feed of cursor changes for patient displays. A fixed-interval
    /// poll of `current` is an acceptable substitute where push delivery is
    /// unavailable.
    async fn subscribe(&self, day: NaiveDate) -> Result<Subscription, TokenError>;
}

pub struct ClinicServingCursor {
    store: Arc<dyn DocumentStore>,
    // Serializes call_next's read-modify-write; there is exactly one cursor
    // per day, so a single mutex suffices.
    advance_lock: Mutex<()>,
}

impl ClinicServingCursor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            advance_lock: Mutex::new(()),
        }
    }

    async fn write(
        &self,
        day: NaiveDate,
        record: &ServingCursorRecord,
    ) -> Result<(), TokenError> {
        let document = serde_json::to_value(record)
            .map_err(|e| TokenError::DatabaseError(format!("Failed to encode cursor: {}", e)))?;
        self.store.set(&cursor_path(day), document).await?;
        Ok(())
    }
}

#[async_trait]
impl ServingCursor for ClinicServingCursor {
    async fn current(&self, day: NaiveDate) -> Result<Option<ServingCursorRecord>, TokenError> {
        match self.store.get(&cursor_path(day)).await? {
            Some(value) => {
                let record = serde_json::from_value::<ServingCursorRecord>(value)
                    .map_err(|e| TokenError::DatabaseError(format!("Failed to parse cursor: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn set_starting_token(
        &self,
        day: NaiveDate,
        number: u32,
        slot_name: &str,
    ) -> Result<ServingCursorRecord, TokenError> {
        let record = ServingCursorRecord {
            number,
            cursor_type: CursorType::Offline,
            slot_name: slot_name.to_string(),
            timestamp: Utc::now(),
        };
        self.write(day, &record).await?;

        info!("Serving cursor for {} anchored at #{} ({})", day, number, slot_name);
        Ok(record)
    }

    async fn call_next(
        &self,
        day: NaiveDate,
        cursor_type: CursorType,
    ) -> Result<ServingCursorRecord, TokenError> {
        let _guard = self.advance_lock.lock().await;

        let current = self.current(day).await?.ok_or(TokenError::NoCurrentToken)?;
        let record = ServingCursorRecord {
            number: current.number + 1,
            cursor_type,
            slot_name: current.slot_name,
            timestamp: Utc::now(),
        };
        self.write(day, &record).await?;

        info!(
            "Serving cursor for {} advanced to #{} ({})",
            day, record.number, record.cursor_type
        );
        Ok(record)
    }

    async fn subscribe(&self, day: NaiveDate) -> Result<Subscription, TokenError> {
        Ok(self.store.subscribe(&cursor_path(day)).await?)
    }
}
