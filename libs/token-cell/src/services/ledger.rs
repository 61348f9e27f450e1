// libs/token-cell/src/services/ledger.rs
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::{json, Map};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_store::DocumentStore;

use crate::error::TokenError;
use crate::models::{Feedback, FeedbackPayload, RequestTokenPayload, Slot, Token, TokenStatus};
use crate::services::expiry::ExpiryPolicy;
use crate::services::{feedback_path, slot_path, token_path, tokens_path};

/// Issues, cancels, and clears tokens within a slot.
///
/// Every mutation of a slot's `available`/`used` pair, and every token number
/// assignment, runs under that slot's mutex for the whole read-modify-write.
/// The store offers no compare-and-swap, so this serialization is the only
/// thing standing between concurrent requests and duplicate token numbers.
pub struct TokenLedgerService {
    store: Arc<dyn DocumentStore>,
    policy: ExpiryPolicy,
    interval_minutes: u32,
    retry_attempts: u32,
    slot_locks: Arc<RwLock<HashMap<(NaiveDate, String), Arc<Mutex<()>>>>>,
}

impl TokenLedgerService {
    pub fn new(config: &AppConfig, store: Arc<dyn DocumentStore>, policy: ExpiryPolicy) -> Self {
        Self {
            store,
            policy,
            interval_minutes: config.token_interval_minutes,
            retry_attempts: config.store_retry_attempts,
            slot_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Issue a token against a slot.
    ///
    /// Validation order matters and is observable through the returned error:
    /// missing slot, expired slot, duplicate live token (quoting the held
    /// number), exhausted capacity. The assigned number is
    /// `allocated - available + 1`, bumped past any number already issued so
    /// cancellations never cause a number to be handed out twice; the expected
    /// arrival time is the slot start plus one interval per token ahead,
    /// fixed at issuance.
    pub async fn request_token(
        &self,
        day: NaiveDate,
        slot_id: &str,
        payload: RequestTokenPayload,
    ) -> Result<Token, TokenError> {
        let lock = self.slot_lock(day, slot_id).await;
        let _guard = lock.lock().await;

        let slot = self
            .load_slot(day, slot_id)
            .await?
            .ok_or(TokenError::SlotNotFound)?;

        if self.policy.is_slot_expired(&slot) {
            debug!("Rejecting token request for expired slot {} on {}", slot_id, day);
            return Err(TokenError::SlotExpired);
        }

        let tokens = self.load_tokens(day, slot_id).await?;
        if let Some(existing) = self.policy.find_live_token_for(&tokens, payload.patient_id) {
            debug!(
                "Patient {} already holds token #{} in slot {} on {}",
                payload.patient_id, existing.token_number, slot_id, day
            );
            return Err(TokenError::DuplicateActiveToken {
                token_number: existing.token_number,
            });
        }

        if slot.available == 0 {
            return Err(TokenError::SlotFull);
        }
        self.check_counters(day, slot_id, &slot)?;

        // The counter formula alone would hand a freed number back out after a
        // cancellation; the highest number already issued keeps the sequence
        // moving forward instead.
        let next_in_sequence = tokens
            .iter()
            .map(|t| t.token_number)
            .max()
            .map_or(1, |n| n + 1);
        let token_number = (slot.allocated - slot.available + 1).max(next_in_sequence);
        let expected_arrival_time = slot.start_time
            + chrono::Duration::minutes((token_number - 1) as i64 * self.interval_minutes as i64);

        let token = Token {
            id: Uuid::new_v4(),
            token_number,
            patient_id: payload.patient_id,
            patient_name: payload.patient_name,
            case_number: payload.case_number,
            reason: payload.reason,
            contact_number: payload.contact_number,
            dependent_name: payload.dependent_name,
            slot_name: slot.name.clone(),
            slot_start_time: slot.start_time,
            expected_arrival_time,
            status: TokenStatus::Pending,
            requested_at: Utc::now(),
            cleared_at: None,
        };

        let path = token_path(day, slot_id, token.id);
        let document = serde_json::to_value(&token)
            .map_err(|e| TokenError::DatabaseError(format!("Failed to encode token: {}", e)))?;
        self.with_retry("write token", || self.store.set(&path, document.clone()))
            .await?;

        if let Err(err) = self
            .write_counters(day, slot_id, slot.available - 1, slot.used + 1)
            .await
        {
            // Counter write failed after the token landed; take the token
            // back out so the pair behaves as one transaction.
            warn!(
                "Counter update failed after issuing token #{} in slot {} on {}, rolling back: {}",
                token_number, slot_id, day, err
            );
            let _ = self.store.remove(&path).await;
            return Err(err);
        }

        info!(
            "Issued token #{} ({}) to patient {} in slot {} on {}, expected arrival {}",
            token.token_number,
            token.id,
            token.patient_id,
            slot_id,
            day,
            token.expected_arrival_time.format("%H:%M")
        );
        Ok(token)
    }

    /// Patient-initiated cancellation: removes the token record and hands its
    /// capacity back. The inverse of issuance, under the same slot mutex.
    pub async fn cancel_token(
        &self,
        day: NaiveDate,
        slot_id: &str,
        token_id: Uuid,
    ) -> Result<(), TokenError> {
        let lock = self.slot_lock(day, slot_id).await;
        let _guard = lock.lock().await;

        let token = self
            .load_token(day, slot_id, token_id)
            .await?
            .ok_or(TokenError::TokenNotFound)?;
        if token.status.is_terminal() {
            // Canceling an already-settled token is an error, not a no-op.
            return Err(TokenError::TokenNotFound);
        }

        let slot = self
            .load_slot(day, slot_id)
            .await?
            .ok_or(TokenError::SlotNotFound)?;

        let path = token_path(day, slot_id, token_id);
        self.with_retry("remove token", || self.store.remove(&path))
            .await?;

        let restored_available = (slot.available + 1).min(slot.allocated);
        let floored = slot.used == 0;
        let restored_used = slot.used.saturating_sub(1);

        if let Err(err) = self
            .write_counters(day, slot_id, restored_available, restored_used)
            .await
        {
            // Put the token back rather than leave capacity under-counted.
            warn!(
                "Counter restore failed after canceling token #{} in slot {} on {}, rolling back: {}",
                token.token_number, slot_id, day, err
            );
            if let Ok(document) = serde_json::to_value(&token) {
                let _ = self.store.set(&path, document).await;
            }
            return Err(err);
        }

        if floored {
            // `used` was already zero, so the books were wrong before this
            // cancellation. The restore above clamped instead of going
            // negative; report the drift for offline reconciliation.
            error!(
                "Counter drift detected canceling token #{} in slot {} on {}: used was 0 with a live token present. Slot snapshot: {:?}, token snapshot: {:?}",
                token.token_number, slot_id, day, slot, token
            );
            return Err(TokenError::InvariantViolation(format!(
                "used counter was 0 while canceling live token #{} in slot {}",
                token.token_number, slot_id
            )));
        }

        info!(
            "Canceled token #{} ({}) in slot {} on {}, capacity restored to {}",
            token.token_number, token_id, slot_id, day, restored_available
        );
        Ok(())
    }

    /// Move a token forward through pending → called → cleared → rated.
    /// Clearing stamps `cleared_at` but leaves the slot counters alone:
    /// they track capacity consumption, which happened at issuance.
    pub async fn advance_status(
        &self,
        day: NaiveDate,
        slot_id: &str,
        token_id: Uuid,
        new_status: TokenStatus,
    ) -> Result<Token, TokenError> {
        let mut token = self
            .load_token(day, slot_id, token_id)
            .await?
            .ok_or(TokenError::TokenNotFound)?;

        if !token.status.can_transition_to(&new_status) {
            warn!(
                "Invalid status transition {} -> {} for token #{} in slot {} on {}",
                token.status, new_status, token.token_number, slot_id, day
            );
            return Err(TokenError::InvalidTransition {
                from: token.status,
                to: new_status,
            });
        }

        let mut fields = Map::new();
        fields.insert("status".to_string(), json!(new_status));
        if new_status == TokenStatus::Cleared {
            let cleared_at = Utc::now();
            fields.insert("cleared_at".to_string(), json!(cleared_at));
            token.cleared_at = Some(cleared_at);
        }

        let path = token_path(day, slot_id, token_id);
        self.with_retry("update token status", || {
            self.store.update(&path, fields.clone())
        })
        .await?;

        info!(
            "Token #{} in slot {} on {} advanced {} -> {}",
            token.token_number, slot_id, day, token.status, new_status
        );
        token.status = new_status;
        Ok(token)
    }

    /// Staff listing of a slot's tokens, in issuance order.
    pub async fn get_slot_tokens(
        &self,
        day: NaiveDate,
        slot_id: &str,
    ) -> Result<Vec<Token>, TokenError> {
        let mut tokens = self.load_tokens(day, slot_id).await?;
        tokens.sort_by_key(|token| token.token_number);
        Ok(tokens)
    }

    /// Record the patient's rating of a cleared consultation and settle the
    /// token as rated.
    pub async fn submit_feedback(
        &self,
        day: NaiveDate,
        slot_id: &str,
        token_id: Uuid,
        payload: FeedbackPayload,
    ) -> Result<Feedback, TokenError> {
        let token = self
            .load_token(day, slot_id, token_id)
            .await?
            .ok_or(TokenError::TokenNotFound)?;

        if !token.status.can_transition_to(&TokenStatus::Rated) {
            return Err(TokenError::InvalidTransition {
                from: token.status,
                to: TokenStatus::Rated,
            });
        }

        let feedback = Feedback {
            id: Uuid::new_v4(),
            token_id: token.id,
            patient_id: token.patient_id,
            patient_name: token.patient_name.clone(),
            token_number: token.token_number,
            rating: payload.rating,
            experience: payload.experience,
            comment: payload.comment,
            slot_name: token.slot_name.clone(),
            submitted_at: Utc::now(),
        };

        let path = feedback_path(day, feedback.id);
        let document = serde_json::to_value(&feedback)
            .map_err(|e| TokenError::DatabaseError(format!("Failed to encode feedback: {}", e)))?;
        self.with_retry("write feedback", || self.store.set(&path, document.clone()))
            .await?;

        if let Err(err) = self
            .advance_status(day, slot_id, token_id, TokenStatus::Rated)
            .await
        {
            let _ = self.store.remove(&path).await;
            return Err(err);
        }

        info!(
            "Feedback {} recorded for token #{} in slot {} on {} (rating {})",
            feedback.id, feedback.token_number, slot_id, day, feedback.rating
        );
        Ok(feedback)
    }

    // Private helper methods

    async fn slot_lock(&self, day: NaiveDate, slot_id: &str) -> Arc<Mutex<()>> {
        let key = (day, slot_id.to_string());
        {
            let locks = self.slot_locks.read().await;
            if let Some(lock) = locks.get(&key) {
                return Arc::clone(lock);
            }
        }
        let mut locks = self.slot_locks.write().await;
        Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    async fn load_slot(&self, day: NaiveDate, slot_id: &str) -> Result<Option<Slot>, TokenError> {
        let path = slot_path(day, slot_id);
        let value = self.with_retry("load slot", || self.store.get(&path)).await?;
        match value {
            Some(value) => {
                let slot = serde_json::from_value::<Slot>(value).map_err(|e| {
                    TokenError::DatabaseError(format!("Failed to parse slot {}: {}", slot_id, e))
                })?;
                Ok(Some(slot))
            }
            None => Ok(None),
        }
    }

    async fn load_tokens(&self, day: NaiveDate, slot_id: &str) -> Result<Vec<Token>, TokenError> {
        let path = tokens_path(day, slot_id);
        let value = self
            .with_retry("load tokens", || self.store.get(&path))
            .await?;
        crate::services::decode_tokens(value.as_ref())
    }

    async fn load_token(
        &self,
        day: NaiveDate,
        slot_id: &str,
        token_id: Uuid,
    ) -> Result<Option<Token>, TokenError> {
        let path = token_path(day, slot_id, token_id);
        let value = self
            .with_retry("load token", || self.store.get(&path))
            .await?;
        match value {
            Some(value) => {
                let token = serde_json::from_value::<Token>(value).map_err(|e| {
                    TokenError::DatabaseError(format!("Failed to parse token {}: {}", token_id, e))
                })?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn write_counters(
        &self,
        day: NaiveDate,
        slot_id: &str,
        available: u32,
        used: u32,
    ) -> Result<(), TokenError> {
        let path = slot_path(day, slot_id);
        let mut fields = Map::new();
        fields.insert("available".to_string(), json!(available));
        fields.insert("used".to_string(), json!(used));
        self.with_retry("update slot counters", || {
            self.store.update(&path, fields.clone())
        })
        .await
    }

    fn check_counters(&self, day: NaiveDate, slot_id: &str, slot: &Slot) -> Result<(), TokenError> {
        if slot.counters_consistent() {
            return Ok(());
        }
        error!(
            "Counter drift detected in slot {} on {}: available={} used={} allocated={}. Slot snapshot: {:?}",
            slot_id, day, slot.available, slot.used, slot.allocated, slot
        );
        Err(TokenError::InvariantViolation(format!(
            "slot {} counters drifted: {} available + {} used != {} allocated",
            slot_id, slot.available, slot.used, slot.allocated
        )))
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, TokenError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, shared_store::StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry_attempts => {
                    warn!(
                        "{} hit a retryable store failure (attempt {}/{}): {}",
                        op, attempt, self.retry_attempts, err
                    );
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
