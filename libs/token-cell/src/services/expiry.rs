// libs/token-cell/src/services/expiry.rs
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::models::{Slot, SlotDisableReason, Token};

/// Wall-clock source for slot-window decisions. All comparisons are same-day
/// local time; the clinic has exactly one of these.
pub trait ClinicClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }
}

pub struct SystemClock;

impl ClinicClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for tests and rehearsals.
pub struct FixedClock {
    inner: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            inner: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.inner.lock().expect("clock lock poisoned") = now;
    }
}

impl ClinicClock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.inner.lock().expect("clock lock poisoned")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSelectability {
    pub selectable: bool,
    pub reason: Option<SlotDisableReason>,
}

/// Time-based rules disabling actions against a slot.
///
/// The token ledger consults this to reject requests (authoritative) and the
/// slot listing consults it to grey out choices (advisory). Both go through
/// the same methods so the two can never disagree.
#[derive(Clone)]
pub struct ExpiryPolicy {
    clock: Arc<dyn ClinicClock>,
}

impl ExpiryPolicy {
    pub fn new(clock: Arc<dyn ClinicClock>) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &Arc<dyn ClinicClock> {
        &self.clock
    }

    /// A slot is expired once the wall clock reaches its end time.
    pub fn is_slot_expired(&self, slot: &Slot) -> bool {
        self.clock.time_of_day() >= slot.end_time
    }

    /// The patient's existing live token in this slot, if any. A live token
    /// blocks a second request until it is cleared or canceled.
    pub fn find_live_token_for<'a>(
        &self,
        tokens: &'a [Token],
        patient_id: Uuid,
    ) -> Option<&'a Token> {
        tokens
            .iter()
            .find(|token| token.patient_id == patient_id && token.is_live())
    }

    /// Tokens still pending or called after the slot's window closed: the
    /// clinic has unresolved backlog and the slot takes no new requests.
    pub fn has_stale_backlog(&self, slot: &Slot, tokens: &[Token]) -> bool {
        self.is_slot_expired(slot) && tokens.iter().any(|token| token.is_live())
    }

    /// Compose the three checks in the order patients see them: expiry first,
    /// then their own existing token, then stale backlog.
    pub fn slot_selectability(
        &self,
        slot: &Slot,
        tokens: &[Token],
        patient_id: Option<Uuid>,
    ) -> SlotSelectability {
        let reason = if self.is_slot_expired(slot) {
            Some(SlotDisableReason::SlotExpired)
        } else if patient_id
            .and_then(|id| self.find_live_token_for(tokens, id))
            .is_some()
        {
            Some(SlotDisableReason::PatientHasToken)
        } else if self.has_stale_backlog(slot, tokens) {
            Some(SlotDisableReason::UnhandledBacklog)
        } else {
            None
        };

        SlotSelectability {
            selectable: reason.is_none(),
            reason,
        }
    }
}
