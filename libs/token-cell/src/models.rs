// libs/token-cell/src/models.rs
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE QUEUE MODELS
// ==============================================================================

/// A named time window with a fixed token capacity for one calendar day.
///
/// The counters are the heart of the system: `available + used == allocated`
/// must hold after every operation. The stored document may carry a `tokens`
/// child subtree; counter mutations therefore always go through partial
/// updates, never whole-document writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub allocated: u32,
    pub available: u32,
    pub used: u32,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn counters_consistent(&self) -> bool {
        self.available <= self.allocated && self.available + self.used == self.allocated
    }
}

/// Creation input for one slot of the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub name: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub allocated: u32,
}

impl SlotDefinition {
    /// The clinic's standard day: three windows of 50 tokens each.
    pub fn default_daily() -> Vec<SlotDefinition> {
        fn at(hour: u32) -> NaiveTime {
            NaiveTime::from_hms_opt(hour, 0, 0).expect("valid wall-clock hour")
        }
        vec![
            SlotDefinition {
                name: "Morning".to_string(),
                start_time: at(9),
                end_time: at(12),
                allocated: 50,
            },
            SlotDefinition {
                name: "Afternoon".to_string(),
                start_time: at(14),
                end_time: at(17),
                allocated: 50,
            },
            SlotDefinition {
                name: "Evening".to_string(),
                start_time: at(17),
                end_time: at(20),
                allocated: 50,
            },
        ]
    }
}

/// A patient's claim on one numbered position within a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub token_number: u32,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub case_number: String,
    pub reason: String,
    pub contact_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent_name: Option<String>,
    pub slot_name: String,
    #[serde(with = "hhmm")]
    pub slot_start_time: NaiveTime,
    /// Derived once at issuance, never recomputed.
    #[serde(with = "hhmm")]
    pub expected_arrival_time: NaiveTime,
    pub status: TokenStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Token {
    /// A live token still occupies a queue position: it both blocks the
    /// patient from drawing a second one and counts toward patients-ahead.
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Pending,
    Called,
    Cleared,
    Canceled,
    Rated,
}

impl TokenStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TokenStatus::Cleared | TokenStatus::Canceled | TokenStatus::Rated
        )
    }

    /// Forward-only state machine: pending → called → cleared → rated, with
    /// cancellation allowed from pending or called. No skips, no backtracking.
    pub fn can_transition_to(&self, next: &TokenStatus) -> bool {
        matches!(
            (self, next),
            (TokenStatus::Pending, TokenStatus::Called)
                | (TokenStatus::Pending, TokenStatus::Canceled)
                | (TokenStatus::Called, TokenStatus::Cleared)
                | (TokenStatus::Called, TokenStatus::Canceled)
                | (TokenStatus::Cleared, TokenStatus::Rated)
        )
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::Pending => write!(f, "pending"),
            TokenStatus::Called => write!(f, "called"),
            TokenStatus::Cleared => write!(f, "cleared"),
            TokenStatus::Canceled => write!(f, "canceled"),
            TokenStatus::Rated => write!(f, "rated"),
        }
    }
}

// ==============================================================================
// SERVING CURSOR MODELS
// ==============================================================================

/// The clinic-wide pointer to the token number currently being handled.
/// One record per day; advanced by staff, never decremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingCursorRecord {
    pub number: u32,
    #[serde(rename = "type")]
    pub cursor_type: CursorType,
    pub slot_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CursorType {
    /// Token drawn through the app.
    Online,
    /// Walk-in token entered by staff.
    Offline,
}

impl fmt::Display for CursorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorType::Online => write!(f, "online"),
            CursorType::Offline => write!(f, "offline"),
        }
    }
}

// ==============================================================================
// DERIVED VIEWS
// ==============================================================================

/// Where a patient stands right now. Derived from ledger + cursor snapshots,
/// never stored.
#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    pub token: Token,
    pub slot_id: String,
    pub slot_name: String,
    pub patients_ahead: u32,
    pub position: u32,
    pub patients_waiting: u32,
    pub turn: TurnStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnStatus {
    /// No serving cursor set yet for the day.
    NotStarted,
    Waiting { eta_minutes: u32 },
    YourTurnNow,
    Completed,
}

/// A slot as shown to a patient picking where to queue: the slot itself plus
/// whether it can currently be selected and why not.
#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub id: String,
    #[serde(flatten)]
    pub slot: Slot,
    pub selectable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_reason: Option<SlotDisableReason>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum SlotDisableReason {
    #[serde(rename = "slot-expired")]
    SlotExpired,
    #[serde(rename = "user-has-token")]
    PatientHasToken,
    #[serde(rename = "unhandled-tokens")]
    UnhandledBacklog,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSlotsPayload {
    /// Omitted means the clinic's standard day.
    pub definitions: Option<Vec<SlotDefinition>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CreateSlotsOutcome {
    pub created: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestTokenPayload {
    pub patient_id: Uuid,
    pub patient_name: String,
    pub case_number: String,
    pub reason: String,
    pub contact_number: String,
    #[serde(default)]
    pub dependent_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceStatusPayload {
    pub status: TokenStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartingTokenPayload {
    pub number: u32,
    pub slot_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallNextPayload {
    #[serde(rename = "type")]
    pub cursor_type: CursorType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackPayload {
    pub rating: u8,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Patient rating of a completed consultation, kept alongside the day's
/// queue data for the clinic to review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub token_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub token_number: u32,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub slot_name: String,
    pub submitted_at: DateTime<Utc>,
}

// ==============================================================================
// WALL-CLOCK SERDE
// ==============================================================================

/// Slot windows are same-day wall-clock times stored as "HH:MM", matching how
/// staff enter them. `NaiveTime` ordering agrees with the lexical ordering of
/// that format.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
