mod common;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use token_cell::models::{Slot, SlotDisableReason, Token, TokenStatus};
use token_cell::services::{ClinicClock, ExpiryPolicy, FixedClock};

use common::{day, time};

fn policy_at(hour: u32, minute: u32) -> ExpiryPolicy {
    let clock = FixedClock::at(day().and_time(time(hour, minute)));
    ExpiryPolicy::new(Arc::new(clock) as Arc<dyn ClinicClock>)
}

fn morning() -> Slot {
    Slot {
        name: "Morning".to_string(),
        start_time: time(9, 0),
        end_time: time(12, 0),
        allocated: 50,
        available: 48,
        used: 2,
        created_at: Utc::now(),
    }
}

fn token(patient_id: Uuid, token_number: u32, status: TokenStatus) -> Token {
    Token {
        id: Uuid::new_v4(),
        token_number,
        patient_id,
        patient_name: "Test Patient".to_string(),
        case_number: "CASE-001".to_string(),
        reason: "Follow-up checkup".to_string(),
        contact_number: "0301-1234567".to_string(),
        dependent_name: None,
        slot_name: "Morning".to_string(),
        slot_start_time: time(9, 0),
        expected_arrival_time: time(9, 0),
        status,
        requested_at: Utc::now(),
        cleared_at: None,
    }
}

#[test]
fn slot_expires_exactly_at_its_end_time() {
    assert!(!policy_at(11, 59).is_slot_expired(&morning()));
    assert!(policy_at(12, 0).is_slot_expired(&morning()));
    assert!(policy_at(12, 1).is_slot_expired(&morning()));
}

#[test]
fn only_live_tokens_block_a_patient() {
    let policy = policy_at(10, 0);
    let patient = Uuid::new_v4();

    let settled = [
        token(patient, 1, TokenStatus::Cleared),
        token(patient, 2, TokenStatus::Canceled),
        token(patient, 3, TokenStatus::Rated),
    ];
    assert!(policy.find_live_token_for(&settled, patient).is_none());

    let live = [
        token(Uuid::new_v4(), 1, TokenStatus::Pending),
        token(patient, 2, TokenStatus::Called),
    ];
    let found = policy
        .find_live_token_for(&live, patient)
        .expect("live token not found");
    assert_eq!(found.token_number, 2);
}

#[test]
fn open_slot_with_no_conflict_is_selectable() {
    let policy = policy_at(10, 0);
    let result = policy.slot_selectability(&morning(), &[], Some(Uuid::new_v4()));
    assert!(result.selectable);
    assert!(result.reason.is_none());
}

#[test]
fn own_live_token_disables_the_slot() {
    let policy = policy_at(10, 0);
    let patient = Uuid::new_v4();
    let tokens = [token(patient, 1, TokenStatus::Pending)];

    let result = policy.slot_selectability(&morning(), &tokens, Some(patient));
    assert!(!result.selectable);
    assert_eq!(result.reason, Some(SlotDisableReason::PatientHasToken));

    // Someone else's token does not.
    let result = policy.slot_selectability(&morning(), &tokens, Some(Uuid::new_v4()));
    assert!(result.selectable);
}

#[test]
fn expiry_outranks_every_other_reason() {
    let policy = policy_at(12, 30);
    let patient = Uuid::new_v4();
    // Expired window with both an own token and a stale backlog behind it.
    let tokens = [
        token(patient, 1, TokenStatus::Pending),
        token(Uuid::new_v4(), 2, TokenStatus::Called),
    ];

    let result = policy.slot_selectability(&morning(), &tokens, Some(patient));
    assert!(!result.selectable);
    assert_eq!(result.reason, Some(SlotDisableReason::SlotExpired));

    assert!(policy.has_stale_backlog(&morning(), &tokens));
}
