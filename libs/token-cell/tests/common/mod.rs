#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_store::{DocumentStore, InMemoryStore, StoreError, Subscription};
use token_cell::models::{RequestTokenPayload, SlotDefinition};
use token_cell::services::{
    ClinicClock, ClinicServingCursor, ExpiryPolicy, FixedClock, QueueProjectionService,
    ServingCursor, SlotRegistryService, TokenLedgerService,
};

/// The full service set over one in-memory store and one settable clock,
/// wired the same way the API state is.
pub struct TestContext {
    pub clock: Arc<FixedClock>,
    pub store: Arc<InMemoryStore>,
    pub registry: SlotRegistryService,
    pub ledger: Arc<TokenLedgerService>,
    pub cursor: Arc<ClinicServingCursor>,
    pub projection: QueueProjectionService,
}

impl TestContext {
    /// Mid-morning on the test day, well inside the Morning slot window.
    pub fn new() -> Self {
        Self::at(time(10, 0))
    }

    pub fn at(time_of_day: NaiveTime) -> Self {
        let clock = Arc::new(FixedClock::at(day().and_time(time_of_day)));
        let store = Arc::new(InMemoryStore::new());
        let config = AppConfig::default();

        let policy = ExpiryPolicy::new(Arc::clone(&clock) as Arc<dyn ClinicClock>);
        let dyn_store: Arc<dyn DocumentStore> = Arc::clone(&store) as Arc<dyn DocumentStore>;
        let cursor = Arc::new(ClinicServingCursor::new(Arc::clone(&dyn_store)));

        Self {
            registry: SlotRegistryService::new(Arc::clone(&dyn_store), policy.clone()),
            ledger: Arc::new(TokenLedgerService::new(
                &config,
                Arc::clone(&dyn_store),
                policy,
            )),
            projection: QueueProjectionService::new(
                &config,
                Arc::clone(&dyn_store),
                Arc::clone(&cursor) as Arc<dyn ServingCursor>,
            ),
            cursor,
            clock,
            store,
        }
    }

    pub async fn seed_default_slots(&self) {
        self.registry
            .create_daily_slots(day(), &SlotDefinition::default_daily())
            .await
            .expect("failed to seed slots");
    }

    pub async fn seed_slot(&self, definition: SlotDefinition) {
        self.registry
            .create_daily_slots(day(), &[definition])
            .await
            .expect("failed to seed slot");
    }

    /// Counter invariant check: `available + used == allocated` must hold
    /// after every operation.
    pub async fn assert_slot_counters(&self, slot_id: &str, available: u32, used: u32) {
        let slot = self
            .registry
            .get_slot(day(), slot_id)
            .await
            .expect("failed to load slot")
            .expect("slot missing");
        assert_eq!(slot.available, available, "unexpected available in {}", slot_id);
        assert_eq!(slot.used, used, "unexpected used in {}", slot_id);
        assert_eq!(
            slot.available + slot.used,
            slot.allocated,
            "counter invariant broken in {}",
            slot_id
        );
    }

    pub fn advance_clock_to(&self, time_of_day: NaiveTime) {
        self.clock.set(day().and_time(time_of_day));
    }
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 29).expect("valid test day")
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid wall-clock time")
}

pub fn morning_slot(allocated: u32) -> SlotDefinition {
    SlotDefinition {
        name: "Morning".to_string(),
        start_time: time(9, 0),
        end_time: time(12, 0),
        allocated,
    }
}

pub fn token_payload(patient_id: Uuid) -> RequestTokenPayload {
    RequestTokenPayload {
        patient_id,
        patient_name: "Test Patient".to_string(),
        case_number: "CASE-001".to_string(),
        reason: "Follow-up checkup".to_string(),
        contact_number: "0301-1234567".to_string(),
        dependent_name: None,
    }
}

pub fn parse_datetime(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").expect("valid datetime literal")
}

/// Store wrapper that fails a budgeted number of upcoming calls per
/// operation with a retryable unavailability error, then delegates to the
/// real in-memory store. Exercises the retry and rollback paths.
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_gets: AtomicU32,
    fail_sets: AtomicU32,
    fail_updates: AtomicU32,
    fail_removes: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_gets: AtomicU32::new(0),
            fail_sets: AtomicU32::new(0),
            fail_updates: AtomicU32::new(0),
            fail_removes: AtomicU32::new(0),
        }
    }

    pub fn fail_next_gets(&self, n: u32) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_sets(&self, n: u32) {
        self.fail_sets.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_updates(&self, n: u32) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_removes(&self, n: u32) {
        self.fail_removes.store(n, Ordering::SeqCst);
    }

    fn trip(budget: &AtomicU32, op: &str) -> Result<(), StoreError> {
        let tripped = budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::Unavailable(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Self::trip(&self.fail_gets, "get")?;
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        Self::trip(&self.fail_sets, "set")?;
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        Self::trip(&self.fail_updates, "update")?;
        self.inner.update(path, fields).await
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        Self::trip(&self.fail_removes, "remove")?;
        self.inner.remove(path).await
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(path).await
    }
}

/// Like [`TestContext`] but over a [`FlakyStore`], for tests that inject
/// store failures mid-operation.
pub struct FlakyContext {
    pub store: Arc<FlakyStore>,
    pub registry: SlotRegistryService,
    pub ledger: Arc<TokenLedgerService>,
}

impl FlakyContext {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::at(day().and_time(time(10, 0))));
        let store = Arc::new(FlakyStore::new());
        let config = AppConfig::default();

        let policy = ExpiryPolicy::new(clock as Arc<dyn ClinicClock>);
        let dyn_store: Arc<dyn DocumentStore> = Arc::clone(&store) as Arc<dyn DocumentStore>;

        Self {
            registry: SlotRegistryService::new(Arc::clone(&dyn_store), policy.clone()),
            ledger: Arc::new(TokenLedgerService::new(&config, dyn_store, policy)),
            store,
        }
    }

    pub async fn seed_slot(&self, definition: SlotDefinition) {
        self.registry
            .create_daily_slots(day(), &[definition])
            .await
            .expect("failed to seed slot");
    }

    pub async fn assert_slot_counters(&self, slot_id: &str, available: u32, used: u32) {
        let slot = self
            .registry
            .get_slot(day(), slot_id)
            .await
            .expect("failed to load slot")
            .expect("slot missing");
        assert_eq!(slot.available, available, "unexpected available in {}", slot_id);
        assert_eq!(slot.used, used, "unexpected used in {}", slot_id);
        assert_eq!(
            slot.available + slot.used,
            slot.allocated,
            "counter invariant broken in {}",
            slot_id
        );
    }
}
