use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Only unavailability is worth retrying; everything else is a caller bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A live feed of the value at one path.
///
/// Delivery is at-least-once with latest-value semantics: every change to the
/// path or anything beneath it produces a notification carrying the current
/// value at the subscribed path (`Value::Null` once the document is gone).
/// A subscriber that falls behind skips the missed intermediates and picks
/// back up at the current value.
pub struct Subscription {
    path: String,
    receiver: broadcast::Receiver<Value>,
}

impl Subscription {
    pub(crate) fn new(path: String, receiver: broadcast::Receiver<Value>) -> Self {
        Self { path, receiver }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next value. Returns `None` when the store side has been
    /// dropped and no further notifications can arrive.
    pub async fn next_value(&mut self) -> Option<Value> {
        loop {
            match self.receiver.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        "Subscription on {} lagged, skipped {} updates",
                        self.path,
                        skipped
                    );
                    // The next recv yields the most recent value, which is
                    // all latest-value delivery promises.
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Path-addressed hierarchical document store.
///
/// Paths are `/`-separated keys (`token_slots/2026-08-29/slot1`). `get` on an
/// interior node returns the whole subtree as a JSON object, which is how
/// callers enumerate children without a dedicated list primitive.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the document at `path`, creating intermediate nodes as needed.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Shallow-merge `fields` into the object at `path`, creating it if
    /// absent. Fails if the existing document is not an object.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}
