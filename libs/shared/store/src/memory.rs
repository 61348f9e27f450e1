use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::store::{DocumentStore, StoreError, Subscription};

const WATCHER_CHANNEL_CAPACITY: usize = 64;

/// In-process implementation of [`DocumentStore`] over a single JSON tree.
///
/// Every operation runs under a bounded timeout; hitting the bound surfaces
/// as a retryable [`StoreError::Unavailable`], never as absence or silent
/// success.
pub struct InMemoryStore {
    root: Arc<RwLock<Value>>,
    watchers: Arc<RwLock<HashMap<String, broadcast::Sender<Value>>>>,
    op_timeout: Duration,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(2000))
    }

    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            watchers: Arc::new(RwLock::new(HashMap::new())),
            op_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = T> + Send,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "{} did not complete within {}ms",
                    op,
                    self.op_timeout.as_millis()
                ))
            })
    }

    /// Push the current value at each watched path affected by a change at
    /// `changed`. A watcher is affected when its path is the changed path,
    /// an ancestor of it, or a descendant of it.
    async fn notify(&self, root: &Value, changed: &str) {
        let watchers = self.watchers.read().await;
        for (path, sender) in watchers.iter() {
            if !paths_related(path, changed) {
                continue;
            }
            let segments = segments_of(path);
            let value = resolve(root, &segments).cloned().unwrap_or(Value::Null);
            if sender.send(value).is_err() {
                debug!("No live subscribers on {}, notification dropped", path);
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        self.bounded("get", async {
            let root = self.root.read().await;
            match resolve(&root, &segments) {
                Some(Value::Null) | None => None,
                Some(value) => Some(value.clone()),
            }
        })
        .await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.bounded("set", async {
            let mut root = self.root.write().await;
            *entry(&mut root, &segments) = value;
            self.notify(&root, &segments.join("/")).await;
        })
        .await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.bounded("update", async {
            let mut root = self.root.write().await;
            let node = entry(&mut root, &segments);
            match node {
                Value::Object(map) => {
                    for (key, value) in fields {
                        map.insert(key, value);
                    }
                }
                Value::Null => {
                    *node = Value::Object(fields);
                }
                _ => {
                    return Err(StoreError::InvalidPath(format!(
                        "{} does not address an object",
                        segments.join("/")
                    )));
                }
            }
            self.notify(&root, &segments.join("/")).await;
            Ok(())
        })
        .await?
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.bounded("remove", async {
            let mut root = self.root.write().await;
            let (last, parents) = match segments.split_last() {
                Some(split) => split,
                None => return,
            };
            if let Some(Value::Object(map)) = resolve_mut(&mut root, parents) {
                map.remove(last.as_str());
            }
            self.notify(&root, &segments.join("/")).await;
        })
        .await
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let segments = split_path(path)?;
        let normalized = segments.join("/");

        let receiver = {
            let mut watchers = self.watchers.write().await;
            let sender = watchers
                .entry(normalized.clone())
                .or_insert_with(|| broadcast::channel(WATCHER_CHANNEL_CAPACITY).0);
            sender.subscribe()
        };

        // Seed the subscriber with the current value so it never has to poll
        // for initial state. Existing subscribers see a duplicate, which
        // at-least-once delivery permits.
        {
            let root = self.root.read().await;
            if let Some(value) = resolve(&root, &segments) {
                let watchers = self.watchers.read().await;
                if let Some(sender) = watchers.get(&normalized) {
                    let _ = sender.send(value.clone());
                }
            }
        }

        Ok(Subscription::new(normalized, receiver))
    }
}

fn split_path(path: &str) -> Result<Vec<String>, StoreError> {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if segments.is_empty() {
        return Err(StoreError::InvalidPath("empty path".to_string()));
    }
    Ok(segments)
}

fn segments_of(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn resolve<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn resolve_mut<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object_mut()?.get_mut(segment)?;
    }
    Some(node)
}

/// Walk to `segments`, materializing intermediate objects along the way.
fn entry<'a>(root: &'a mut Value, segments: &[String]) -> &'a mut Value {
    let mut node = root;
    for segment in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            unreachable!("node was just coerced to an object");
        };
        node = map.entry(segment.clone()).or_insert(Value::Null);
    }
    node
}

fn paths_related(a: &str, b: &str) -> bool {
    a == b || b.starts_with(&format!("{}/", a)) || a.starts_with(&format!("{}/", b))
}
