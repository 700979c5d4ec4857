//! Per-sender state for multi-step reply flows.
//!
//! A command starts a flow by storing a JSON record under `(scope, sender)`;
//! a reply handler's filter checks for the record and the handler consumes it
//! with [`ConversationStore::take`]. Records left behind expire after a TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;

type Key = (String, String);

struct Entry {
    data: Value,
    created: Instant,
}

#[derive(Default)]
pub struct ConversationStore {
    entries: DashMap<Key, Entry>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(scope: &str, sender: &str) -> Key {
        (scope.to_string(), sender.to_string())
    }

    /// Begin (or restart) a flow for `sender` under `scope`.
    pub fn start<T: Serialize>(&self, scope: &str, sender: &str, data: &T) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.entries.insert(
            Self::key(scope, sender),
            Entry {
                data,
                created: Instant::now(),
            },
        );
        debug!(scope, sender, "conversation started");
        Ok(())
    }

    pub fn contains(&self, scope: &str, sender: &str) -> bool {
        self.entries.contains_key(&Self::key(scope, sender))
    }

    pub fn get(&self, scope: &str, sender: &str) -> Option<Value> {
        self.entries
            .get(&Self::key(scope, sender))
            .map(|e| e.data.clone())
    }

    /// Typed read. `Ok(None)` when no flow is pending.
    pub fn get_as<T: DeserializeOwned>(&self, scope: &str, sender: &str) -> Result<Option<T>> {
        match self.get(scope, sender) {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Mutate a pending record in place. Returns `false` if there is none.
    pub fn update(&self, scope: &str, sender: &str, f: impl FnOnce(&mut Value)) -> bool {
        match self.entries.get_mut(&Self::key(scope, sender)) {
            Some(mut entry) => {
                f(&mut entry.data);
                true
            }
            None => false,
        }
    }

    /// Remove and return a record. A second `take` of the same key yields `None`.
    pub fn take(&self, scope: &str, sender: &str) -> Option<Value> {
        self.entries
            .remove(&Self::key(scope, sender))
            .map(|(_, e)| e.data)
    }

    pub fn take_as<T: DeserializeOwned>(&self, scope: &str, sender: &str) -> Result<Option<T>> {
        match self.take(scope, sender) {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Drop records older than `ttl`. Returns how many were removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.created.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep(ttl);
                        if removed > 0 {
                            info!(removed, remaining = store.len(), "expired conversations swept");
                        }
                    }
                }
            }
            debug!("conversation sweeper stopped");
        })
    }
}
