//! Keyed mutual-exclusion scopes.
//!
//! One async mutex per entity key serializes every mutating operation on a
//! single trade, auction, or actor record. Guards are RAII: release happens
//! on every exit path. Entries are kept for the process lifetime; the
//! population is bounded by the number of live entities.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("lock registry poisoned");
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}

pub fn trade_key(id: i64) -> String {
    format!("trade:{}", id)
}

pub fn auction_key(id: i64) -> String {
    format!("auction:{}", id)
}

pub fn actor_key(id: i64) -> String {
    format!("actor:{}", id)
}
