//! Process-wide address cache with in-flight coalescing.
//!
//! Each normalized address maps to a shared `OnceCell`. The first caller runs
//! the lookup; concurrent callers for the same key await that same cell
//! instead of issuing a second provider call.
//!
//! ```text
//! "221B Baker St" ──┐
//!                   ├─ normalize ─▶ "221b baker st" ─▶ OnceCell ─▶ one provider call
//! "221b  baker st" ─┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::normalize_address;
use crate::offer::Coordinates;

/// Outcome of geocoding one address. `Unresolved` is final for the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Resolved(Coordinates),
    Unresolved,
}

impl Resolution {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Resolution::Resolved(coordinates) => Some(*coordinates),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Thread-safe address → resolution cache. Share it with `Arc` across
/// enrichers; it is never a global.
#[derive(Default)]
pub struct GeocodeCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Resolution>>>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<Resolution>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key.to_string()).or_default())
    }

    /// Cached resolution for `address`, or run `lookup` exactly once per key.
    ///
    /// Blank addresses are `Unresolved` without a lookup. If the first
    /// caller is cancelled mid-lookup the cell stays empty and the next
    /// caller retries.
    pub async fn get_or_resolve<F, Fut>(&self, address: &str, lookup: F) -> Resolution
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Resolution>,
    {
        let key = normalize_address(address);
        if key.is_empty() {
            return Resolution::Unresolved;
        }
        let cell = self.cell(&key);
        *cell.get_or_init(|| lookup(address.trim().to_string())).await
    }

    /// Completed resolution for `address`, without triggering a lookup.
    pub fn get(&self, address: &str) -> Option<Resolution> {
        let key = normalize_address(address);
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).and_then(|cell| cell.get().copied())
    }

    /// Number of addresses with a settled resolution.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn equivalent_addresses_share_one_lookup() {
        let cache = GeocodeCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let lookup = move |_: String| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Resolution::Resolved(Coordinates::new(1.0, 2.0))
        };

        let first = cache.get_or_resolve("221B Baker St", lookup).await;
        let second = cache.get_or_resolve(" 221b  BAKER st ", lookup).await;

        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("221b baker st"), Some(first));
    }

    #[tokio::test]
    async fn blank_address_never_looks_up() {
        let cache = GeocodeCache::new();
        let resolution = cache
            .get_or_resolve("   ", |_| async { Resolution::Resolved(Coordinates::new(0.0, 0.0)) })
            .await;
        assert_eq!(resolution, Resolution::Unresolved);
        assert!(cache.is_empty());
    }
}
