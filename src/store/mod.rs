//! Remote store boundary.
//!
//! The hosted document store is a black box offering predicate subscriptions
//! and atomic field mutations. [`OfferStore`] is the seam; the crate ships an
//! [`InMemoryOfferStore`] reference implementation for tests and local runs.
//!
//! ```text
//! ┌──────────────┐  subscribe(query)   ┌──────────────┐
//! │ SyncChannel  │ ──────────────────▶ │  OfferStore  │
//! │              │ ◀── full result ─── │              │
//! └──────────────┘      sets           └──────────────┘
//!                                            ▲
//! ┌──────────────┐  mutate(batch)             │
//! │InterestLedger│ ───────────────────────────┘
//! └──────────────┘   (fire and forget; seen in next snapshot)
//! ```

mod in_memory;
mod query;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::offer::{ActorId, NewOffer, Offer, OfferId, StoredStatus};

pub use in_memory::{Clock, InMemoryOfferStore};
pub use query::{Direction, OfferQuery, OrderField};

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The target offer does not exist (or was deleted concurrently).
    #[error("offer not found: {0}")]
    NotFound(OfferId),
    /// The store's rules refused the write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The store could not be reached or dropped the connection.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The request was malformed.
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Set-valued fields that support add/remove membership operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetField {
    InterestedActors,
}

/// Numeric fields that support atomic increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    ViewCount,
}

/// An atomic field mutation. A batch of these is applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldMutation {
    AddToSet { field: SetField, value: ActorId },
    RemoveFromSet { field: SetField, value: ActorId },
    Increment { field: CounterField, by: u64 },
    SetStatus { status: StoredStatus, claimed_by: Option<ActorId> },
}

/// A live subscription: each item is the complete matching set at that moment.
///
/// Dropping the subscription unsubscribes.
pub struct StoreSubscription {
    receiver: mpsc::UnboundedReceiver<Result<Vec<Offer>, StoreError>>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StoreSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Result<Vec<Offer>, StoreError>>) -> Self {
        Self {
            receiver,
            on_drop: None,
        }
    }

    /// Run `hook` when the subscription is dropped (detach from the store).
    pub fn with_unsubscribe(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_drop = Some(Box::new(hook));
        self
    }

    /// Next full result set. `None` once the store closed the subscription.
    pub async fn next(&mut self) -> Option<Result<Vec<Offer>, StoreError>> {
        self.receiver.recv().await
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(hook) = self.on_drop.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSubscription").finish_non_exhaustive()
    }
}

/// The remote document store.
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Create an offer. The store assigns `id` and `created_at`.
    async fn create(&self, draft: NewOffer) -> Result<Offer, StoreError>;

    /// Read a single offer.
    async fn get(&self, offer_id: &str) -> Result<Option<Offer>, StoreError>;

    /// One-shot read of the offers matching `query`.
    async fn query(&self, query: &OfferQuery) -> Result<Vec<Offer>, StoreError>;

    /// Subscribe to the full matching set. The first item is the current set.
    async fn subscribe(&self, query: OfferQuery) -> Result<StoreSubscription, StoreError>;

    /// Apply a batch of field mutations atomically on behalf of `actor_id`.
    async fn mutate(
        &self,
        offer_id: &str,
        actor_id: &str,
        batch: Vec<FieldMutation>,
    ) -> Result<(), StoreError>;

    /// Delete an offer. Only the owner may delete. Returns true if it existed.
    async fn delete(&self, offer_id: &str, actor_id: &str) -> Result<bool, StoreError>;
}
