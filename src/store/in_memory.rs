//! InMemoryOfferStore - HashMap-backed offer store for testing and development.
//!
//! Behaves like the hosted store as far as this crate can observe: every
//! committed write re-evaluates each live subscription and pushes the full
//! matching set, ids and creation timestamps are server-assigned, and the
//! store-side rules for interest and status writes are enforced here.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CounterField, FieldMutation, OfferQuery, OfferStore, SetField, StoreError, StoreSubscription};
use crate::offer::{NewOffer, Offer, StoredStatus};

/// Source of the server timestamp.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type SnapshotSender = mpsc::UnboundedSender<Result<Vec<Offer>, StoreError>>;

struct Subscriber {
    query: OfferQuery,
    tx: SnapshotSender,
}

#[derive(Default)]
struct Faults {
    failing_subscribes: usize,
    denied_actors: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    offers: HashMap<String, Offer>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
    faults: Faults,
}

impl Inner {
    /// Push the current matching set to every live subscriber, pruning closed ones.
    fn broadcast(&mut self) {
        let offers = &self.offers;
        self.subscribers.retain(|id, sub| {
            let snapshot = sub.query.evaluate(offers.values());
            let delivered = sub.tx.send(Ok(snapshot)).is_ok();
            if !delivered {
                debug!(subscriber = id, "pruning closed subscription");
            }
            delivered
        });
    }
}

/// In-memory offer store. Clone-friendly via Arc; clones share storage.
#[derive(Clone)]
pub struct InMemoryOfferStore {
    inner: Arc<RwLock<Inner>>,
    clock: Clock,
}

impl Default for InMemoryOfferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOfferStore {
    /// Create an empty store stamped with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Create an empty store with an injected clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            clock,
        }
    }

    /// Create an empty store whose clock never moves.
    pub fn frozen_at(now: DateTime<Utc>) -> Self {
        Self::with_clock(Arc::new(move || now))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    /// Seed a fully-formed record, bypassing server assignment. Notifies subscribers.
    pub fn insert(&self, offer: Offer) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.offers.insert(offer.id.clone(), offer);
        inner.broadcast();
        Ok(())
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.read().map(|inner| inner.subscribers.len()).unwrap_or(0)
    }

    /// Make the next `n` subscribe calls fail with `Unavailable`.
    pub fn fail_next_subscribes(&self, n: usize) -> Result<(), StoreError> {
        self.write()?.faults.failing_subscribes = n;
        Ok(())
    }

    /// Drop every live subscription with an `Unavailable` error, as a lost connection would.
    pub fn break_subscriptions(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        for (_, sub) in inner.subscribers.drain() {
            let _ = sub
                .tx
                .send(Err(StoreError::Unavailable("connection lost".into())));
        }
        Ok(())
    }

    /// Reject every mutation issued by `actor_id` with `PermissionDenied`.
    pub fn deny_mutations_from(&self, actor_id: &str) -> Result<(), StoreError> {
        self.write()?.faults.denied_actors.insert(actor_id.to_string());
        Ok(())
    }

    fn apply(
        offer: &mut Offer,
        actor_id: &str,
        mutation: &FieldMutation,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match mutation {
            FieldMutation::AddToSet {
                field: SetField::InterestedActors,
                value,
            } => {
                if value != actor_id {
                    return Err(StoreError::PermissionDenied(
                        "actors may only register their own interest".into(),
                    ));
                }
                if offer.owner_id == *value {
                    return Err(StoreError::PermissionDenied(
                        "owner cannot register interest in own offer".into(),
                    ));
                }
                offer.interested_actor_ids.insert(value.clone());
            }
            FieldMutation::RemoveFromSet {
                field: SetField::InterestedActors,
                value,
            } => {
                if value != actor_id {
                    return Err(StoreError::PermissionDenied(
                        "actors may only withdraw their own interest".into(),
                    ));
                }
                if offer.claimed_by_actor_id.as_deref() == Some(value.as_str()) {
                    return Err(StoreError::PermissionDenied(
                        "the current claimant cannot withdraw interest".into(),
                    ));
                }
                offer.interested_actor_ids.remove(value);
            }
            FieldMutation::Increment {
                field: CounterField::ViewCount,
                by,
            } => {
                offer.view_count = offer.view_count.saturating_add(*by);
            }
            FieldMutation::SetStatus { status, claimed_by } => {
                Self::transition(offer, actor_id, *status, claimed_by.as_deref(), now)?;
            }
        }
        Ok(())
    }

    fn transition(
        offer: &mut Offer,
        actor_id: &str,
        status: StoredStatus,
        claimed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let is_owner = offer.owner_id == actor_id;
        let is_claimant = offer.claimed_by_actor_id.as_deref() == Some(actor_id);

        match (offer.stored_status, status, claimed_by) {
            (StoredStatus::Available, StoredStatus::Claimed, Some(claimant)) => {
                if claimant == offer.owner_id {
                    return Err(StoreError::PermissionDenied("owner cannot claim own offer".into()));
                }
                if !(is_owner || actor_id == claimant) {
                    return Err(StoreError::PermissionDenied(
                        "only the owner or the claimant may claim".into(),
                    ));
                }
                if now >= offer.expires_at {
                    return Err(StoreError::PermissionDenied("offer has expired".into()));
                }
                offer.claimed_by_actor_id = Some(claimant.to_string());
            }
            (StoredStatus::Claimed, StoredStatus::Available, None)
            | (StoredStatus::Claimed, StoredStatus::Completed, None) => {
                if !(is_owner || is_claimant) {
                    return Err(StoreError::PermissionDenied(
                        "only the owner or the claimant may change a claim".into(),
                    ));
                }
                offer.claimed_by_actor_id = None;
            }
            (StoredStatus::Available, StoredStatus::Cancelled, None)
            | (StoredStatus::Claimed, StoredStatus::Cancelled, None) => {
                if !is_owner {
                    return Err(StoreError::PermissionDenied("only the owner may cancel".into()));
                }
                offer.claimed_by_actor_id = None;
            }
            (from, to, claimant) => {
                return Err(StoreError::Invalid(format!(
                    "transition {} -> {} (claimant {:?}) is not allowed",
                    from, to, claimant
                )));
            }
        }

        offer.stored_status = status;
        Ok(())
    }
}

#[async_trait]
impl OfferStore for InMemoryOfferStore {
    async fn create(&self, draft: NewOffer) -> Result<Offer, StoreError> {
        let created_at = (self.clock)();
        draft
            .validate(created_at)
            .map_err(|_| StoreError::Invalid("expires_at must be after created_at".into()))?;

        let offer = draft.into_offer(uuid::Uuid::new_v4().to_string(), created_at);

        let mut inner = self.write()?;
        inner.offers.insert(offer.id.clone(), offer.clone());
        inner.broadcast();
        debug!(offer_id = %offer.id, owner = %offer.owner_id, "offer created");
        Ok(offer)
    }

    async fn get(&self, offer_id: &str) -> Result<Option<Offer>, StoreError> {
        Ok(self.read()?.offers.get(offer_id).cloned())
    }

    async fn query(&self, query: &OfferQuery) -> Result<Vec<Offer>, StoreError> {
        query
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        Ok(query.evaluate(self.read()?.offers.values()))
    }

    async fn subscribe(&self, query: OfferQuery) -> Result<StoreSubscription, StoreError> {
        query
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let mut inner = self.write()?;
        if inner.faults.failing_subscribes > 0 {
            inner.faults.failing_subscribes -= 1;
            warn!("subscribe refused by fault injection");
            return Err(StoreError::Unavailable("subscribe refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let initial = query.evaluate(inner.offers.values());
        // Receiver is alive; this cannot fail.
        let _ = tx.send(Ok(initial));

        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(id, Subscriber { query, tx });
        debug!(subscriber = id, "subscription opened");

        let weak = Arc::downgrade(&self.inner);
        Ok(StoreSubscription::new(rx).with_unsubscribe(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.write() {
                    inner.subscribers.remove(&id);
                }
            }
        }))
    }

    async fn mutate(
        &self,
        offer_id: &str,
        actor_id: &str,
        batch: Vec<FieldMutation>,
    ) -> Result<(), StoreError> {
        let now = (self.clock)();
        let mut inner = self.write()?;

        if inner.faults.denied_actors.contains(actor_id) {
            return Err(StoreError::PermissionDenied(format!(
                "writes from {} are not allowed",
                actor_id
            )));
        }

        let current = inner
            .offers
            .get(offer_id)
            .ok_or_else(|| StoreError::NotFound(offer_id.to_string()))?;

        // All-or-nothing: apply to a copy, swap in only if every mutation succeeds.
        let mut updated = current.clone();
        for mutation in &batch {
            Self::apply(&mut updated, actor_id, mutation, now)?;
        }

        if updated != *current {
            inner.offers.insert(offer_id.to_string(), updated);
            inner.broadcast();
        }
        Ok(())
    }

    async fn delete(&self, offer_id: &str, actor_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let Some(offer) = inner.offers.get(offer_id) else {
            return Ok(false);
        };
        if offer.owner_id != actor_id {
            return Err(StoreError::PermissionDenied("only the owner may delete".into()));
        }
        inner.offers.remove(offer_id);
        inner.broadcast();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 9, 30, 0).unwrap()
    }

    fn draft(owner: &str) -> NewOffer {
        NewOffer::new(owner, "Bakery", "Bagels", now() + Duration::hours(3))
    }

    fn add_interest(actor: &str) -> FieldMutation {
        FieldMutation::AddToSet {
            field: SetField::InterestedActors,
            value: actor.into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamp() {
        let store = InMemoryOfferStore::frozen_at(now());
        let offer = store.create(draft("donor")).await.unwrap();

        assert!(!offer.id.is_empty());
        assert_eq!(offer.created_at, now());
        assert_eq!(store.get(&offer.id).await.unwrap(), Some(offer));
    }

    #[tokio::test]
    async fn create_rejects_expiry_in_the_past() {
        let store = InMemoryOfferStore::frozen_at(now());
        let stale = NewOffer::new("donor", "Bakery", "Bagels", now() - Duration::minutes(1));
        let err = store.create(stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn subscribe_emits_current_set_then_updates() {
        let store = InMemoryOfferStore::frozen_at(now());
        let mut sub = store.subscribe(OfferQuery::all()).await.unwrap();

        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store.create(draft("donor")).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dropping_subscription_detaches() {
        let store = InMemoryOfferStore::frozen_at(now());
        let sub = store.subscribe(OfferQuery::all()).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(sub);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = InMemoryOfferStore::frozen_at(now());
        let offer = store.create(draft("donor")).await.unwrap();

        let batch = vec![
            FieldMutation::Increment {
                field: CounterField::ViewCount,
                by: 1,
            },
            add_interest("donor"),
        ];
        let err = store.mutate(&offer.id, "donor", batch).await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        let stored = store.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.view_count, 0);
    }

    #[tokio::test]
    async fn add_to_set_is_idempotent() {
        let store = InMemoryOfferStore::frozen_at(now());
        let offer = store.create(draft("donor")).await.unwrap();

        store.mutate(&offer.id, "r1", vec![add_interest("r1")]).await.unwrap();
        store.mutate(&offer.id, "r1", vec![add_interest("r1")]).await.unwrap();

        let stored = store.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.interest_count(), 1);
    }

    #[tokio::test]
    async fn claim_after_expiry_is_refused() {
        let later = now() + Duration::hours(5);
        let store = InMemoryOfferStore::frozen_at(now());
        let offer = store.create(draft("donor")).await.unwrap();

        let expired_store = InMemoryOfferStore::frozen_at(later);
        expired_store.insert(offer.clone()).unwrap();
        let err = expired_store
            .mutate(
                &offer.id,
                "r1",
                vec![FieldMutation::SetStatus {
                    status: StoredStatus::Claimed,
                    claimed_by: Some("r1".into()),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn mutate_missing_offer_is_not_found() {
        let store = InMemoryOfferStore::frozen_at(now());
        let err = store
            .mutate("ghost", "r1", vec![add_interest("r1")])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("ghost".into()));
    }

    #[tokio::test]
    async fn break_subscriptions_reports_unavailable() {
        let store = InMemoryOfferStore::frozen_at(now());
        let mut sub = store.subscribe(OfferQuery::all()).await.unwrap();
        let _ = sub.next().await;

        store.break_subscriptions().unwrap();
        assert!(matches!(sub.next().await, Some(Err(StoreError::Unavailable(_)))));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn only_owner_deletes() {
        let store = InMemoryOfferStore::frozen_at(now());
        let offer = store.create(draft("donor")).await.unwrap();

        assert!(store.delete(&offer.id, "r1").await.is_err());
        assert!(store.delete(&offer.id, "donor").await.unwrap());
        assert!(!store.delete(&offer.id, "donor").await.unwrap());
    }
}
