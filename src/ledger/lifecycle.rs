//! Explicit status transitions: claim, release, complete, cancel.
//!
//! Preconditions are checked against the derived status of the caller's
//! latest snapshot; the store re-checks them when the write lands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::MutationRejected;
use crate::offer::{derive_status, EffectiveStatus, Offer, StoredStatus};
use crate::store::{FieldMutation, OfferStore, SetField};

pub struct LifecycleActions {
    store: Arc<dyn OfferStore>,
}

impl LifecycleActions {
    pub fn new(store: Arc<dyn OfferStore>) -> Self {
        Self { store }
    }

    /// Claim an available offer for `claimant`.
    ///
    /// Either the claimant claims for itself, or the owner hands the offer to
    /// one of the interested actors. A claimant always ends up in the
    /// interested set, so the claim shows on its claims board.
    pub async fn claim(
        &self,
        offer: &Offer,
        actor_id: &str,
        claimant: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MutationRejected> {
        Self::require(offer, now, "claim", &[EffectiveStatus::Available])?;

        if offer.is_owned_by(claimant) {
            return Err(MutationRejected::OwnOffer(offer.id.clone()));
        }
        let permitted = if offer.is_owned_by(actor_id) {
            offer.is_interested(claimant)
        } else {
            actor_id == claimant
        };
        if !permitted {
            return Err(MutationRejected::Denied {
                offer_id: offer.id.clone(),
                reason: format!("{} may not claim on behalf of {}", actor_id, claimant),
            });
        }

        let mut batch = Vec::with_capacity(2);
        if !offer.is_interested(claimant) {
            batch.push(FieldMutation::AddToSet {
                field: SetField::InterestedActors,
                value: claimant.to_string(),
            });
        }
        batch.push(Self::status_change(StoredStatus::Claimed, Some(claimant)));
        self.commit(offer, actor_id, StoredStatus::Claimed, batch).await
    }

    /// Return a claimed offer to the pool.
    pub async fn release_claim(
        &self,
        offer: &Offer,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MutationRejected> {
        Self::require(offer, now, "release", &[EffectiveStatus::Claimed])?;
        let batch = vec![Self::status_change(StoredStatus::Available, None)];
        self.commit(offer, actor_id, StoredStatus::Available, batch).await
    }

    /// Mark a claimed offer as picked up.
    pub async fn complete(
        &self,
        offer: &Offer,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MutationRejected> {
        Self::require(offer, now, "complete", &[EffectiveStatus::Claimed])?;
        let batch = vec![Self::status_change(StoredStatus::Completed, None)];
        self.commit(offer, actor_id, StoredStatus::Completed, batch).await
    }

    /// Withdraw an offer. Owners may also tidy up expired ones.
    pub async fn cancel(
        &self,
        offer: &Offer,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MutationRejected> {
        Self::require(
            offer,
            now,
            "cancel",
            &[
                EffectiveStatus::Available,
                EffectiveStatus::Claimed,
                EffectiveStatus::Expired,
            ],
        )?;
        let batch = vec![Self::status_change(StoredStatus::Cancelled, None)];
        self.commit(offer, actor_id, StoredStatus::Cancelled, batch).await
    }

    fn require(
        offer: &Offer,
        now: DateTime<Utc>,
        action: &'static str,
        allowed: &[EffectiveStatus],
    ) -> Result<(), MutationRejected> {
        let status = derive_status(offer, now);
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(MutationRejected::InvalidTransition {
                offer_id: offer.id.clone(),
                status,
                action,
            })
        }
    }

    fn status_change(status: StoredStatus, claimed_by: Option<&str>) -> FieldMutation {
        FieldMutation::SetStatus {
            status,
            claimed_by: claimed_by.map(str::to_string),
        }
    }

    async fn commit(
        &self,
        offer: &Offer,
        actor_id: &str,
        status: StoredStatus,
        batch: Vec<FieldMutation>,
    ) -> Result<(), MutationRejected> {
        match self.store.mutate(&offer.id, actor_id, batch).await {
            Ok(()) => {
                info!(offer_id = %offer.id, actor_id, %status, "status transition accepted");
                Ok(())
            }
            Err(err) => {
                warn!(offer_id = %offer.id, actor_id, %status, error = %err, "status transition rejected");
                Err(MutationRejected::from_store(&offer.id, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::NewOffer;
    use crate::store::InMemoryOfferStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 4, 18, 0, 0).unwrap()
    }

    async fn offer_with_interest(store: &InMemoryOfferStore, actor: &str) -> Offer {
        let offer = store
            .create(NewOffer::new("donor", "Bakery", "Rolls", now() + Duration::hours(2)))
            .await
            .unwrap();
        store
            .mutate(
                &offer.id,
                actor,
                vec![FieldMutation::AddToSet {
                    field: SetField::InterestedActors,
                    value: actor.into(),
                }],
            )
            .await
            .unwrap();
        store.get(&offer.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn owner_hands_offer_to_interested_actor() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;

        actions.claim(&offer, "donor", "r1", now()).await.unwrap();

        let stored = store.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.stored_status, StoredStatus::Claimed);
        assert_eq!(stored.claimed_by_actor_id.as_deref(), Some("r1"));
        assert!(stored.check_invariants().is_empty());
    }

    #[tokio::test]
    async fn owner_cannot_hand_to_uninterested_actor() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;

        let err = actions.claim(&offer, "donor", "r2", now()).await.unwrap_err();
        assert!(matches!(err, MutationRejected::Denied { .. }));
    }

    #[tokio::test]
    async fn expired_offer_cannot_be_claimed() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;

        let err = actions
            .claim(&offer, "r1", "r1", now() + Duration::hours(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MutationRejected::InvalidTransition {
                status: EffectiveStatus::Expired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn complete_clears_claimant_and_closes() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;
        actions.claim(&offer, "r1", "r1", now()).await.unwrap();

        let claimed = store.get(&offer.id).await.unwrap().unwrap();
        actions.complete(&claimed, "donor", now()).await.unwrap();

        let done = store.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(derive_status(&done, now()), EffectiveStatus::Completed);
        assert!(done.claimed_by_actor_id.is_none());
    }

    #[tokio::test]
    async fn only_owner_cancels() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;

        assert!(actions.cancel(&offer, "r1", now()).await.is_err());
        actions.cancel(&offer, "donor", now()).await.unwrap();

        let cancelled = store.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(cancelled.stored_status, StoredStatus::Cancelled);
    }

    #[tokio::test]
    async fn release_returns_offer_to_pool() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;
        actions.claim(&offer, "r1", "r1", now()).await.unwrap();

        let claimed = store.get(&offer.id).await.unwrap().unwrap();
        actions.release_claim(&claimed, "r1", now()).await.unwrap();

        let released = store.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(derive_status(&released, now()), EffectiveStatus::Available);
    }

    #[tokio::test]
    async fn self_claim_registers_interest() {
        let store = InMemoryOfferStore::frozen_at(now());
        let actions = LifecycleActions::new(Arc::new(store.clone()));
        let offer = offer_with_interest(&store, "r1").await;

        actions.claim(&offer, "r2", "r2", now()).await.unwrap();

        let claimed = store.get(&offer.id).await.unwrap().unwrap();
        assert!(claimed.is_interested("r2"));
        assert_eq!(claimed.claimed_by_actor_id.as_deref(), Some("r2"));
    }
}
