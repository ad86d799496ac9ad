//! Interest toggles and lifecycle transitions against the in-memory store.

mod support;

use std::sync::Arc;

use chrono::Duration;
use offer_sync::{
    ClaimsBoard, EffectiveStatus, FullSnapshot, InMemoryOfferStore, InMemoryQueue, InterestLedger, InterestState,
    LifecycleActions, MutationRejected, NewOffer, Offer, OfferQuery, OfferStore, OutboundEvent,
    StoredStatus, SyncChannel, Viewer, ViewerRole,
};
use support::{capture_logs, decoded, fast_channel, now};

struct Harness {
    store: InMemoryOfferStore,
    queue: InMemoryQueue,
    ledger: InterestLedger,
    actions: LifecycleActions,
}

impl Harness {
    fn new() -> Self {
        capture_logs();
        let store = InMemoryOfferStore::frozen_at(now());
        let queue = InMemoryQueue::new();
        Self {
            ledger: InterestLedger::new(Arc::new(store.clone()), Arc::new(queue.clone())),
            actions: LifecycleActions::new(Arc::new(store.clone())),
            store,
            queue,
        }
    }

    async fn offer(&self, hours: i64) -> Offer {
        self.store
            .create(NewOffer::new("donor", "Meals", "Lasagne", now() + Duration::hours(hours)))
            .await
            .unwrap()
    }

    async fn reload(&self, offer: &Offer) -> Offer {
        self.store.get(&offer.id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn toggle_twice_returns_to_not_interested() {
    let h = Harness::new();
    let offer = h.offer(3).await;

    let first = h.ledger.toggle_interest(&offer, "r1").await.unwrap();
    let seen = h.reload(&offer).await;
    let second = h.ledger.toggle_interest(&seen, "r1").await.unwrap();

    assert_eq!(first, InterestState::Registered);
    assert_eq!(second, InterestState::Withdrawn);
    assert!(!h.reload(&offer).await.is_interested("r1"));

    let states: Vec<InterestState> = decoded(&h.queue)
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::InterestToggled { new_state, .. } => Some(new_state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![InterestState::Registered, InterestState::Withdrawn]);
}

#[tokio::test]
async fn retried_registration_from_a_stale_snapshot_is_idempotent() {
    let h = Harness::new();
    let offer = h.offer(3).await;

    h.ledger.toggle_interest(&offer, "r1").await.unwrap();
    h.ledger.toggle_interest(&offer, "r1").await.unwrap();

    let stored = h.reload(&offer).await;
    assert_eq!(stored.interest_count(), 1);
    assert!(stored.is_interested("r1"));
}

#[tokio::test]
async fn concurrent_actors_each_land_once() {
    let h = Harness::new();
    let offer = h.offer(3).await;

    let toggles = ["r1", "r2", "r3"].map(|actor| h.ledger.toggle_interest(&offer, actor));
    let results = futures::future::join_all(toggles).await;
    assert!(results.iter().all(|r| *r == Ok(InterestState::Registered)));

    let stored = h.reload(&offer).await;
    assert_eq!(stored.interest_count(), 3);
    assert_eq!(stored.view_count, 3);
}

#[tokio::test]
async fn toggle_is_seen_through_the_next_snapshot() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    let mut channel = SyncChannel::open(Arc::new(h.store.clone()), OfferQuery::all(), fast_channel())
        .await
        .unwrap();
    let before = channel.next_snapshot().await.unwrap().unwrap();
    assert!(!before.get(&offer.id).unwrap().is_interested("r1"));

    h.ledger.toggle_interest(&offer, "r1").await.unwrap();

    let after = channel.next_snapshot().await.unwrap().unwrap();
    assert!(after.get(&offer.id).unwrap().is_interested("r1"));
    assert!(!before.get(&offer.id).unwrap().is_interested("r1"));
}

#[tokio::test]
async fn claim_then_complete_clears_the_claimant() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    h.ledger.toggle_interest(&offer, "r1").await.unwrap();

    let seen = h.reload(&offer).await;
    h.actions.claim(&seen, "donor", "r1", now()).await.unwrap();
    let claimed = h.reload(&offer).await;
    assert_eq!(claimed.stored_status, StoredStatus::Claimed);
    assert_eq!(claimed.claimed_by_actor_id.as_deref(), Some("r1"));
    assert!(claimed.check_invariants().is_empty());

    h.actions.complete(&claimed, "r1", now()).await.unwrap();
    let done = h.reload(&offer).await;
    assert_eq!(done.stored_status, StoredStatus::Completed);
    assert_eq!(done.claimed_by_actor_id, None);
    assert!(done.is_interested("r1"));
    assert!(done.check_invariants().is_empty());
}

#[tokio::test]
async fn owner_cannot_hand_to_an_uninterested_actor() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    let err = h.actions.claim(&offer, "donor", "stranger", now()).await.unwrap_err();
    assert!(matches!(err, MutationRejected::Denied { .. }));
}

#[tokio::test]
async fn expired_offer_cannot_be_claimed_but_can_be_cancelled() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    let later = now() + Duration::hours(4);

    let err = h.actions.claim(&offer, "r1", "r1", later).await.unwrap_err();
    assert_eq!(
        err,
        MutationRejected::InvalidTransition {
            offer_id: offer.id.clone(),
            status: EffectiveStatus::Expired,
            action: "claim",
        }
    );

    h.actions.cancel(&offer, "donor", later).await.unwrap();
    assert_eq!(h.reload(&offer).await.stored_status, StoredStatus::Cancelled);
}

#[tokio::test]
async fn only_the_owner_cancels() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    let err = h.actions.cancel(&offer, "r1", now()).await.unwrap_err();
    assert!(matches!(err, MutationRejected::Denied { .. }));
    assert_eq!(h.reload(&offer).await.stored_status, StoredStatus::Available);
}

#[tokio::test]
async fn release_returns_the_offer_to_the_pool() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    h.actions.claim(&offer, "r2", "r2", now()).await.unwrap();

    let claimed = h.reload(&offer).await;
    h.actions.release_claim(&claimed, "r2", now()).await.unwrap();

    let released = h.reload(&offer).await;
    assert_eq!(released.stored_status, StoredStatus::Available);
    assert_eq!(released.claimed_by_actor_id, None);
}

#[tokio::test]
async fn claimant_cannot_withdraw_interest() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    h.actions.claim(&offer, "r1", "r1", now()).await.unwrap();

    let claimed = h.reload(&offer).await;
    let err = h.ledger.toggle_interest(&claimed, "r1").await.unwrap_err();
    assert!(matches!(err, MutationRejected::Denied { .. }));

    let stored = h.reload(&offer).await;
    assert!(stored.is_interested("r1"));
    let viewer = Viewer::new("r1", ViewerRole::Receiver);
    let board = ClaimsBoard::build(&FullSnapshot::new(1, vec![stored]), &viewer, now()).unwrap();
    assert_eq!(board.claimed_by_me.len(), 1);
}

#[tokio::test]
async fn stale_withdraw_is_refused_once_the_claim_lands() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    h.ledger.toggle_interest(&offer, "r1").await.unwrap();
    let interested = h.reload(&offer).await;

    h.actions.claim(&interested, "donor", "r1", now()).await.unwrap();

    // Seen before the claim: looks like a plain withdraw.
    let err = h.ledger.toggle_interest(&interested, "r1").await.unwrap_err();
    assert!(matches!(err, MutationRejected::Denied { .. }));
    assert!(h.reload(&offer).await.is_interested("r1"));
}

#[tokio::test]
async fn interest_can_be_withdrawn_after_release() {
    let h = Harness::new();
    let offer = h.offer(3).await;
    h.actions.claim(&offer, "r1", "r1", now()).await.unwrap();
    h.actions.release_claim(&h.reload(&offer).await, "r1", now()).await.unwrap();

    let released = h.reload(&offer).await;
    let state = h.ledger.toggle_interest(&released, "r1").await.unwrap();
    assert_eq!(state, InterestState::Withdrawn);
    assert!(!h.reload(&offer).await.is_interested("r1"));
}
