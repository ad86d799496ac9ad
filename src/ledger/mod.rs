//! Interest Ledger - idempotent interest registration.
//!
//! Interest is a set membership, not a counter: retried or duplicated
//! toggles from the same actor always land on a well-defined boolean state.
//! Writes are blind add-to-set / remove-from-set mutations. The caller's view
//! is never changed optimistically; the effect shows up in the next snapshot.

mod lifecycle;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::{OutboundEvent, OutboundPublisher, Publisher};
use crate::offer::{EffectiveStatus, Offer, OfferId};
use crate::store::{CounterField, FieldMutation, OfferStore, SetField, StoreError};

pub use lifecycle::LifecycleActions;

/// Outcome of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestState {
    Registered,
    Withdrawn,
}

/// A write was refused or its target vanished. Non-fatal and user-visible;
/// nothing local needs rolling back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationRejected {
    #[error("owners cannot register interest in their own offer {0}")]
    OwnOffer(OfferId),
    #[error("offer {0} no longer exists")]
    Vanished(OfferId),
    #[error("not permitted on offer {offer_id}: {reason}")]
    Denied { offer_id: OfferId, reason: String },
    #[error("offer {offer_id} is {status:?}, cannot {action}")]
    InvalidTransition {
        offer_id: OfferId,
        status: EffectiveStatus,
        action: &'static str,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl MutationRejected {
    pub(crate) fn from_store(offer_id: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => MutationRejected::Vanished(id),
            StoreError::PermissionDenied(reason) | StoreError::Invalid(reason) => {
                MutationRejected::Denied {
                    offer_id: offer_id.to_string(),
                    reason,
                }
            }
            StoreError::Unavailable(reason) => MutationRejected::Unavailable(reason),
        }
    }
}

/// Maps interest toggles and view events onto atomic store mutations.
pub struct InterestLedger {
    store: Arc<dyn OfferStore>,
    publisher: Arc<dyn Publisher>,
}

impl InterestLedger {
    pub fn new(store: Arc<dyn OfferStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Flip `actor_id`'s membership in the offer's interested set.
    ///
    /// Membership is judged from `offer` as last seen in a snapshot. Joining
    /// also counts as a view.
    pub async fn toggle_interest(
        &self,
        offer: &Offer,
        actor_id: &str,
    ) -> Result<InterestState, MutationRejected> {
        if offer.is_owned_by(actor_id) {
            return Err(MutationRejected::OwnOffer(offer.id.clone()));
        }

        let (state, batch) = if offer.is_interested(actor_id) {
            if offer.is_claimed_by(actor_id) {
                return Err(MutationRejected::Denied {
                    offer_id: offer.id.clone(),
                    reason: "the current claimant cannot withdraw interest".into(),
                });
            }
            (
                InterestState::Withdrawn,
                vec![FieldMutation::RemoveFromSet {
                    field: SetField::InterestedActors,
                    value: actor_id.to_string(),
                }],
            )
        } else {
            (
                InterestState::Registered,
                vec![
                    FieldMutation::AddToSet {
                        field: SetField::InterestedActors,
                        value: actor_id.to_string(),
                    },
                    FieldMutation::Increment {
                        field: CounterField::ViewCount,
                        by: 1,
                    },
                ],
            )
        };

        self.store
            .mutate(&offer.id, actor_id, batch)
            .await
            .map_err(|err| {
                warn!(offer_id = %offer.id, actor_id, error = %err, "interest toggle rejected");
                MutationRejected::from_store(&offer.id, err)
            })?;

        info!(offer_id = %offer.id, actor_id, ?state, "interest toggled");
        let event = OutboundEvent::InterestToggled {
            offer_id: offer.id.clone(),
            actor_id: actor_id.to_string(),
            new_state: state,
        };
        if let Err(err) = self.publisher.emit(&event) {
            warn!(error = %err, "failed to publish InterestToggled");
        }

        Ok(state)
    }

    /// Count a view event.
    pub async fn record_view(&self, offer_id: &str, actor_id: &str) -> Result<(), MutationRejected> {
        self.store
            .mutate(
                offer_id,
                actor_id,
                vec![FieldMutation::Increment {
                    field: CounterField::ViewCount,
                    by: 1,
                }],
            )
            .await
            .map_err(|err| MutationRejected::from_store(offer_id, err))
    }

    pub fn interest_count(offer: &Offer) -> usize {
        offer.interest_count()
    }

    pub fn is_interested(offer: &Offer, actor_id: &str) -> bool {
        offer.is_interested(actor_id)
    }
}
