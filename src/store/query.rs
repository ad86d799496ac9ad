//! OfferQuery - the predicate a subscription or one-shot read is evaluated with.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::offer::{ActorId, Offer, StoredStatus};

/// Fields the store can order results by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    CreatedAt,
    ExpiresAt,
    ViewCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

/// Store-side predicate: equality/range on status, expiry and owner,
/// array-membership on the interested set, ordered by up to two keys and
/// capped in size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferQuery {
    pub statuses: Option<BTreeSet<StoredStatus>>,
    pub expires_after: Option<DateTime<Utc>>,
    pub owner_id: Option<ActorId>,
    pub interested_actor: Option<ActorId>,
    pub claimed_by: Option<ActorId>,
    pub order_by: Vec<(OrderField, Direction)>,
    pub limit: Option<usize>,
}

impl OfferQuery {
    /// Match every offer.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(self, status: StoredStatus) -> Self {
        self.with_statuses([status])
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = StoredStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn expiring_after(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_after = Some(instant);
        self
    }

    pub fn owned_by(mut self, owner_id: impl Into<ActorId>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn interested(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.interested_actor = Some(actor_id.into());
        self
    }

    pub fn claimed_by(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.claimed_by = Some(actor_id.into());
        self
    }

    pub fn order_by(mut self, field: OrderField, direction: Direction) -> Self {
        self.order_by.push((field, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject combinations the store cannot serve.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_by.len() > 2 {
            return Err(ValidationError::TooManyOrderKeys(self.order_by.len()));
        }
        if self.limit == Some(0) {
            return Err(ValidationError::ZeroLimit);
        }
        if self.statuses.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(ValidationError::EmptyStatusSet);
        }
        Ok(())
    }

    pub fn matches(&self, offer: &Offer) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&offer.stored_status) {
                return false;
            }
        }
        if let Some(after) = self.expires_after {
            if offer.expires_at <= after {
                return false;
            }
        }
        if let Some(owner) = &self.owner_id {
            if &offer.owner_id != owner {
                return false;
            }
        }
        if let Some(actor) = &self.interested_actor {
            if !offer.interested_actor_ids.contains(actor) {
                return false;
            }
        }
        if let Some(claimant) = &self.claimed_by {
            if offer.claimed_by_actor_id.as_ref() != Some(claimant) {
                return false;
            }
        }
        true
    }

    /// Filter, order and cap a candidate set the way the store would.
    ///
    /// Ties on the requested keys fall back to `id` so results are stable.
    pub fn evaluate<'a>(&self, offers: impl IntoIterator<Item = &'a Offer>) -> Vec<Offer> {
        let mut matched: Vec<Offer> = offers
            .into_iter()
            .filter(|offer| self.matches(offer))
            .cloned()
            .collect();

        matched.sort_by(|a, b| self.compare(a, b));

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }

    fn compare(&self, a: &Offer, b: &Offer) -> Ordering {
        for (field, direction) in &self.order_by {
            let ord = match field {
                OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderField::ExpiresAt => a.expires_at.cmp(&b.expires_at),
                OrderField::ViewCount => a.view_count.cmp(&b.view_count),
            };
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    }
}
