//! Effective status derivation.
//!
//! The effective lifecycle state is computed from `stored_status`,
//! `expires_at` and a caller-supplied `now`. It is never persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Offer, StoredStatus};

/// Lifecycle state of an offer at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Available,
    Claimed,
    Completed,
    Cancelled,
    Expired,
}

impl EffectiveStatus {
    /// Terminal states never change again without a new stored transition.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            EffectiveStatus::Completed | EffectiveStatus::Cancelled | EffectiveStatus::Expired
        )
    }
}

/// Effective status refined for a particular viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerStatus {
    Available,
    ClaimedByMe,
    ClaimedByOther,
    Completed,
    Cancelled,
    Expired,
}

/// Derive the effective status. First match wins:
/// completed, cancelled, claimed, expired, available.
///
/// A claim is never invalidated by time passing.
pub fn derive_status(offer: &Offer, now: DateTime<Utc>) -> EffectiveStatus {
    match offer.stored_status {
        StoredStatus::Completed => EffectiveStatus::Completed,
        StoredStatus::Cancelled => EffectiveStatus::Cancelled,
        StoredStatus::Claimed => EffectiveStatus::Claimed,
        StoredStatus::Available if now >= offer.expires_at => EffectiveStatus::Expired,
        StoredStatus::Available => EffectiveStatus::Available,
    }
}

/// Apply the per-viewer refinement on top of a base status.
pub fn refine_for_viewer(offer: &Offer, base: EffectiveStatus, viewer_id: &str) -> ViewerStatus {
    match base {
        EffectiveStatus::Available => ViewerStatus::Available,
        EffectiveStatus::Claimed => match offer.claimed_by_actor_id.as_deref() {
            Some(claimant) if claimant == viewer_id => ViewerStatus::ClaimedByMe,
            _ => ViewerStatus::ClaimedByOther,
        },
        EffectiveStatus::Completed => ViewerStatus::Completed,
        EffectiveStatus::Cancelled => ViewerStatus::Cancelled,
        EffectiveStatus::Expired => ViewerStatus::Expired,
    }
}

/// Time left before expiry, or `None` once `now` has reached `expires_at`.
pub fn time_remaining(offer: &Offer, now: DateTime<Utc>) -> Option<Duration> {
    let left = offer.expires_at - now;
    (left > Duration::zero()).then_some(left)
}

/// True when the offer has not yet expired and will do so within `window`.
pub fn expires_within(offer: &Offer, now: DateTime<Utc>, window: Duration) -> bool {
    time_remaining(offer, now).is_some_and(|left| left <= window)
}
