//! Offer records - the canonical shape of a perishable-goods listing.
//!
//! Offers are owned by the remote store. Everything in this crate treats an
//! `Offer` as an immutable value taken from a snapshot; changes are made by
//! issuing store mutations and waiting for the next snapshot.
//!
//! ## Example
//!
//! ```ignore
//! use offer_sync::offer::{derive_status, NewOffer, StoredStatus};
//!
//! let draft = NewOffer::new("owner-1", "Bakery", "Day-old bread", expires_at)
//!     .with_address("221B Baker St");
//! let offer = store.create(draft).await?;
//!
//! assert_eq!(offer.stored_status, StoredStatus::Available);
//! let status = derive_status(&offer, now);
//! ```

mod status;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use status::{derive_status, expires_within, refine_for_viewer, time_remaining, EffectiveStatus, ViewerStatus};

/// Opaque identifier assigned by the store when an offer is created.
pub type OfferId = String;

/// Opaque identifier for an actor (donor, receiver, admin).
pub type ActorId = String;

/// Status as persisted by the store.
///
/// Only the explicit actor actions live here. Expiry is never stored; see
/// [`derive_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredStatus {
    Available,
    Claimed,
    Completed,
    Cancelled,
}

impl StoredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoredStatus::Available => "available",
            StoredStatus::Claimed => "claimed",
            StoredStatus::Completed => "completed",
            StoredStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StoredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dietary and allergen tags. Used only for filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietaryFlag {
    Vegetarian,
    Vegan,
    GlutenFree,
    DairyFree,
    NutFree,
    Halal,
    Kosher,
    /// Free-form allergen marker, e.g. "sesame".
    ContainsAllergen(String),
}

impl DietaryFlag {
    /// Build an allergen marker, case-folded so "Sesame" and "sesame" compare equal.
    pub fn allergen(name: &str) -> Self {
        DietaryFlag::ContainsAllergen(name.trim().to_lowercase())
    }
}

/// A resolved geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    const EARTH_RADIUS_KM: f64 = 6371.0088;

    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// A perishable-goods listing as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub owner_id: ActorId,
    /// Display name of the owner, searched by free-text filters.
    pub owner_name: String,
    pub stored_status: StoredStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub category: String,
    pub title: String,
    pub description: String,
    pub quantity_label: String,
    pub dietary_flags: BTreeSet<DietaryFlag>,
    pub interested_actor_ids: BTreeSet<ActorId>,
    pub claimed_by_actor_id: Option<ActorId>,
    pub view_count: u64,
    pub pickup_address: String,
    /// Filled in by the geocode enricher. Never authoritative.
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// A broken record invariant, reported by [`Offer::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `claimed_by_actor_id` is set but the stored status is not `claimed`, or vice versa.
    ClaimMismatch { status: StoredStatus, claimed_by: Option<ActorId> },
    /// The owner appears in its own interested set.
    OwnerInterested,
    /// `expires_at` is not after `created_at`.
    ExpiryBeforeCreation,
}

impl Offer {
    /// Number of distinct actors that registered interest.
    pub fn interest_count(&self) -> usize {
        self.interested_actor_ids.len()
    }

    pub fn is_interested(&self, actor_id: &str) -> bool {
        self.interested_actor_ids.contains(actor_id)
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.owner_id == actor_id
    }

    pub fn is_claimed_by(&self, actor_id: &str) -> bool {
        self.claimed_by_actor_id.as_deref() == Some(actor_id)
    }

    pub fn has_address(&self) -> bool {
        !self.pickup_address.trim().is_empty()
    }

    /// Concatenation of every field searched by free-text filters, lower-cased.
    pub fn search_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.title, self.description, self.category, self.owner_name
        )
        .to_lowercase()
    }

    /// Return a copy carrying the given coordinates. The original is untouched.
    pub fn with_coordinates(&self, coordinates: Option<Coordinates>) -> Offer {
        Offer {
            coordinates,
            ..self.clone()
        }
    }

    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        let claimed = self.stored_status == StoredStatus::Claimed;
        if claimed != self.claimed_by_actor_id.is_some() {
            violations.push(InvariantViolation::ClaimMismatch {
                status: self.stored_status,
                claimed_by: self.claimed_by_actor_id.clone(),
            });
        }
        if self.interested_actor_ids.contains(&self.owner_id) {
            violations.push(InvariantViolation::OwnerInterested);
        }
        if self.expires_at <= self.created_at {
            violations.push(InvariantViolation::ExpiryBeforeCreation);
        }

        violations
    }
}

/// Creation payload. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOffer {
    pub owner_id: ActorId,
    pub owner_name: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub quantity_label: String,
    pub expires_at: DateTime<Utc>,
    pub dietary_flags: BTreeSet<DietaryFlag>,
    pub pickup_address: String,
}

impl NewOffer {
    pub fn new(
        owner_id: impl Into<ActorId>,
        category: impl Into<String>,
        title: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let owner_id = owner_id.into();
        Self {
            owner_name: owner_id.clone(),
            owner_id,
            category: category.into(),
            title: title.into(),
            description: String::new(),
            quantity_label: String::new(),
            expires_at,
            dietary_flags: BTreeSet::new(),
            pickup_address: String::new(),
        }
    }

    pub fn with_owner_name(mut self, name: impl Into<String>) -> Self {
        self.owner_name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity_label = quantity.into();
        self
    }

    pub fn with_flag(mut self, flag: DietaryFlag) -> Self {
        self.dietary_flags.insert(flag);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.pickup_address = address.into();
        self
    }

    /// Check the creation-time invariant against the server timestamp.
    pub fn validate(&self, created_at: DateTime<Utc>) -> Result<(), InvariantViolation> {
        if self.expires_at <= created_at {
            return Err(InvariantViolation::ExpiryBeforeCreation);
        }
        Ok(())
    }

    /// Materialize the stored record.
    pub fn into_offer(self, id: OfferId, created_at: DateTime<Utc>) -> Offer {
        Offer {
            id,
            owner_id: self.owner_id,
            owner_name: self.owner_name,
            stored_status: StoredStatus::Available,
            created_at,
            expires_at: self.expires_at,
            category: self.category,
            title: self.title,
            description: self.description,
            quantity_label: self.quantity_label,
            dietary_flags: self.dietary_flags,
            interested_actor_ids: BTreeSet::new(),
            claimed_by_actor_id: None,
            view_count: 0,
            pickup_address: self.pickup_address,
            coordinates: None,
        }
    }
}
