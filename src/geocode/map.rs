use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EnrichedSnapshot;
use crate::offer::{derive_status, Coordinates, EffectiveStatus, OfferId};

/// One marker on the map layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPin {
    pub offer_id: OfferId,
    pub title: String,
    pub category: String,
    pub coordinates: Coordinates,
    pub status: EffectiveStatus,
}

/// Pins for every offer with coordinates. Unresolved offers are left off the
/// map but stay in every other view.
pub fn map_pins(enriched: &EnrichedSnapshot, now: DateTime<Utc>) -> Vec<MapPin> {
    enriched
        .snapshot()
        .iter()
        .filter_map(|offer| {
            offer.coordinates.map(|coordinates| MapPin {
                offer_id: offer.id.clone(),
                title: offer.title.clone(),
                category: offer.category.clone(),
                coordinates,
                status: derive_status(offer, now),
            })
        })
        .collect()
}
