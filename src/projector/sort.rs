//! Sort comparators. Exactly one is active per projection.
//!
//! Every comparator ends in `created_at` descending and then `id`, so the
//! order is total and the output deterministic.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::ProjectedOffer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// `created_at` descending.
    #[default]
    Newest,
    /// `expires_at` ascending.
    ExpiringSoon,
    /// Interest count descending.
    MostPopular,
    /// Distance from the viewer ascending; offers without coordinates last.
    Nearest,
}

impl SortOrder {
    pub fn compare(&self, a: &ProjectedOffer, b: &ProjectedOffer) -> Ordering {
        let primary = match self {
            SortOrder::Newest => Ordering::Equal,
            SortOrder::ExpiringSoon => a.offer.expires_at.cmp(&b.offer.expires_at),
            SortOrder::MostPopular => b.offer.interest_count().cmp(&a.offer.interest_count()),
            SortOrder::Nearest => by_distance(a.distance_km, b.distance_km),
        };
        primary.then_with(|| newest_first(a, b))
    }

    pub fn sort(&self, items: &mut [ProjectedOffer]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

fn newest_first(a: &ProjectedOffer, b: &ProjectedOffer) -> Ordering {
    b.offer
        .created_at
        .cmp(&a.offer.created_at)
        .then_with(|| a.offer.id.cmp(&b.offer.id))
}

fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
