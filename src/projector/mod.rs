//! View Projector - pure filtering and sorting of a snapshot.
//!
//! `project` has no side effects and never reads the clock: identical
//! `(snapshot, filters, sort, viewer, now)` always yields identical output.
//!
//! ## Example
//!
//! ```ignore
//! use offer_sync::projector::{project, Filter, FilterSet, SortOrder};
//!
//! let filters = FilterSet::new()
//!     .with(Filter::category("Bakery"))
//!     .with(Filter::expires_within_hours(6));
//!
//! let list = project(&snapshot, &filters, SortOrder::ExpiringSoon, &viewer, now)?;
//! ```

mod boards;
mod filter;
mod sort;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::offer::{derive_status, refine_for_viewer, EffectiveStatus, Offer, ViewerStatus};
use crate::sync::FullSnapshot;
use crate::viewer::Viewer;

pub use boards::{ClaimsBoard, DonationsBoard};
pub use filter::{Filter, FilterSet};
pub use sort::SortOrder;

/// One row of a projected list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedOffer {
    pub offer: Offer,
    pub status: EffectiveStatus,
    pub viewer_status: ViewerStatus,
    /// Distance from the viewer, when both sides have coordinates.
    pub distance_km: Option<f64>,
}

impl ProjectedOffer {
    pub fn new(offer: &Offer, viewer: &Viewer, now: DateTime<Utc>) -> Self {
        let status = derive_status(offer, now);
        let viewer_status = refine_for_viewer(offer, status, viewer.actor_id().unwrap_or_default());
        let distance_km = match (viewer.coordinates, offer.coordinates) {
            (Some(from), Some(to)) => Some(from.distance_km(&to)),
            _ => None,
        };
        Self {
            offer: offer.clone(),
            status,
            viewer_status,
            distance_km,
        }
    }
}

/// Filter and order a snapshot for one surface.
pub fn project(
    snapshot: &FullSnapshot,
    filters: &FilterSet,
    sort: SortOrder,
    viewer: &Viewer,
    now: DateTime<Utc>,
) -> Result<Vec<ProjectedOffer>, ValidationError> {
    filters.validate(viewer)?;

    let mut list: Vec<ProjectedOffer> = snapshot
        .iter()
        .filter(|offer| filters.matches(offer, viewer, now))
        .map(|offer| ProjectedOffer::new(offer, viewer, now))
        .collect();

    sort.sort(&mut list);
    Ok(list)
}
