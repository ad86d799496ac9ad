//! Per-actor boards built on top of `project`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{project, Filter, FilterSet, ProjectedOffer, SortOrder};
use crate::error::ValidationError;
use crate::offer::{EffectiveStatus, ViewerStatus};
use crate::sync::FullSnapshot;
use crate::viewer::Viewer;

/// "My claims": offers the viewer registered interest in, grouped by what
/// that means for the viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsBoard {
    /// Still available; soonest expiry first.
    pub pending: Vec<ProjectedOffer>,
    pub claimed_by_me: Vec<ProjectedOffer>,
    pub claimed_by_other: Vec<ProjectedOffer>,
    /// Completed, cancelled or expired.
    pub closed: Vec<ProjectedOffer>,
}

impl ClaimsBoard {
    pub fn build(
        snapshot: &FullSnapshot,
        viewer: &Viewer,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let filters = FilterSet::new().with(Filter::OnlyInterested);
        let rows = project(snapshot, &filters, SortOrder::ExpiringSoon, viewer, now)?;

        let mut board = ClaimsBoard::default();
        for row in rows {
            match row.viewer_status {
                ViewerStatus::Available => board.pending.push(row),
                ViewerStatus::ClaimedByMe => board.claimed_by_me.push(row),
                ViewerStatus::ClaimedByOther => board.claimed_by_other.push(row),
                ViewerStatus::Completed | ViewerStatus::Cancelled | ViewerStatus::Expired => {
                    board.closed.push(row)
                }
            }
        }
        SortOrder::Newest.sort(&mut board.closed);
        Ok(board)
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.claimed_by_me.len() + self.claimed_by_other.len() + self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// "My offers": the viewer's own offers grouped by lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonationsBoard {
    pub active: Vec<ProjectedOffer>,
    pub claimed: Vec<ProjectedOffer>,
    pub completed: Vec<ProjectedOffer>,
    pub expired: Vec<ProjectedOffer>,
    pub cancelled: Vec<ProjectedOffer>,
}

impl DonationsBoard {
    pub fn build(
        snapshot: &FullSnapshot,
        viewer: &Viewer,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let filters = FilterSet::new().with(Filter::OnlyMine);
        let rows = project(snapshot, &filters, SortOrder::Newest, viewer, now)?;

        let mut board = DonationsBoard::default();
        for row in rows {
            match row.status {
                EffectiveStatus::Available => board.active.push(row),
                EffectiveStatus::Claimed => board.claimed.push(row),
                EffectiveStatus::Completed => board.completed.push(row),
                EffectiveStatus::Expired => board.expired.push(row),
                EffectiveStatus::Cancelled => board.cancelled.push(row),
            }
        }
        SortOrder::ExpiringSoon.sort(&mut board.active);
        Ok(board)
    }

    /// Total interest across the viewer's still-open offers.
    pub fn open_interest(&self) -> usize {
        self.active
            .iter()
            .chain(&self.claimed)
            .map(|row| row.offer.interest_count())
            .sum()
    }
}
