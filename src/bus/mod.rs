//! Outbound events.
//!
//! Every surface, the ledger and the enricher report what happened through a
//! [`Publisher`]. Payloads are typed [`OutboundEvent`]s encoded with bitcode.
//!
//! ```text
//! SurfaceUnit ──SnapshotUpdated / ChannelError──┐
//! InterestLedger ──InterestToggled──────────────┼──▶ Publisher ──▶ UI / collaborators
//! GeocodeEnricher ──GeocodeResolved─────────────┘
//! ```

mod in_memory_queue;
mod publisher;

use serde::{Deserialize, Serialize};

use crate::geocode::Resolution;
use crate::ledger::InterestState;
use crate::offer::{ActorId, OfferId};
use crate::projector::ProjectedOffer;
use crate::surface::SurfaceKind;

pub use in_memory_queue::InMemoryQueue;
pub use publisher::{Event, OutboundPublisher, PublishError, Publisher};

/// Events produced for the UI and other collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundEvent {
    /// A surface re-projected; `list` replaces whatever it showed before.
    SnapshotUpdated {
        surface: SurfaceKind,
        generation: u64,
        list: Vec<ProjectedOffer>,
    },
    /// The store accepted an interest toggle.
    InterestToggled {
        offer_id: OfferId,
        actor_id: ActorId,
        new_state: InterestState,
    },
    /// One offer's address was resolved (or permanently marked unresolved).
    GeocodeResolved {
        offer_id: OfferId,
        resolution: Resolution,
    },
    /// A surface's channel failed; it now shows a degraded empty state.
    ChannelError { surface: SurfaceKind, cause: String },
}

impl OutboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboundEvent::SnapshotUpdated { .. } => "SnapshotUpdated",
            OutboundEvent::InterestToggled { .. } => "InterestToggled",
            OutboundEvent::GeocodeResolved { .. } => "GeocodeResolved",
            OutboundEvent::ChannelError { .. } => "ChannelError",
        }
    }
}
