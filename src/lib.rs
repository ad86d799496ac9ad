//! Live, derived views over a shared set of perishable-goods offers.
//!
//! Offers live in a hosted document store that many actors mutate at once.
//! This crate keeps a correct view of them per surface:
//!
//! ```text
//! OfferStore ─▶ SyncChannel ─▶ FullSnapshot ─┬─▶ derive_status ─▶ project ─▶ SnapshotUpdated
//!     ▲                                      └─▶ GeocodeEnricher ─▶ map pins
//!     └── InterestLedger / LifecycleActions (fire and forget; seen in the next snapshot)
//! ```
//!
//! - [`offer`]: the record model and the pure status deriver.
//! - [`store`]: the store boundary and an in-memory implementation.
//! - [`sync`]: ordered full-snapshot subscriptions with bounded retry.
//! - [`ledger`]: idempotent interest toggles and lifecycle transitions.
//! - [`projector`]: filters, sorts and per-actor boards.
//! - [`geocode`]: cached, coalesced, fault-isolated address resolution.
//! - [`surface`]: one independent task per view.
//! - [`bus`]: outbound events for the UI and other collaborators.

pub mod bus;
pub mod config;
pub mod error;
pub mod geocode;
pub mod ledger;
pub mod offer;
pub mod projector;
pub mod store;
pub mod surface;
pub mod sync;
pub mod telemetry;
pub mod viewer;

pub use bus::{Event, InMemoryQueue, OutboundEvent, OutboundPublisher, PublishError, Publisher};
pub use crate::config::{ChannelConfig, ConfigError, GeocodeConfig, SyncConfig};
pub use error::{Error, Result, ValidationError};
pub use geocode::{
    map_pins, normalize_address, EnrichedSnapshot, GeocodeCache, GeocodeEnricher, GeocodeFailure,
    GeocodeProvider, MapPin, Resolution,
};
#[cfg(feature = "http-geocoder")]
pub use geocode::HttpGeocoder;
pub use ledger::{InterestLedger, InterestState, LifecycleActions, MutationRejected};
pub use offer::{
    derive_status, refine_for_viewer, Coordinates, DietaryFlag, EffectiveStatus, NewOffer, Offer,
    StoredStatus, ViewerStatus,
};
pub use projector::{project, ClaimsBoard, DonationsBoard, Filter, FilterSet, ProjectedOffer, SortOrder};
pub use store::{InMemoryOfferStore, OfferQuery, OfferStore, StoreError};
pub use surface::{SurfaceCommand, SurfaceContext, SurfaceHandle, SurfaceKind, SurfaceUnit};
pub use sync::{ChannelError, FullSnapshot, SyncChannel};
pub use telemetry::init_tracing;
pub use viewer::{Viewer, ViewerRole};
