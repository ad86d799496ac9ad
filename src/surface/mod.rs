//! Surfaces - one independent Sync Channel + Projector unit per view.
//!
//! Each surface runs as its own tokio task owning its own subscription. Units
//! share nothing in-process except the store handle; a failure in one never
//! reaches its siblings.
//!
//! ```text
//!                ┌─────────── SurfaceUnit (task) ───────────┐
//! SurfaceHandle ─┼─▶ commands ─┐                            │
//!                │             ├─▶ project ─▶ SnapshotUpdated ──▶ Publisher
//! OfferStore ────┼─▶ SyncChannel┘     ▲                      │
//!                │                    └── GeocodeEnricher (map only)
//!                └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let context = SurfaceContext::new(store, publisher, &config);
//! let feed = SurfaceUnit::spawn(SurfaceKind::Feed, viewer.clone(), context.clone())?;
//!
//! feed.set_filters(FilterSet::new().with(Filter::category("Bakery")))?;
//! feed.set_sort(SortOrder::ExpiringSoon)?;
//! // ...
//! feed.shutdown().await;
//! ```

mod unit;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::Publisher;
use crate::config::{ChannelConfig, SyncConfig};
use crate::error::{Error, ValidationError};
use crate::geocode::GeocodeEnricher;
use crate::offer::{EffectiveStatus, StoredStatus};
use crate::projector::{Filter, FilterSet, SortOrder};
use crate::store::{Clock, Direction, OfferQuery, OfferStore, OrderField};
use crate::viewer::Viewer;

pub use unit::SurfaceUnit;

/// The views the rest of the system consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Searchable, sortable list of available offers.
    Feed,
    /// "My claims" board.
    Claims,
    /// "My offers" board.
    Donations,
    /// Geocoded map layer.
    Map,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::Feed => "feed",
            SurfaceKind::Claims => "claims",
            SurfaceKind::Donations => "donations",
            SurfaceKind::Map => "map",
        }
    }

    /// Store predicate a fresh surface of this kind subscribes with.
    pub fn default_query(&self, viewer: &Viewer) -> Result<OfferQuery, ValidationError> {
        let query = match self {
            SurfaceKind::Feed => OfferQuery::all()
                .with_status(StoredStatus::Available)
                .order_by(OrderField::CreatedAt, Direction::Desc),
            SurfaceKind::Map => OfferQuery::all().with_status(StoredStatus::Available),
            SurfaceKind::Claims => OfferQuery::all()
                .interested(self.require_viewer(viewer)?)
                .order_by(OrderField::ExpiresAt, Direction::Asc),
            SurfaceKind::Donations => OfferQuery::all()
                .owned_by(self.require_viewer(viewer)?)
                .order_by(OrderField::CreatedAt, Direction::Desc),
        };
        Ok(query)
    }

    /// Filters always applied underneath whatever the caller sets.
    pub fn base_filters(&self) -> FilterSet {
        match self {
            SurfaceKind::Feed => FilterSet::new().with(Filter::status([EffectiveStatus::Available])),
            SurfaceKind::Claims => FilterSet::new().with(Filter::OnlyInterested),
            SurfaceKind::Donations => FilterSet::new().with(Filter::OnlyMine),
            SurfaceKind::Map => FilterSet::new()
                .with(Filter::HasCoordinates)
                .with(Filter::status([EffectiveStatus::Available])),
        }
    }

    pub fn default_sort(&self) -> SortOrder {
        match self {
            SurfaceKind::Feed | SurfaceKind::Donations => SortOrder::Newest,
            SurfaceKind::Claims => SortOrder::ExpiringSoon,
            SurfaceKind::Map => SortOrder::Nearest,
        }
    }

    fn require_viewer<'a>(&self, viewer: &'a Viewer) -> Result<&'a str, ValidationError> {
        viewer
            .actor_id()
            .ok_or(ValidationError::ViewerRequired(self.as_str()))
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter changes sent to a running surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    /// Replace the caller-chosen filters. Base filters stay.
    SetFilters(FilterSet),
    SetSort(SortOrder),
    /// Replace the store predicate. Resets the subscription.
    SetQuery(OfferQuery),
    Shutdown,
}

/// What every surface needs from its host.
#[derive(Clone)]
pub struct SurfaceContext {
    pub store: Arc<dyn OfferStore>,
    pub publisher: Arc<dyn Publisher>,
    pub channel: ChannelConfig,
    pub clock: Clock,
    /// Used by the map surface only. Give each map surface its own enricher;
    /// share the cache between them instead.
    pub enricher: Option<Arc<GeocodeEnricher>>,
}

impl SurfaceContext {
    pub fn new(store: Arc<dyn OfferStore>, publisher: Arc<dyn Publisher>, config: &SyncConfig) -> Self {
        Self {
            store,
            publisher,
            channel: config.channel.clone(),
            clock: Arc::new(Utc::now),
            enricher: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<GeocodeEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Caller-side handle to a running surface.
///
/// Parameter changes are validated here, before they reach the task, so a
/// malformed filter or query fails at the call site.
pub struct SurfaceHandle {
    kind: SurfaceKind,
    viewer: Viewer,
    commands: mpsc::UnboundedSender<SurfaceCommand>,
    task: JoinHandle<()>,
}

impl SurfaceHandle {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn set_filters(&self, filters: FilterSet) -> Result<(), Error> {
        filters.validate(&self.viewer)?;
        self.send(SurfaceCommand::SetFilters(filters))
    }

    pub fn set_sort(&self, sort: SortOrder) -> Result<(), Error> {
        self.send(SurfaceCommand::SetSort(sort))
    }

    pub fn set_query(&self, query: OfferQuery) -> Result<(), Error> {
        query.validate()?;
        self.send(SurfaceCommand::SetQuery(query))
    }

    /// Stop the surface and wait for its task to unsubscribe.
    pub async fn shutdown(self) {
        // A closed channel means the task already ended.
        let _ = self.commands.send(SurfaceCommand::Shutdown);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn send(&self, command: SurfaceCommand) -> Result<(), Error> {
        self.commands
            .send(command)
            .map_err(|_| Error::SurfaceClosed(self.kind))
    }
}
