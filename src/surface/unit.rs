//! The per-surface task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use super::{SurfaceCommand, SurfaceContext, SurfaceHandle, SurfaceKind};
use crate::bus::{OutboundEvent, OutboundPublisher};
use crate::error::ValidationError;
use crate::geocode::{EnrichedSnapshot, GeocodeEnricher};
use crate::projector::{project, FilterSet, SortOrder};
use crate::store::OfferQuery;
use crate::sync::{ChannelError, FullSnapshot, SyncChannel};
use crate::viewer::Viewer;

/// One surface: a Sync Channel, its projection parameters and, for the map,
/// the enrichment in flight. Owned by exactly one task.
pub struct SurfaceUnit {
    kind: SurfaceKind,
    viewer: Viewer,
    context: SurfaceContext,
    channel: Option<SyncChannel>,
    generation: u64,
    base_filters: FilterSet,
    filters: FilterSet,
    sort: SortOrder,
    snapshot: FullSnapshot,
    enriched: Option<EnrichedSnapshot>,
    enrichment: Option<JoinHandle<()>>,
    enriched_tx: mpsc::UnboundedSender<EnrichedSnapshot>,
    enriched_rx: mpsc::UnboundedReceiver<EnrichedSnapshot>,
}

impl SurfaceUnit {
    /// Start a surface of `kind` for `viewer` on the current tokio runtime.
    ///
    /// The default query is validated before anything is spawned. Connection
    /// failures are reported through the publisher, not returned.
    pub fn spawn(
        kind: SurfaceKind,
        viewer: Viewer,
        context: SurfaceContext,
    ) -> Result<SurfaceHandle, ValidationError> {
        let query = kind.default_query(&viewer)?;
        query.validate()?;

        let (enriched_tx, enriched_rx) = mpsc::unbounded_channel();
        let unit = SurfaceUnit {
            kind,
            viewer: viewer.clone(),
            context,
            channel: None,
            generation: 0,
            base_filters: kind.base_filters(),
            filters: FilterSet::new(),
            sort: kind.default_sort(),
            snapshot: FullSnapshot::empty(0),
            enriched: None,
            enrichment: None,
            enriched_tx,
            enriched_rx,
        };

        let (commands, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("surface", kind = %kind);
        let task = tokio::spawn(unit.run(query, rx).instrument(span));

        Ok(SurfaceHandle {
            kind,
            viewer,
            commands,
            task,
        })
    }

    async fn run(mut self, query: OfferQuery, mut commands: mpsc::UnboundedReceiver<SurfaceCommand>) {
        self.connect(query).await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(SurfaceCommand::Shutdown) => break,
                    Some(SurfaceCommand::SetFilters(filters)) => {
                        self.filters = filters;
                        self.publish_projection();
                    }
                    Some(SurfaceCommand::SetSort(sort)) => {
                        self.sort = sort;
                        self.publish_projection();
                    }
                    Some(SurfaceCommand::SetQuery(query)) => self.reset(query).await,
                },
                next = next_snapshot(&mut self.channel) => match next {
                    Some(Ok(snapshot)) => self.accept(snapshot),
                    Some(Err(err)) => self.degrade(err),
                    None => self.channel = None,
                },
                Some(enriched) = self.enriched_rx.recv() => self.accept_enriched(enriched),
            }
        }

        self.cancel_enrichment();
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        info!("surface stopped");
    }

    async fn connect(&mut self, query: OfferQuery) {
        let opened = SyncChannel::open(
            Arc::clone(&self.context.store),
            query,
            self.context.channel.clone(),
        )
        .await;
        match opened {
            Ok(channel) => {
                info!("surface subscribed");
                self.channel = Some(channel.continue_from(self.generation));
            }
            Err(err) => self.degrade(err),
        }
    }

    // Unsubscribe first; nothing from the old predicate may surface afterwards,
    // not even through a re-projection before the new first snapshot.
    async fn reset(&mut self, query: OfferQuery) {
        self.cancel_enrichment();
        self.enriched = None;
        self.snapshot = FullSnapshot::empty(self.generation);
        match self.channel.as_mut() {
            Some(channel) => {
                if let Err(err) = channel.reset(query).await {
                    self.degrade(err);
                }
            }
            None => self.connect(query).await,
        }
    }

    fn accept(&mut self, snapshot: FullSnapshot) {
        debug!(generation = snapshot.generation, offers = snapshot.len(), "snapshot received");
        self.generation = snapshot.generation;
        self.snapshot = snapshot;
        if self.kind == SurfaceKind::Map {
            self.spawn_enrichment();
        }
        self.publish_projection();
    }

    fn accept_enriched(&mut self, enriched: EnrichedSnapshot) {
        if enriched.generation() != self.snapshot.generation {
            debug!(generation = enriched.generation(), "dropping enrichment for an old snapshot");
            return;
        }
        self.enriched = Some(enriched);
        self.publish_projection();
    }

    // Degraded state is empty, never the last good list.
    fn degrade(&mut self, err: ChannelError) {
        warn!(error = %err, "surface degraded");
        self.channel = None;
        self.cancel_enrichment();
        self.enriched = None;
        self.snapshot = FullSnapshot::empty(self.generation);

        self.emit(OutboundEvent::ChannelError {
            surface: self.kind,
            cause: err.to_string(),
        });
        self.emit(OutboundEvent::SnapshotUpdated {
            surface: self.kind,
            generation: self.generation,
            list: Vec::new(),
        });
    }

    fn spawn_enrichment(&mut self) {
        let Some(enricher) = self.context.enricher.clone() else {
            return;
        };
        self.cancel_enrichment();
        enricher.supersede(self.snapshot.generation);

        let snapshot = self.snapshot.clone();
        let tx = self.enriched_tx.clone();
        self.enrichment = Some(tokio::spawn(
            async move {
                if let Some(enriched) = enricher.enrich(&snapshot).await {
                    // Receiver gone means the surface stopped.
                    let _ = tx.send(enriched);
                }
            }
            .in_current_span(),
        ));
    }

    fn cancel_enrichment(&mut self) {
        if let Some(task) = self.enrichment.take() {
            task.abort();
        }
    }

    /// The snapshot projections read from. The map prefers the enriched copy
    /// and falls back to whatever the cache already knows.
    fn source(&self) -> FullSnapshot {
        if self.kind != SurfaceKind::Map {
            return self.snapshot.clone();
        }
        match (&self.enriched, &self.context.enricher) {
            (Some(enriched), _) if enriched.generation() == self.snapshot.generation => {
                enriched.snapshot().clone()
            }
            (_, Some(enricher)) => with_cached_coordinates(&self.snapshot, enricher),
            (_, None) => self.snapshot.clone(),
        }
    }

    fn publish_projection(&self) {
        let filters = self.base_filters.union(&self.filters);
        let now = self.context.now();
        match project(&self.source(), &filters, self.sort, &self.viewer, now) {
            Ok(list) => self.emit(OutboundEvent::SnapshotUpdated {
                surface: self.kind,
                generation: self.generation,
                list,
            }),
            Err(err) => warn!(error = %err, "projection rejected"),
        }
    }

    fn emit(&self, event: OutboundEvent) {
        if let Err(err) = self.context.publisher.emit(&event) {
            warn!(error = %err, event_type = event.event_type(), "failed to publish");
        }
    }
}

async fn next_snapshot(channel: &mut Option<SyncChannel>) -> Option<Result<FullSnapshot, ChannelError>> {
    match channel {
        Some(channel) => channel.next_snapshot().await,
        None => std::future::pending().await,
    }
}

fn with_cached_coordinates(snapshot: &FullSnapshot, enricher: &GeocodeEnricher) -> FullSnapshot {
    let offers = snapshot
        .iter()
        .map(|offer| match offer.coordinates {
            Some(_) => offer.clone(),
            None => offer.with_coordinates(
                enricher
                    .cache()
                    .get(&offer.pickup_address)
                    .and_then(|resolution| resolution.coordinates()),
            ),
        })
        .collect();
    FullSnapshot::new(snapshot.generation, offers)
}
