//! Off-critical-path coordinate enrichment of a snapshot.
//!
//! Every offer with an address is resolved independently. A failure for one
//! address downgrades that offer to `Unresolved` and nothing else. Results are
//! merged into a new snapshot; the input is never patched.
//!
//! Each enricher tracks the newest generation it has been asked about. When a
//! newer snapshot arrives while an older one is still resolving, the older
//! result is discarded so stale coordinates never reach the map.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{GeocodeCache, GeocodeProvider, Resolution};
use crate::bus::{OutboundEvent, OutboundPublisher, Publisher};
use crate::offer::{Offer, OfferId};
use crate::sync::FullSnapshot;

/// A snapshot with resolved coordinates merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedSnapshot {
    snapshot: FullSnapshot,
    resolutions: BTreeMap<OfferId, Resolution>,
}

impl EnrichedSnapshot {
    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn snapshot(&self) -> &FullSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> FullSnapshot {
        self.snapshot
    }

    /// Resolution for an offer; `None` for offers with no address.
    pub fn resolution(&self, offer_id: &str) -> Option<Resolution> {
        self.resolutions.get(offer_id).copied()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolutions.values().filter(|r| r.is_resolved()).count()
    }
}

pub struct GeocodeEnricher {
    cache: Arc<GeocodeCache>,
    provider: Arc<dyn GeocodeProvider>,
    limiter: Semaphore,
    latest: AtomicU64,
    announced: Mutex<HashMap<OfferId, Resolution>>,
    publisher: Arc<dyn Publisher>,
}

impl GeocodeEnricher {
    /// `max_concurrent` bounds in-flight provider calls (at least one).
    pub fn new(
        cache: Arc<GeocodeCache>,
        provider: Arc<dyn GeocodeProvider>,
        publisher: Arc<dyn Publisher>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            cache,
            provider,
            limiter: Semaphore::new(max_concurrent.max(1)),
            latest: AtomicU64::new(0),
            announced: Mutex::new(HashMap::new()),
            publisher,
        }
    }

    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    /// Record that `generation` exists. Any in-flight enrichment of an older
    /// generation will be discarded. Returns false if `generation` is
    /// already stale.
    pub fn supersede(&self, generation: u64) -> bool {
        self.latest.fetch_max(generation, Ordering::SeqCst) <= generation
    }

    pub fn is_stale(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) > generation
    }

    /// Resolve every addressed offer and merge the results into a new
    /// snapshot. `None` when a newer generation arrived in the meantime.
    pub async fn enrich(&self, snapshot: &FullSnapshot) -> Option<EnrichedSnapshot> {
        let generation = snapshot.generation;
        if !self.supersede(generation) {
            debug!(generation, "snapshot already superseded, skipping enrichment");
            return None;
        }

        let resolutions: BTreeMap<OfferId, Resolution> =
            join_all(snapshot.iter().map(|offer| self.resolve_offer(offer)))
                .await
                .into_iter()
                .flatten()
                .collect();

        if self.is_stale(generation) {
            debug!(generation, "discarding stale enrichment");
            return None;
        }

        let offers = snapshot
            .iter()
            .map(|offer| match resolutions.get(&offer.id) {
                Some(resolution) => offer.with_coordinates(resolution.coordinates()),
                None => offer.clone(),
            })
            .collect();

        self.announce(&resolutions);
        debug!(
            generation,
            addressed = resolutions.len(),
            "enrichment merged"
        );

        Some(EnrichedSnapshot {
            snapshot: FullSnapshot::new(generation, offers),
            resolutions,
        })
    }

    async fn resolve_offer(&self, offer: &Offer) -> Option<(OfferId, Resolution)> {
        if let Some(coordinates) = offer.coordinates {
            return Some((offer.id.clone(), Resolution::Resolved(coordinates)));
        }
        if !offer.has_address() {
            return None;
        }
        let resolution = self
            .cache
            .get_or_resolve(&offer.pickup_address, |address| self.lookup(address))
            .await;
        Some((offer.id.clone(), resolution))
    }

    async fn lookup(&self, address: String) -> Resolution {
        let Ok(_permit) = self.limiter.acquire().await else {
            return Resolution::Unresolved;
        };
        match self.provider.resolve(&address).await {
            Ok(Some(coordinates)) => Resolution::Resolved(coordinates),
            Ok(None) => {
                debug!("geocode returned no result");
                Resolution::Unresolved
            }
            Err(err) => {
                warn!(error = %err, "geocode failed, offer stays unresolved");
                Resolution::Unresolved
            }
        }
    }

    // Only changes are published; a cached address seen again is silent.
    // Offers that left the snapshot are forgotten.
    fn announce(&self, resolutions: &BTreeMap<OfferId, Resolution>) {
        let mut fresh = Vec::new();
        {
            let mut announced = self.announced.lock().unwrap_or_else(PoisonError::into_inner);
            announced.retain(|id, _| resolutions.contains_key(id));
            for (id, resolution) in resolutions {
                if announced.insert(id.clone(), *resolution) != Some(*resolution) {
                    fresh.push(OutboundEvent::GeocodeResolved {
                        offer_id: id.clone(),
                        resolution: *resolution,
                    });
                }
            }
        }

        for event in &fresh {
            if let Err(err) = self.publisher.emit(event) {
                warn!(error = %err, "failed to publish GeocodeResolved");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryQueue;
    use crate::geocode::GeocodeFailure;
    use crate::offer::{Coordinates, NewOffer};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixed;

    #[async_trait]
    impl GeocodeProvider for Fixed {
        async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, GeocodeFailure> {
            match address {
                "nowhere" => Ok(None),
                "broken" => Err(GeocodeFailure::Timeout),
                _ => Ok(Some(Coordinates::new(48.85, 2.35))),
            }
        }
    }

    fn offer(id: &str, address: &str) -> Offer {
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap();
        NewOffer::new("donor", "Produce", id, now + Duration::hours(4))
            .with_address(address)
            .into_offer(id.into(), now)
    }

    fn enricher(queue: &InMemoryQueue) -> GeocodeEnricher {
        GeocodeEnricher::new(
            Arc::new(GeocodeCache::new()),
            Arc::new(Fixed),
            Arc::new(queue.clone()),
            2,
        )
    }

    #[tokio::test]
    async fn merges_into_a_new_snapshot() {
        let queue = InMemoryQueue::new();
        let snapshot = FullSnapshot::new(
            1,
            vec![offer("a", "1 Rue de Rivoli"), offer("b", "nowhere"), offer("c", "")],
        );

        let enriched = enricher(&queue).enrich(&snapshot).await.unwrap();

        assert!(snapshot.iter().all(|o| o.coordinates.is_none()));
        assert!(enriched.snapshot().get("a").unwrap().coordinates.is_some());
        assert_eq!(enriched.resolution("b"), Some(Resolution::Unresolved));
        assert_eq!(enriched.resolution("c"), None);
        assert_eq!(enriched.resolved_count(), 1);
        assert_eq!(queue.decoded_by_type("GeocodeResolved").len(), 2);
    }

    #[tokio::test]
    async fn unchanged_resolutions_are_not_republished() {
        let queue = InMemoryQueue::new();
        let enricher = enricher(&queue);

        enricher.enrich(&FullSnapshot::new(1, vec![offer("a", "x")])).await.unwrap();
        enricher.enrich(&FullSnapshot::new(2, vec![offer("a", "x")])).await.unwrap();

        assert_eq!(queue.decoded_by_type("GeocodeResolved").len(), 1);
    }

    #[tokio::test]
    async fn departed_offers_are_forgotten() {
        let queue = InMemoryQueue::new();
        let enricher = enricher(&queue);

        enricher
            .enrich(&FullSnapshot::new(1, vec![offer("a", "x"), offer("b", "y")]))
            .await
            .unwrap();
        enricher.enrich(&FullSnapshot::new(2, vec![offer("b", "y")])).await.unwrap();
        assert_eq!(enricher.announced.lock().unwrap().len(), 1);

        enricher
            .enrich(&FullSnapshot::new(3, vec![offer("a", "x"), offer("b", "y")]))
            .await
            .unwrap();
        assert_eq!(queue.decoded_by_type("GeocodeResolved").len(), 3);
    }

    #[tokio::test]
    async fn older_generation_is_refused() {
        let queue = InMemoryQueue::new();
        let enricher = enricher(&queue);
        assert!(enricher.supersede(5));

        let result = enricher.enrich(&FullSnapshot::new(4, vec![offer("a", "x")])).await;
        assert!(result.is_none());
        assert!(queue.is_empty());
    }
}
