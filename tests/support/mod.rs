//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use offer_sync::{
    normalize_address, ChannelConfig, Coordinates, GeocodeFailure, GeocodeProvider, InMemoryQueue,
    NewOffer, Offer, OutboundEvent, ProjectedOffer, StoredStatus, SurfaceKind,
};

/// Route crate logs through the test harness capture. Idempotent.
pub fn capture_logs() {
    offer_sync::telemetry::init_test_tracing();
}

/// Fixed "now" shared by every suite.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

pub fn fast_channel() -> ChannelConfig {
    ChannelConfig {
        retry_delay_ms: 1,
        max_retries: 1,
        max_results: 100,
    }
}

/// Builder for fully-formed offers, bypassing the store.
pub struct OfferFixture {
    offer: Offer,
}

pub fn offer(id: &str) -> OfferFixture {
    OfferFixture {
        offer: NewOffer::new("donor", "Produce", id, now() + Duration::hours(4))
            .into_offer(id.to_string(), now() - Duration::hours(1)),
    }
}

impl OfferFixture {
    pub fn owner(mut self, owner: &str) -> Self {
        self.offer.owner_id = owner.to_string();
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.offer.category = category.to_string();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.offer.title = title.to_string();
        self
    }

    /// Negative durations put the expiry in the past.
    pub fn expires_in(mut self, delta: Duration) -> Self {
        self.offer.expires_at = now() + delta;
        self
    }

    pub fn created_ago(mut self, delta: Duration) -> Self {
        self.offer.created_at = now() - delta;
        self
    }

    pub fn status(mut self, status: StoredStatus) -> Self {
        self.offer.stored_status = status;
        self
    }

    pub fn claimed_by(mut self, actor: &str) -> Self {
        self.offer.stored_status = StoredStatus::Claimed;
        self.offer.claimed_by_actor_id = Some(actor.to_string());
        self.offer.interested_actor_ids.insert(actor.to_string());
        self
    }

    pub fn interested(mut self, actors: &[&str]) -> Self {
        for actor in actors {
            self.offer.interested_actor_ids.insert(actor.to_string());
        }
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.offer.pickup_address = address.to_string();
        self
    }

    pub fn at(mut self, coordinates: Coordinates) -> Self {
        self.offer.coordinates = Some(coordinates);
        self
    }

    pub fn build(self) -> Offer {
        self.offer
    }
}

/// Scripted geocoder that counts provider calls.
///
/// Unknown addresses resolve to nothing. An optional delay keeps lookups in
/// flight long enough for concurrent callers to overlap.
pub struct CountingGeocoder {
    answers: HashMap<String, Result<Option<Coordinates>, GeocodeFailure>>,
    delay: Option<StdDuration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl CountingGeocoder {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn resolving(mut self, address: &str, coordinates: Coordinates) -> Self {
        self.answers
            .insert(normalize_address(address), Ok(Some(coordinates)));
        self
    }

    pub fn failing(mut self, address: &str, failure: GeocodeFailure) -> Self {
        self.answers.insert(normalize_address(address), Err(failure));
        self
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, address: &str) -> usize {
        let key = normalize_address(address);
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| normalize_address(seen) == key)
            .count()
    }
}

#[async_trait]
impl GeocodeProvider for CountingGeocoder {
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, GeocodeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(address.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .get(&normalize_address(address))
            .cloned()
            .unwrap_or(Ok(None))
    }
}

/// Every decoded event published so far.
pub fn decoded(queue: &InMemoryQueue) -> Vec<OutboundEvent> {
    queue
        .events()
        .iter()
        .map(|event| event.decode().unwrap())
        .collect()
}

/// `SnapshotUpdated` lists published by one surface, oldest first.
pub fn updates_for(queue: &InMemoryQueue, surface: SurfaceKind) -> Vec<Vec<ProjectedOffer>> {
    decoded(queue)
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::SnapshotUpdated {
                surface: s, list, ..
            } if s == surface => Some(list),
            _ => None,
        })
        .collect()
}

/// Wait until `ready` holds for the published events, or panic after 2s.
pub async fn wait_until<F>(queue: &InMemoryQueue, mut ready: F)
where
    F: FnMut(&[OutboundEvent]) -> bool,
{
    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
    loop {
        if ready(&decoded(queue)) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached; events: {:?}", queue.event_types());
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
}

/// Wait until the latest list published by `surface` satisfies `ready`.
pub async fn wait_for_list<F>(queue: &InMemoryQueue, surface: SurfaceKind, mut ready: F) -> Vec<ProjectedOffer>
where
    F: FnMut(&[ProjectedOffer]) -> bool,
{
    wait_until(queue, |_| {
        updates_for(queue, surface)
            .last()
            .is_some_and(|list| ready(list))
    })
    .await;
    updates_for(queue, surface).pop().unwrap_or_default()
}

pub fn ids(list: &[ProjectedOffer]) -> Vec<&str> {
    list.iter().map(|row| row.offer.id.as_str()).collect()
}
