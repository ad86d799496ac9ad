use std::sync::Arc;

use crate::offer::Offer;

/// The complete, ordered set of offers matching a query at one moment.
///
/// Immutable once emitted. Cloning shares the underlying records.
#[derive(Debug, Clone, PartialEq)]
pub struct FullSnapshot {
    pub generation: u64,
    offers: Arc<Vec<Offer>>,
}

impl FullSnapshot {
    pub fn new(generation: u64, offers: Vec<Offer>) -> Self {
        Self {
            generation,
            offers: Arc::new(offers),
        }
    }

    /// The degraded state shown when a channel fails: nothing, never stale data.
    pub fn empty(generation: u64) -> Self {
        Self::new(generation, Vec::new())
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Offer> {
        self.offers.iter()
    }

    pub fn get(&self, offer_id: &str) -> Option<&Offer> {
        self.offers.iter().find(|offer| offer.id == offer_id)
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
