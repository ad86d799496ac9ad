//! Sync Channel - ordered full snapshots of a store query.
//!
//! Each emission replaces the previous one in full. Consumers never see
//! deltas and never patch an old snapshot in place.
//!
//! Connection handling is deliberately bounded: a failed subscribe is retried
//! once after `retry_delay`, and a broken stream gets one resubscribe. Beyond
//! that the channel yields a [`ChannelError`] and goes degraded.
//!
//! ## Example
//!
//! ```ignore
//! let mut channel = SyncChannel::open(store, OfferQuery::all(), config.channel).await?;
//! while let Some(next) = channel.next_snapshot().await {
//!     match next {
//!         Ok(snapshot) => render(&snapshot),
//!         Err(err) => show_degraded(err),
//!     }
//! }
//! ```

mod snapshot;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::ValidationError;
use crate::store::{OfferQuery, OfferStore, StoreError, StoreSubscription};

pub use snapshot::FullSnapshot;

/// Subscription or connection failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The query was rejected before any connection attempt.
    #[error("invalid query: {0}")]
    Invalid(#[from] ValidationError),
    /// Could not establish the subscription.
    #[error("could not subscribe after {attempts} attempt(s): {source}")]
    Connect { attempts: u32, source: StoreError },
    /// The subscription broke and could not be re-established.
    #[error("subscription lost: {source}")]
    Lost { source: StoreError },
}

/// A live subscription to one query, yielding [`FullSnapshot`]s in order.
pub struct SyncChannel {
    store: Arc<dyn OfferStore>,
    query: OfferQuery,
    config: ChannelConfig,
    subscription: Option<StoreSubscription>,
    generation: u64,
    recovering: bool,
    degraded: bool,
}

impl SyncChannel {
    /// Validate `query` and subscribe, retrying once on failure.
    pub async fn open(
        store: Arc<dyn OfferStore>,
        query: OfferQuery,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        let mut channel = Self {
            store,
            query: Self::capped(query, &config),
            config,
            subscription: None,
            generation: 0,
            recovering: false,
            degraded: false,
        };
        channel.connect().await?;
        Ok(channel)
    }

    fn capped(mut query: OfferQuery, config: &ChannelConfig) -> OfferQuery {
        if query.limit.is_none() {
            query.limit = Some(config.max_results);
        }
        query
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.query.validate()?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.subscribe(self.query.clone()).await {
                Ok(subscription) => {
                    debug!(attempts, "channel subscribed");
                    self.subscription = Some(subscription);
                    self.degraded = false;
                    return Ok(());
                }
                Err(source) if attempts <= self.config.max_retries => {
                    warn!(error = %source, attempts, "subscribe failed, retrying");
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(source) => {
                    warn!(error = %source, attempts, "subscribe failed, giving up");
                    self.degraded = true;
                    return Err(ChannelError::Connect { attempts, source });
                }
            }
        }
    }

    /// Next snapshot, or `None` once the channel is degraded or closed.
    pub async fn next_snapshot(&mut self) -> Option<Result<FullSnapshot, ChannelError>> {
        loop {
            if self.degraded {
                return None;
            }
            let subscription = self.subscription.as_mut()?;

            let source = match subscription.next().await {
                Some(Ok(offers)) => {
                    self.recovering = false;
                    self.generation += 1;
                    return Some(Ok(FullSnapshot::new(self.generation, offers)));
                }
                Some(Err(source)) => source,
                None => StoreError::Unavailable("subscription closed by store".into()),
            };

            self.subscription = None;
            if self.recovering {
                warn!(error = %source, "subscription failed again before recovering");
                self.degraded = true;
                return Some(Err(ChannelError::Lost { source }));
            }

            warn!(error = %source, "subscription lost, resubscribing once");
            self.recovering = true;
            tokio::time::sleep(self.config.retry_delay()).await;
            match self.store.subscribe(self.query.clone()).await {
                Ok(subscription) => self.subscription = Some(subscription),
                Err(source) => {
                    self.degraded = true;
                    return Some(Err(ChannelError::Lost { source }));
                }
            }
        }
    }

    /// Replace the query. The prior subscription is dropped before the new one
    /// is opened; snapshots from the old query are never emitted afterwards.
    pub async fn reset(&mut self, query: OfferQuery) -> Result<(), ChannelError> {
        self.subscription = None;
        self.recovering = false;
        self.query = Self::capped(query, &self.config);
        info!(generation = self.generation, "channel reset");
        self.connect().await
    }

    /// Continue generation numbering after `generation`, so a consumer that
    /// reopens a channel never sees generations go backwards.
    pub fn continue_from(mut self, generation: u64) -> Self {
        self.generation = self.generation.max(generation);
        self
    }

    /// Drop the subscription. Subsequent `next_snapshot` calls return `None`.
    pub fn close(&mut self) {
        self.subscription = None;
    }

    /// Generation of the most recently emitted snapshot (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> &OfferQuery {
        &self.query
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}
