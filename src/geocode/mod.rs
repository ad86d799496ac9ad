//! Geocode Enricher - address to coordinates, cached and fault-isolated.
//!
//! ```text
//! FullSnapshot ─▶ GeocodeEnricher ─┬─▶ GeocodeCache (normalized key, coalesced)
//!                                  │        └─▶ GeocodeProvider (rate limited)
//!                                  └─▶ EnrichedSnapshot ─▶ map_pins
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let cache = Arc::new(GeocodeCache::new());
//! let provider = Arc::new(HttpGeocoder::new(&config.geocode)?);
//! let enricher = GeocodeEnricher::new(cache, provider, publisher, config.geocode.max_concurrent);
//!
//! if let Some(enriched) = enricher.enrich(&snapshot).await {
//!     let pins = map_pins(&enriched, Utc::now());
//! }
//! ```

mod cache;
mod enricher;
mod map;
mod normalize;
mod provider;

pub use cache::{GeocodeCache, Resolution};
pub use enricher::{EnrichedSnapshot, GeocodeEnricher};
pub use map::{map_pins, MapPin};
pub use normalize::normalize_address;
#[cfg(feature = "http-geocoder")]
pub use provider::HttpGeocoder;
pub use provider::{GeocodeFailure, GeocodeProvider};
