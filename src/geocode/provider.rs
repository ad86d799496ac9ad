//! Geocoding boundary: one address in, coordinates or nothing out.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::offer::Coordinates;

/// A single provider call failed. Isolated to that address; the enricher
/// absorbs it as `Unresolved` and never propagates it further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rate limit exceeded")]
    RateLimited,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider timed out")]
    Timeout,
    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// Resolves a postal address. `Ok(None)` means the provider found nothing.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, GeocodeFailure>;
}

/// Google-style geocoding response body.
#[derive(Debug, Deserialize)]
pub(crate) struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

impl GeocodeResponse {
    pub(crate) fn into_coordinates(self) -> Result<Option<Coordinates>, GeocodeFailure> {
        match self.status.as_str() {
            "OK" => Ok(self
                .results
                .into_iter()
                .next()
                .map(|r| Coordinates::new(r.geometry.location.lat, r.geometry.location.lng))),
            "ZERO_RESULTS" => Ok(None),
            "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Err(GeocodeFailure::RateLimited),
            other => Err(GeocodeFailure::Provider(match self.error_message {
                Some(message) => format!("{other}: {message}"),
                None => other.to_string(),
            })),
        }
    }
}

#[cfg(feature = "http-geocoder")]
pub use http::HttpGeocoder;

#[cfg(feature = "http-geocoder")]
mod http {
    use async_trait::async_trait;
    use tracing::debug;

    use super::{GeocodeFailure, GeocodeProvider, GeocodeResponse};
    use crate::config::GeocodeConfig;
    use crate::offer::Coordinates;

    /// HTTP geocoder keyed by a pre-shared API credential.
    pub struct HttpGeocoder {
        http: reqwest::Client,
        endpoint: String,
        api_key: String,
    }

    impl HttpGeocoder {
        pub fn new(config: &GeocodeConfig) -> Result<Self, GeocodeFailure> {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| GeocodeFailure::Provider("no API key configured".into()))?;

            let http = reqwest::Client::builder()
                .timeout(config.timeout())
                .build()
                .map_err(|e| GeocodeFailure::Transport(format!("HTTP client build failed: {e}")))?;

            Ok(Self {
                http,
                endpoint: config.endpoint.clone(),
                api_key,
            })
        }
    }

    fn transport(err: reqwest::Error) -> GeocodeFailure {
        if err.is_timeout() {
            GeocodeFailure::Timeout
        } else {
            GeocodeFailure::Transport(err.to_string())
        }
    }

    #[async_trait]
    impl GeocodeProvider for HttpGeocoder {
        async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, GeocodeFailure> {
            let response = self
                .http
                .get(&self.endpoint)
                .query(&[("address", address), ("key", self.api_key.as_str())])
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(GeocodeFailure::RateLimited);
            }
            if !status.is_success() {
                return Err(GeocodeFailure::Provider(format!("HTTP {status}")));
            }

            let body: GeocodeResponse = response
                .json()
                .await
                .map_err(|e| GeocodeFailure::Decode(e.to_string()))?;
            debug!(status = %body.status, "geocode response");
            body.into_coordinates()
        }
    }
}
