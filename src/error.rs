//! Crate-level error taxonomy.
//!
//! Each area owns its error type; [`Error`] aggregates them for callers that
//! drive several areas at once.

use thiserror::Error;

use crate::bus::PublishError;
use crate::config::ConfigError;
use crate::geocode::GeocodeFailure;
use crate::ledger::MutationRejected;
use crate::store::StoreError;
use crate::surface::SurfaceKind;
use crate::sync::ChannelError;

/// Result alias for operations that may fail with any area's error.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed predicate, filter, or sort combination. A programmer error:
/// returned immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query orders by {0} fields, at most 2 are supported")]
    TooManyOrderKeys(usize),
    #[error("query limit must be greater than zero")]
    ZeroLimit,
    #[error("status filter matches no status")]
    EmptyStatusSet,
    #[error("filter `{0}` requires an authenticated viewer")]
    ViewerRequired(&'static str),
    #[error("expiry window must be positive")]
    NonPositiveWindow,
    #[error("conflicting category filters `{0}` and `{1}`")]
    ConflictingCategories(String, String),
    #[error("text filter is empty")]
    EmptyText,
}

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Mutation(#[from] MutationRejected),
    #[error(transparent)]
    Geocode(#[from] GeocodeFailure),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} surface has shut down")]
    SurfaceClosed(SurfaceKind),
}
