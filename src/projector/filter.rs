//! Composable filter predicates. All filters in a set combine with AND.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::offer::{derive_status, expires_within, DietaryFlag, EffectiveStatus, Offer};
use crate::viewer::Viewer;

/// A single predicate over an offer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Filter {
    /// Category equality.
    Category(String),
    /// Case-insensitive substring over title, description, category and owner name.
    /// Stored lower-cased; build with [`Filter::text`].
    Text(String),
    /// Offer carries this dietary flag.
    Dietary(DietaryFlag),
    /// Not yet expired, and expiring within this many minutes.
    ExpiresWithinMinutes(i64),
    /// Effective status is one of these.
    Status(BTreeSet<EffectiveStatus>),
    /// Viewer owns the offer.
    OnlyMine,
    /// Viewer registered interest in the offer.
    OnlyInterested,
    /// Offer has resolved coordinates (map-only views).
    HasCoordinates,
}

impl Filter {
    pub fn category(category: impl Into<String>) -> Self {
        Filter::Category(category.into())
    }

    pub fn text(needle: &str) -> Self {
        Filter::Text(needle.trim().to_lowercase())
    }

    pub fn expires_within(window: Duration) -> Self {
        Filter::ExpiresWithinMinutes(window.num_minutes())
    }

    pub fn expires_within_hours(hours: i64) -> Self {
        Self::expires_within(Duration::hours(hours))
    }

    pub fn status(statuses: impl IntoIterator<Item = EffectiveStatus>) -> Self {
        Filter::Status(statuses.into_iter().collect())
    }

    fn name(&self) -> &'static str {
        match self {
            Filter::Category(_) => "category",
            Filter::Text(_) => "text",
            Filter::Dietary(_) => "dietary",
            Filter::ExpiresWithinMinutes(_) => "expires_within",
            Filter::Status(_) => "status",
            Filter::OnlyMine => "only_mine",
            Filter::OnlyInterested => "only_interested",
            Filter::HasCoordinates => "has_coordinates",
        }
    }

    fn matches(&self, offer: &Offer, viewer: &Viewer, now: DateTime<Utc>) -> bool {
        match self {
            Filter::Category(category) => offer.category == *category,
            Filter::Text(needle) => offer.search_text().contains(needle.as_str()),
            Filter::Dietary(flag) => offer.dietary_flags.contains(flag),
            Filter::ExpiresWithinMinutes(minutes) => {
                expires_within(offer, now, Duration::minutes(*minutes))
            }
            Filter::Status(statuses) => statuses.contains(&derive_status(offer, now)),
            Filter::OnlyMine => viewer.actor_id().is_some_and(|id| offer.is_owned_by(id)),
            Filter::OnlyInterested => viewer.actor_id().is_some_and(|id| offer.is_interested(id)),
            Filter::HasCoordinates => offer.coordinates.is_some(),
        }
    }
}

/// An order-independent set of filters.
///
/// Two sets built from the same filters in any order are equal and project
/// identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSet {
    filters: BTreeSet<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Filter) -> Self {
        self.filters.insert(filter);
        self
    }

    pub fn insert(&mut self, filter: Filter) {
        self.filters.insert(filter);
    }

    pub fn remove(&mut self, filter: &Filter) -> bool {
        self.filters.remove(filter)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Every filter from both sets.
    pub fn union(&self, other: &FilterSet) -> FilterSet {
        self.filters.iter().chain(other.iter()).cloned().collect()
    }

    /// Reject malformed combinations before projecting.
    pub fn validate(&self, viewer: &Viewer) -> Result<(), ValidationError> {
        let mut category: Option<&str> = None;

        for filter in &self.filters {
            match filter {
                Filter::OnlyMine | Filter::OnlyInterested if !viewer.is_authenticated() => {
                    return Err(ValidationError::ViewerRequired(filter.name()));
                }
                Filter::ExpiresWithinMinutes(minutes) if *minutes <= 0 => {
                    return Err(ValidationError::NonPositiveWindow);
                }
                Filter::Text(needle) if needle.is_empty() => {
                    return Err(ValidationError::EmptyText);
                }
                Filter::Status(statuses) if statuses.is_empty() => {
                    return Err(ValidationError::EmptyStatusSet);
                }
                Filter::Category(c) => match category {
                    Some(existing) => {
                        return Err(ValidationError::ConflictingCategories(
                            existing.to_string(),
                            c.clone(),
                        ));
                    }
                    None => category = Some(c.as_str()),
                },
                _ => {}
            }
        }
        Ok(())
    }

    pub fn matches(&self, offer: &Offer, viewer: &Viewer, now: DateTime<Utc>) -> bool {
        self.filters.iter().all(|f| f.matches(offer, viewer, now))
    }
}

impl FromIterator<Filter> for FilterSet {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}
