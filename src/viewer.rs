//! Viewer identity, supplied by the external auth collaborator and trusted as-is.

use serde::{Deserialize, Serialize};

use crate::offer::{ActorId, Coordinates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Donor,
    Receiver,
    Admin,
    Unauthenticated,
}

/// Who is looking at a surface, and from where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: Option<ActorId>,
    pub role: ViewerRole,
    /// Viewer position, used by the `nearest` sort.
    pub coordinates: Option<Coordinates>,
}

impl Viewer {
    pub fn new(id: impl Into<ActorId>, role: ViewerRole) -> Self {
        Self {
            id: Some(id.into()),
            role,
            coordinates: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: None,
            role: ViewerRole::Unauthenticated,
            coordinates: None,
        }
    }

    pub fn at(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// The viewer id, if authenticated.
    pub fn actor_id(&self) -> Option<&str> {
        match self.role {
            ViewerRole::Unauthenticated => None,
            _ => self.id.as_deref(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor_id().is_some()
    }
}
