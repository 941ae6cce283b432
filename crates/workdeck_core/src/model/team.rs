//! Team model.
//!
//! # Invariants
//! - A team always has exactly one owner.
//! - The owner is always a member of the team.

use crate::model::principal::PrincipalId;
use crate::model::text::display_name;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a team.
pub type TeamId = Uuid;

/// Team read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    /// Stored lowercase; use [`Team::display_name`] for rendering.
    pub name: String,
    /// The single accountable principal for this team.
    pub owner_id: PrincipalId,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Team {
    /// User-facing rendering of the stored name.
    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }
}
