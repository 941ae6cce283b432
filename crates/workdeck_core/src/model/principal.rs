//! Principal (user) model and the closed set of global role labels.
//!
//! # Responsibility
//! - Define the principal identity record.
//! - Define `RoleLabel`, the denormalized role facts kept in the directory.
//!
//! # Invariants
//! - `team_owner`, `project_manager` and `member` labels always reflect
//!   "holds the corresponding edge role on at least one entity".
//! - `admin` is assigned by operators, never derived.

use crate::model::text::display_name;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a principal.
pub type PrincipalId = Uuid;

/// Global role labels held by a principal.
///
/// All labels except `Admin` are a cache over edge-role reality, maintained
/// by `reconcile_label` after every edge mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleLabel {
    Admin,
    TeamOwner,
    ProjectManager,
    Member,
}

impl RoleLabel {
    /// Stable string id used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::TeamOwner => "team_owner",
            Self::ProjectManager => "project_manager",
            Self::Member => "member",
        }
    }

    /// Parses a stored label value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "team_owner" => Some(Self::TeamOwner),
            "project_manager" => Some(Self::ProjectManager),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Principal read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    /// Stored lowercase; use [`Principal::display_name`] for rendering.
    pub name: String,
    pub email: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl Principal {
    /// User-facing rendering of the stored name.
    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }
}
