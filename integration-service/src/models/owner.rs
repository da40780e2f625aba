//! Workspace ownership model.

use super::product::ProductReference;
use serde::{Deserialize, Serialize};

/// The workspace a charge is billed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletOwner {
    User { username: String },
    Project { project_id: String },
}

impl WalletOwner {
    pub fn user(username: impl Into<String>) -> Self {
        WalletOwner::User {
            username: username.into(),
        }
    }

    pub fn project(project_id: impl Into<String>) -> Self {
        WalletOwner::Project {
            project_id: project_id.into(),
        }
    }

    /// Username or project id, whichever applies.
    pub fn reference(&self) -> &str {
        match self {
            WalletOwner::User { username } => username,
            WalletOwner::Project { project_id } => project_id,
        }
    }
}

impl std::fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletOwner::User { username } => write!(f, "user:{}", username),
            WalletOwner::Project { project_id } => write!(f, "project:{}", project_id),
        }
    }
}

/// Owner of a provider resource. A resource created inside a project belongs
/// to the project; otherwise it belongs to the user who created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwner {
    pub created_by: String,
    #[serde(default)]
    pub project: Option<String>,
}

impl ResourceOwner {
    pub fn to_wallet_owner(&self) -> WalletOwner {
        match &self.project {
            Some(project) => WalletOwner::project(project.clone()),
            None => WalletOwner::user(self.created_by.clone()),
        }
    }
}

/// The parts of a compute job accounting needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner: ResourceOwner,
    pub product: ProductReference,
}
