//! Activity ledger model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::owner::{ResourceOwner, WalletOwner};

/// Whether an activity entry belongs to a user or a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Personal,
    Project,
}

impl SubjectKind {
    /// Column value of `activity_system.reference_is_user`.
    pub fn is_user(&self) -> bool {
        matches!(self, SubjectKind::Personal)
    }

    pub fn from_is_user(is_user: bool) -> Self {
        if is_user {
            SubjectKind::Personal
        } else {
            SubjectKind::Project
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Personal => "personal",
            SubjectKind::Project => "project",
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subject of activity tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivitySubject {
    Personal(String),
    Project(String),
}

impl ActivitySubject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            ActivitySubject::Personal(_) => SubjectKind::Personal,
            ActivitySubject::Project(_) => SubjectKind::Project,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ActivitySubject::Personal(id) | ActivitySubject::Project(id) => id,
        }
    }
}

impl From<&WalletOwner> for ActivitySubject {
    fn from(owner: &WalletOwner) -> Self {
        match owner {
            WalletOwner::User { username } => ActivitySubject::Personal(username.clone()),
            WalletOwner::Project { project_id } => ActivitySubject::Project(project_id.clone()),
        }
    }
}

impl From<&ResourceOwner> for ActivitySubject {
    fn from(owner: &ResourceOwner) -> Self {
        ActivitySubject::from(&owner.to_wallet_owner())
    }
}

/// One row of `activity_system`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub reference_is_user: bool,
    pub workspace_reference: String,
    pub last_activity: i64,
}

impl ActivityRecord {
    pub fn new(kind: SubjectKind, subject_id: &str, last_activity: i64) -> Self {
        Self {
            reference_is_user: kind.is_user(),
            workspace_reference: subject_id.to_string(),
            last_activity,
        }
    }

    pub fn kind(&self) -> SubjectKind {
        SubjectKind::from_is_user(self.reference_is_user)
    }
}
