//! Collaborator traits the engine depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ProcessEvent, ServiceError};

/// A user as the directory knows them.
///
/// Defined here (in the services crate) so both the engine and directory
/// implementations can share it without a circular dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    /// Declared organization (department, team, ...). Used for progress grouping.
    #[serde(default)]
    pub organization: Option<String>,
}

/// Resolves user ids handed to the engine by the UI.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user. `Ok(None)` means the id is unknown.
    async fn resolve_user(&self, user_id: &str) -> Result<Option<User>, ServiceError>;
}

/// Receives engine events once the transition that produced them committed.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ProcessEvent) -> Result<(), ServiceError>;
}
