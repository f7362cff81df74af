//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models. The `document` column holds the engine's
//! own JSON; the scalar columns beside it exist for listing and indexing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// process_templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessTemplateRow {
    pub id: Uuid,
    pub title: String,
    /// `recurring` | `project`
    pub template_type: String,
    /// `public` | `private`
    pub visibility: String,
    /// Full template: graph, compiled tasks, metadata.
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// process_runs
// ---------------------------------------------------------------------------

/// One process instance with its tasks and frozen template snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessRunRow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub title: String,
    /// `active` | `suspended` | `aborted` | `completed`
    pub status: String,
    pub started_by_id: String,
    pub start_at: DateTime<Utc>,
    pub document: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
