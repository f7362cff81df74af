//! `db` crate: pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for the process-engine schema. Templates and runs are stored as JSONB
//! documents with a few scalar columns pulled out for listing and filtering.
//! No business logic lives here.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;

pub use pool::{create_pool, run_migrations, DbPool};
pub use error::DbError;
pub use models::{ProcessRunRow, ProcessTemplateRow};
