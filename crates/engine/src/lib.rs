//! `engine` crate: process templates, the template compiler and the process
//! instance execution engine.

pub mod clock;
pub mod compiler;
pub mod dag;
pub mod deadline;
pub mod error;
pub mod executor;
pub mod models;
pub mod postgres;
pub mod progress;
pub mod state_machine;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use compiler::{compile, compile_with, CompiledGraph};
pub use dag::{validate_graph, ValidationReport};
pub use error::{EngineError, GraphValidationError, GraphViolation, StartWarning};
pub use executor::{EngineConfig, ProcessEngine, ProcessView, StartOutcome};
pub use postgres::PgRepository;
pub use progress::{AssigneeProgress, OrganizationProgress, ProgressReport};
pub use state_machine::ProcessRun;
pub use store::{MemoryRepository, ProcessRepository};
