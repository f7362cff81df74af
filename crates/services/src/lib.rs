//! `services` crate: contracts for the collaborators the process engine
//! calls into (user directory) and out to (event delivery).
//!
//! The engine only ever talks to these traits; the concrete directory and
//! notification systems live elsewhere in the product.

pub mod error;
pub mod events;
pub mod traits;
pub mod mock;

pub use error::ServiceError;
pub use events::ProcessEvent;
pub use traits::{EventSink, User, UserDirectory};
