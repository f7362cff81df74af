//! Repository functions, one module per table.

pub mod runs;
pub mod templates;
