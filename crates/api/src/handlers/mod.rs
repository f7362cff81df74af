use std::sync::Arc;

use engine::ProcessEngine;

pub mod processes;
pub mod templates;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProcessEngine>,
}

impl AppState {
    pub fn new(engine: Arc<ProcessEngine>) -> Self {
        Self { engine }
    }
}

pub async fn health() -> &'static str {
    "ok"
}
