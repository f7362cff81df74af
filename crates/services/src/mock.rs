//! In-process collaborator implementations.
//!
//! `StaticDirectory` and `RecordingSink` are the test doubles used across the
//! workspace; `PassthroughDirectory` and `LogSink` back the standalone server
//! when no real directory or notifier is wired in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::{EventSink, ProcessEvent, ServiceError, User, UserDirectory};

/// A directory backed by a fixed set of users.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<String, User>,
}

impl StaticDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }

    /// Add a user, builder style.
    pub fn with_user(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        organization: Option<&str>,
    ) -> Self {
        let id = id.into();
        self.users.insert(
            id.clone(),
            User {
                id,
                name: name.into(),
                organization: organization.map(str::to_owned),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn resolve_user(&self, user_id: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get(user_id).cloned())
    }
}

/// Accepts every non-blank id as a user named after itself, with no organization.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDirectory;

#[async_trait]
impl UserDirectory for PassthroughDirectory {
    async fn resolve_user(&self, user_id: &str) -> Result<Option<User>, ServiceError> {
        let id = user_id.trim();
        if id.is_empty() {
            return Ok(None);
        }
        Ok(Some(User {
            id: id.to_owned(),
            name: id.to_owned(),
            organization: None,
        }))
    }
}

/// A sink that records every event it receives, in publish order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<ProcessEvent>>>,
    /// When set, every publish fails after recording the event.
    pub fail_with: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records events and then reports them as undeliverable.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(msg.into()),
        }
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<ProcessEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: ProcessEvent) -> Result<(), ServiceError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        match &self.fail_with {
            Some(msg) => Err(ServiceError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Writes events to the log. Used when no notifier is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: ProcessEvent) -> Result<(), ServiceError> {
        info!(
            process_instance_id = %event.process_instance_id(),
            "process event: {:?}",
            event
        );
        Ok(())
    }
}
