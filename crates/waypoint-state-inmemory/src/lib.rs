//! In-memory task state store for the Waypoint platform
//!
//! Implements the state store interface defined in the waypoint-core crate
//! on top of a process-local map. Useful for development, testing, and
//! single-process deployments; state does not survive a restart.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use waypoint_core::{FlowError, StateStore, TaskId, TaskState};


/// A process-local task state store.
///
/// Every write stamps the task with the current time; [`sweep_expired`]
/// removes tasks untouched for longer than a given idle window. Concurrent
/// writers follow last-write-wins semantics, same as the shared backends.
///
/// [`sweep_expired`]: InMemoryStateStore::sweep_expired
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    tasks: Arc<RwLock<HashMap<String, (TaskState, DateTime<Utc>)>>>,
}

impl InMemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether the store holds no tasks
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Remove every task untouched for longer than `idle_timeout_secs`,
    /// returning how many were removed. Intended to run on a periodic
    /// out-of-band task, not inside the request path.
    pub async fn sweep_expired(&self, idle_timeout_secs: u64) -> usize {
        let cutoff = Utc::now() - Duration::seconds(idle_timeout_secs as i64);
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, (_, touched)| *touched > cutoff);
        let removed = before - tasks.len();
        if removed > 0 {
            debug!(removed, "swept expired tasks");
        }
        removed
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, task_id: &TaskId, age_secs: i64) {
        let mut tasks = self.tasks.write().await;
        if let Some((_, touched)) = tasks.get_mut(task_id.as_str()) {
            *touched = Utc::now() - Duration::seconds(age_secs);
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_state(&self, task_id: &TaskId) -> Result<TaskState, FlowError> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id.as_str())
            .map(|(state, _)| state.clone())
            .ok_or(FlowError::NotFound)
    }

    async fn put_state(&self, task_id: &TaskId, state: &TaskState) -> Result<(), FlowError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task_id.to_string(), (state.clone(), Utc::now()));
        Ok(())
    }

    async fn delete_state(&self, task_id: &TaskId) -> Result<(), FlowError> {
        let mut tasks = self.tasks.write().await;
        tasks.remove(task_id.as_str());
        Ok(())
    }
}
