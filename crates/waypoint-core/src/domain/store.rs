//! State store boundary.
//!
//! The engine only requires get/put/delete semantics over per-task state
//! blobs; concrete backends (in-memory, file, relational, key-value) live
//! in their own crates and implement this trait. The engine issues a plain
//! read-modify-write with no concurrency token, so an implementation should
//! document its conflict policy; the reference stores are last-write-wins.
//! Idle-task expiry is an out-of-band sweep over the store, never a concern
//! of the core.

use async_trait::async_trait;

use crate::domain::state::{TaskId, TaskState};
use crate::error::FlowError;

/// Key-value persistence of per-task state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the state of a task, failing with `NotFound` when the task
    /// does not exist
    async fn get_state(&self, task_id: &TaskId) -> Result<TaskState, FlowError>;

    /// Upsert the state of a task
    async fn put_state(&self, task_id: &TaskId, state: &TaskState) -> Result<(), FlowError>;

    /// Remove the state of a task; removing an absent task is not an error
    async fn delete_state(&self, task_id: &TaskId) -> Result<(), FlowError>;
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory state store.
    ///
    /// Conflict policy: last write wins. Useful for tests and single-process
    /// development servers; nothing survives a restart.
    #[derive(Default)]
    pub struct MemoryStateStore {
        states: DashMap<String, TaskState>,
    }

    impl MemoryStateStore {
        /// Create an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of stored tasks
        pub fn len(&self) -> usize {
            self.states.len()
        }

        /// Whether the store is empty
        pub fn is_empty(&self) -> bool {
            self.states.is_empty()
        }
    }

    #[async_trait]
    impl StateStore for MemoryStateStore {
        async fn get_state(&self, task_id: &TaskId) -> Result<TaskState, FlowError> {
            self.states
                .get(task_id.as_str())
                .map(|state| state.clone())
                .ok_or(FlowError::NotFound)
        }

        async fn put_state(&self, task_id: &TaskId, state: &TaskState) -> Result<(), FlowError> {
            self.states
                .insert(task_id.as_str().to_string(), state.clone());
            Ok(())
        }

        async fn delete_state(&self, task_id: &TaskId) -> Result<(), FlowError> {
            self.states.remove(task_id.as_str());
            Ok(())
        }
    }

    /// Wrapper that counts every call reaching the inner store, for tests
    /// asserting that certain requests never touch the backend
    pub struct CountingStateStore {
        inner: Arc<dyn StateStore>,
        calls: AtomicUsize,
    }

    impl CountingStateStore {
        /// Wrap a store
        pub fn wrap(inner: Arc<dyn StateStore>) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }

        /// Total number of get/put/delete calls observed
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StateStore for CountingStateStore {
        async fn get_state(&self, task_id: &TaskId) -> Result<TaskState, FlowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_state(task_id).await
        }

        async fn put_state(&self, task_id: &TaskId, state: &TaskState) -> Result<(), FlowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.put_state(task_id, state).await
        }

        async fn delete_state(&self, task_id: &TaskId) -> Result<(), FlowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_state(task_id).await
        }
    }

}
