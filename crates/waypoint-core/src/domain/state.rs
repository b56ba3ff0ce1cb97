//! Per-task state: the schema-less key-value document a flow accumulates
//! between requests, plus the reserved keys the engine itself maintains.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::domain::history::HistoryEntry;
use crate::error::FlowError;

/// Reserved state key holding the task identifier
pub const TASK_ID_KEY: &str = "_id";

/// Reserved state key holding the opaque binding token
pub const BOUND_TO_KEY: &str = "_bound_to";

/// Reserved state key holding the completion redirect URL
pub const ON_COMPLETE_KEY: &str = "_on_complete";

/// Reserved state key holding the navigation history
pub const HISTORY_KEY: &str = "_history";

/// Reserved state key holding a transient validation-error payload,
/// consumed by the next render
pub const WITH_ERRORS_KEY: &str = "_with_errors";

const RESERVED_KEYS: [&str; 5] = [
    TASK_ID_KEY,
    BOUND_TO_KEY,
    ON_COMPLETE_KEY,
    HISTORY_KEY,
    WITH_ERRORS_KEY,
];

/// Identifier of one task: 32 lowercase hexadecimal characters, derived
/// from a random UUID with the hyphens stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random task identifier
    pub fn random() -> Self {
        TaskId(Uuid::new_v4().simple().to_string())
    }

    /// Validate an externally supplied identifier.
    ///
    /// Anything that is not exactly 32 lowercase hex characters is rejected
    /// as `NotFound` before any store is consulted, so malformed input never
    /// reaches a storage key.
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        let valid = raw.len() == 32
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            tracing::debug!(task_id = raw, "rejecting malformed task identifier");
            return Err(FlowError::NotFound);
        }
        Ok(TaskId(raw.to_string()))
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The state document of one task.
///
/// A mapping from string keys to arbitrary JSON values. Between requests it
/// is owned exclusively by the state store; during a request it is owned
/// exclusively by the active flow position instance, which mutates it in
/// place and either persists or deletes it at finalization - never both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskState {
    values: serde_json::Map<String, Value>,
}

impl TaskState {
    /// Create an empty state document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the initial state for a freshly minted task
    pub fn for_task(task_id: &TaskId, bound_to: &str) -> Self {
        let mut state = Self::new();
        state
            .values
            .insert(TASK_ID_KEY.to_string(), Value::String(task_id.to_string()));
        state.values.insert(
            BOUND_TO_KEY.to_string(),
            Value::String(bound_to.to_string()),
        );
        state
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Insert a value, returning the previous one if present
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The task identifier recorded in this state
    pub fn task_id(&self) -> Result<TaskId, FlowError> {
        match self.values.get(TASK_ID_KEY).and_then(Value::as_str) {
            Some(raw) => TaskId::parse(raw),
            None => Err(FlowError::StateStore(
                "task state has no _id entry".to_string(),
            )),
        }
    }

    /// The opaque binding token stamped at creation, if any
    pub fn bound_to(&self) -> Option<&str> {
        self.values.get(BOUND_TO_KEY).and_then(Value::as_str)
    }

    /// The completion redirect URL, if one was supplied at entry
    pub fn on_complete(&self) -> Option<&str> {
        self.values.get(ON_COMPLETE_KEY).and_then(Value::as_str)
    }

    /// Record the completion redirect URL
    pub fn set_on_complete(&mut self, url: impl Into<String>) {
        self.values
            .insert(ON_COMPLETE_KEY.to_string(), Value::String(url.into()));
    }

    /// Stash a validation-error payload for the next render
    pub fn set_validation_errors(&mut self, errors: Value) {
        self.values.insert(WITH_ERRORS_KEY.to_string(), errors);
    }

    /// Remove and return the pending validation-error payload, if any
    pub fn take_validation_errors(&mut self) -> Option<Value> {
        self.values.remove(WITH_ERRORS_KEY)
    }

    /// The recorded navigation history, oldest first
    pub fn history_entries(&self) -> Result<Vec<HistoryEntry>, FlowError> {
        match self.values.get(HISTORY_KEY) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the recorded navigation history
    pub fn set_history_entries(&mut self, entries: &[HistoryEntry]) -> Result<(), FlowError> {
        self.values
            .insert(HISTORY_KEY.to_string(), serde_json::to_value(entries)?);
        Ok(())
    }

    /// Iterate the non-reserved entries, e.g. to build a render context
    pub fn public_entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
    }
}
