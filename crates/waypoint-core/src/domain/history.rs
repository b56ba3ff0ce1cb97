//! Back-navigation history: an append-only log of visited positions with
//! replay-safe truncation.

use serde::{Deserialize, Serialize};

use crate::domain::state::TaskState;
use crate::error::FlowError;

/// One visited position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Canonical position name
    pub position: String,
    /// Absolute URL that rendered the position
    pub url: String,
    /// Whether the node asked to be elided from re-recording
    pub skip_on_back: bool,
}

/// The history view bound to one request.
///
/// Loaded once at instance construction: if the current position already
/// appears in the log, everything from that entry onward is discarded -
/// the user went "back" and is here again, so the stale future must not
/// linger. `back_url` is fixed at load time and not affected by anything
/// recorded later in the same request.
#[derive(Debug)]
pub struct FlowHistory {
    entries: Vec<HistoryEntry>,
    back_url: Option<String>,
    revisit: bool,
}

impl FlowHistory {
    /// Load the history for the given current position, truncating to
    /// strictly before any previous visit of it
    pub fn load(state: &TaskState, current_position: &str) -> Result<Self, FlowError> {
        let mut entries = state.history_entries()?;
        let mut revisit = false;

        if let Some(idx) = entries.iter().position(|e| e.position == current_position) {
            tracing::debug!(
                position = current_position,
                discarded = entries.len() - idx,
                "revisited position, truncating history"
            );
            entries.truncate(idx);
            revisit = true;
        }

        let back_url = entries.last().map(|e| e.url.clone());
        Ok(Self {
            entries,
            back_url,
            revisit,
        })
    }

    /// URL of the step before the current one, if the log has one
    pub fn back_url(&self) -> Option<&str> {
        self.back_url.as_deref()
    }

    /// Whether the current position had already been visited
    pub fn is_revisit(&self) -> bool {
        self.revisit
    }

    /// The kept entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record a rendered position and write the log back into task state.
    ///
    /// A `skip_on_back` node is not re-recorded on a forward revisit, so
    /// login-style steps do not accumulate duplicate entries; the
    /// truncated log is still written back.
    pub fn record(&mut self, state: &mut TaskState, entry: HistoryEntry) -> Result<(), FlowError> {
        if !(entry.skip_on_back && self.revisit) {
            self.entries.push(entry);
        }
        state.set_history_entries(&self.entries)
    }
}
