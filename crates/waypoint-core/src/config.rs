use serde::{Deserialize, Serialize};

/// Engine configuration.
///
/// All fields have defaults matching the reference deployment; adapters
/// typically deserialize this from their own configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Prefix for every generated absolute URL, e.g. `https://example.com`.
    /// Empty by default, which produces site-relative URLs.
    pub site_root: String,

    /// Query/form parameter carrying the task identifier between requests
    pub task_id_param: String,

    /// Request parameter naming the URL to redirect to when a flow
    /// completes, captured into task state at entry
    pub on_complete_param: String,

    /// How long an untouched task survives before an out-of-band sweep may
    /// remove it. Consumed by store adapters only; the core never checks
    /// timestamps.
    pub task_idle_timeout_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            site_root: String::new(),
            task_id_param: "_id".to_string(),
            on_complete_param: "_on_complete".to_string(),
            task_idle_timeout_secs: 20 * 60,
        }
    }
}
