//! Built-in precondition guards.
//!
//! A precondition failure is not an error: it produces an explicit response
//! that short-circuits the pipeline. This is the sanctioned mechanism for
//! access control and missing-state guards.

use serde_json::Value;

use crate::domain::state::TaskState;
use crate::types::{FlowRequest, FlowResponse};
use crate::Precondition;

/// Require the named keys to exist in task state before processing
/// continues, preventing an action from running before earlier actions
/// populated what it depends on.
#[derive(Debug, Clone)]
pub struct RequiredState {
    keys: Vec<String>,
}

impl RequiredState {
    /// Guard on the given state keys
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Precondition for RequiredState {
    fn check(&self, _request: &FlowRequest, state: &TaskState) -> Option<FlowResponse> {
        for key in &self.keys {
            if !state.contains_key(key) {
                tracing::debug!(key = %key, "required state key missing");
                return Some(FlowResponse::Status {
                    code: 422,
                    message: "State is missing".to_string(),
                });
            }
        }
        None
    }
}

/// Require the request to be authenticated.
///
/// The transport adapter exposes its notion of "authenticated" as a boolean
/// request-context value; an unauthenticated request is redirected to the
/// configured URL, or answered with a bare 401 when none is set.
#[derive(Debug, Clone)]
pub struct EnsureAuthenticated {
    context_key: String,
    error_url: Option<String>,
}

impl EnsureAuthenticated {
    /// Guard on the default `authenticated` context flag
    pub fn new() -> Self {
        Self {
            context_key: "authenticated".to_string(),
            error_url: None,
        }
    }

    /// Redirect failures to the given URL instead of answering 401
    pub fn with_error_url(mut self, url: impl Into<String>) -> Self {
        self.error_url = Some(url.into());
        self
    }

    /// Read a different request-context flag
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }
}

impl Default for EnsureAuthenticated {
    fn default() -> Self {
        Self::new()
    }
}

impl Precondition for EnsureAuthenticated {
    fn check(&self, request: &FlowRequest, _state: &TaskState) -> Option<FlowResponse> {
        let authenticated = request
            .context
            .get(&self.context_key)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if authenticated {
            return None;
        }
        tracing::debug!("unauthenticated request stopped by precondition");
        match &self.error_url {
            Some(url) => Some(FlowResponse::Redirect(url.clone())),
            None => Some(FlowResponse::Status {
                code: 401,
                message: "Unauthorized".to_string(),
            }),
        }
    }
}
