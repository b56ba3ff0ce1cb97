//! Request/response values exchanged between the engine and its transport
//! adapter, and the per-node context handed to component hooks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::component::ComponentDefinition;
use crate::domain::state::{TaskId, TaskState};

/// HTTP-ish request method, as far as the engine cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Render the current step
    Get,
    /// Submit the current step
    Post,
}

/// The engine's view of one incoming request.
///
/// The transport adapter merges query and form parameters into `params` and
/// exposes whatever request context the configured binder needs (session
/// identifiers, authentication flags) through `context`.
#[derive(Debug, Clone, Default)]
pub struct FlowRequest {
    /// Request method
    pub method: RequestMethod,
    /// Merged query and form parameters
    pub params: HashMap<String, String>,
    /// Adapter-supplied request context values
    pub context: HashMap<String, Value>,
}

impl Default for RequestMethod {
    fn default() -> Self {
        RequestMethod::Get
    }
}

impl FlowRequest {
    /// A GET request with no parameters
    pub fn get() -> Self {
        Self {
            method: RequestMethod::Get,
            ..Default::default()
        }
    }

    /// A POST request with no parameters
    pub fn post() -> Self {
        Self {
            method: RequestMethod::Post,
            ..Default::default()
        }
    }

    /// Add a request parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a request context value
    pub fn with_context(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context.insert(name.into(), value);
        self
    }

    /// Look up a request parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// The renderable payload of an in-progress step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    /// Registry key of the action producing this render
    pub action: String,
    /// Template context: accumulated task state plus action-specific values
    pub context: serde_json::Map<String, Value>,
    /// URL of the previous step, if the history has one
    pub back_url: Option<String>,
    /// Task identifier, for the adapter to thread through the form
    pub task_id: String,
    /// Validation errors carried over from a failed submit, if any
    pub errors: Option<Value>,
}

/// What the engine hands back to the transport adapter
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResponse {
    /// Render the current step
    Render(RenderPayload),
    /// Send the user elsewhere
    Redirect(String),
    /// A bare status response, e.g. from a failed precondition
    Status {
        /// Status code, HTTP semantics
        code: u16,
        /// Short human-readable explanation
        message: String,
    },
}

impl FlowResponse {
    /// Whether this response sends the user elsewhere
    pub fn is_redirect(&self) -> bool {
        matches!(self, FlowResponse::Redirect(_))
    }
}

/// Reference to a flow component: either a registry name resolved at use, or
/// a definition in hand.
///
/// Child lists and redirect targets both use this so forward references
/// (names registered later) keep working.
#[derive(Debug, Clone)]
pub enum ComponentRef {
    /// By registry name, resolved freshly on every use
    Name(String),
    /// By definition
    Definition(Arc<ComponentDefinition>),
}

impl From<&str> for ComponentRef {
    fn from(name: &str) -> Self {
        ComponentRef::Name(name.to_string())
    }
}

impl From<String> for ComponentRef {
    fn from(name: String) -> Self {
        ComponentRef::Name(name)
    }
}

impl From<Arc<ComponentDefinition>> for ComponentRef {
    fn from(definition: Arc<ComponentDefinition>) -> Self {
        ComponentRef::Definition(definition)
    }
}

impl From<&Arc<ComponentDefinition>> for ComponentRef {
    fn from(definition: &Arc<ComponentDefinition>) -> Self {
        ComponentRef::Definition(definition.clone())
    }
}

/// Result of dispatching a request to the leaf action
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A ready response: render, redirect, or status
    Response(FlowResponse),
    /// The action is done and delegates "what next" to its scaffold's
    /// transition policy
    Complete,
    /// The action explicitly sends the user to another component
    SendTo(ComponentRef),
}

/// Per-node view of the request handed to prepare hooks and action
/// handlers.
///
/// Holds the mutable task state for the duration of one phase on one node;
/// everything else is read-only request-scoped data.
pub struct StepContext<'a> {
    /// The incoming request
    pub request: &'a FlowRequest,
    /// The task's mutable state document
    pub state: &'a mut TaskState,
    component_key: String,
    task_id: TaskId,
    back_url: Option<String>,
    absolute_url: String,
    errors: Option<Value>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        request: &'a FlowRequest,
        state: &'a mut TaskState,
        component_key: String,
        task_id: TaskId,
        back_url: Option<String>,
        absolute_url: String,
        errors: Option<Value>,
    ) -> Self {
        Self {
            request,
            state,
            component_key,
            task_id,
            back_url,
            absolute_url,
            errors,
        }
    }

    /// Registry key of the component this context is bound to
    pub fn component_key(&self) -> &str {
        &self.component_key
    }

    /// Identifier of the task being processed
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// URL of the previous step, if any
    pub fn back_url(&self) -> Option<&str> {
        self.back_url.as_deref()
    }

    /// Absolute URL of the current position, task identifier included
    pub fn absolute_url(&self) -> &str {
        &self.absolute_url
    }

    /// Validation errors left by a previous failed submit, if any.
    /// Consumed by the first caller.
    pub fn take_errors(&mut self) -> Option<Value> {
        self.errors.take()
    }

    /// Stash validation errors for the next render of this task
    pub fn reject_with_errors(&mut self, errors: Value) {
        self.state.set_validation_errors(errors);
    }

    /// Build the default render response: the accumulated public task state
    /// as template context, plus back URL, task identifier, and any pending
    /// validation errors.
    pub fn render(&mut self) -> FlowResponse {
        let mut context = serde_json::Map::new();
        for (key, value) in self.state.public_entries() {
            context.insert(key.clone(), value.clone());
        }
        FlowResponse::Render(RenderPayload {
            action: self.component_key.clone(),
            context,
            back_url: self.back_url.clone(),
            task_id: self.task_id.to_string(),
            errors: self.errors.take(),
        })
    }
}
