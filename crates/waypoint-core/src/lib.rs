//!
//! Waypoint Core - stateful flow engine for the Waypoint platform
//!
//! This crate defines the component model, position resolution, and the
//! request pipeline for multi-step user flows. Flows are trees of static
//! component definitions; at any given moment a user is at one position in
//! that tree (a root-to-leaf path), and each incoming request either renders
//! the position, advances it, or completes the flow.
//!
//! State lives outside the process, behind the [`StateStore`] trait;
//! dedicated store crates provide the production backends.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;

/// Domain layer - components, positions, history, task state
pub mod domain;

/// Application services - the handler and per-request pipeline
pub mod application;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

/// Built-in precondition guards
pub mod preconditions;

/// Transition policies
pub mod transitions;

/// Request/response and context types
pub mod types;

// Re-export key types
pub use config::FlowConfig;
pub use error::FlowError;

pub use domain::component::{ComponentDefinition, ComponentKind};
pub use domain::history::{FlowHistory, HistoryEntry};
pub use domain::position::{FlowPosition, PositionCache};
pub use domain::registry::FlowRegistry;
pub use domain::state::{TaskId, TaskState};
pub use domain::store::StateStore;

pub use application::handler::{FlowHandler, FlowHandlerBuilder, Route};
pub use application::instance::FlowPositionInstance;

pub use transitions::{Linear, NextStep, NonAutomatic, Transition, TransitionContext};
pub use types::{
    ComponentRef, FlowRequest, FlowResponse, Outcome, RenderPayload, RequestMethod, StepContext,
};

/// A guard that may veto processing of a request before any hook runs.
///
/// Checked root to leaf along the active position. Returning a response
/// stops the pipeline immediately; the response is handed to the transport
/// adapter as-is and no state is persisted.
pub trait Precondition: Send + Sync {
    /// Return a response to short-circuit with, or `None` to let the
    /// request proceed
    fn check(&self, request: &types::FlowRequest, state: &TaskState)
        -> Option<types::FlowResponse>;
}

/// A hook run on every node of the active position before dispatch,
/// root to leaf.
///
/// Prepare hooks load or derive whatever the node needs into task state.
/// Returning a response short-circuits the remaining hooks and the
/// dispatch; state mutated so far is still persisted at finalization.
#[async_trait]
pub trait PrepareHook: Send + Sync {
    /// Prepare the node, optionally short-circuiting with a response
    async fn prepare(
        &self,
        ctx: &mut types::StepContext<'_>,
    ) -> Result<Option<types::FlowResponse>, FlowError>;
}

/// The dispatchable behavior of a leaf action.
///
/// `render` answers GET requests; `submit` answers POST requests and
/// reports an [`Outcome`](types::Outcome): a direct response, completion
/// (delegating "what next" to the parent scaffold's transition policy), or
/// an explicit send-to target.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Render the action for a GET request
    async fn render(
        &self,
        ctx: &mut types::StepContext<'_>,
    ) -> Result<types::FlowResponse, FlowError>;

    /// Process a POST submission. Defaults to reporting completion.
    async fn submit(&self, ctx: &mut types::StepContext<'_>) -> Result<types::Outcome, FlowError> {
        let _ = ctx;
        Ok(types::Outcome::Complete)
    }
}

/// An action that renders the accumulated task state and completes on any
/// submission. Pure display steps and tests use it as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAction;

#[async_trait]
impl ActionHandler for DefaultAction {
    async fn render(
        &self,
        ctx: &mut types::StepContext<'_>,
    ) -> Result<types::FlowResponse, FlowError> {
        Ok(ctx.render())
    }
}

/// Derives the opaque token a task is bound to from request context.
///
/// A freshly minted task is stamped with the binder's token; every later
/// request must produce the same token or the task is treated as
/// nonexistent. This keeps one user's task identifiers useless in another
/// user's hands without revealing that the task exists.
pub trait Binder: Send + Sync {
    /// Produce the binding token for this request, or `None` when the
    /// request carries nothing to bind to
    fn bind(&self, request: &types::FlowRequest) -> Option<String>;
}

/// Binds tasks to a session identifier supplied in request context.
#[derive(Debug, Clone)]
pub struct SessionBinder {
    context_key: String,
}

impl SessionBinder {
    /// Bind to the `session` context value
    pub fn new() -> Self {
        Self {
            context_key: "session".to_string(),
        }
    }

    /// Bind to a different request-context value
    pub fn with_context_key(key: impl Into<String>) -> Self {
        Self {
            context_key: key.into(),
        }
    }
}

impl Default for SessionBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder for SessionBinder {
    fn bind(&self, request: &types::FlowRequest) -> Option<String> {
        request
            .context
            .get(&self.context_key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}
