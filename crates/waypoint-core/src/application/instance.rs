//! One flow position bound to one task for the duration of one request.
//!
//! The pipeline runs six phases in a fixed order: preconditions, prepare
//! hooks, leaf dispatch, history recording, completion propagation, and
//! finalization. Phases one and two walk the position root to leaf; phase
//! five walks it leaf to root.

use std::sync::Arc;

use crate::application::EngineContext;
use crate::domain::history::{FlowHistory, HistoryEntry};
use crate::domain::position::FlowPosition;
use crate::domain::state::{TaskId, TaskState};
use crate::error::FlowError;
use crate::transitions::{NextStep, TransitionContext};
use crate::types::{FlowRequest, FlowResponse, Outcome, RequestMethod, StepContext};

/// A flow position instantiated against a concrete task's state.
///
/// Owns the task state exclusively for the lifetime of the request; the
/// store is touched again only at finalization, which either persists the
/// mutated state or deletes it on completion.
pub struct FlowPositionInstance {
    engine: Arc<EngineContext>,
    position: Arc<FlowPosition>,
    task_id: TaskId,
    state: TaskState,
    history: FlowHistory,
}

impl FlowPositionInstance {
    pub(crate) fn new(
        engine: Arc<EngineContext>,
        position: Arc<FlowPosition>,
        state: TaskState,
    ) -> Result<Self, FlowError> {
        let task_id = state.task_id()?;
        let history = FlowHistory::load(&state, position.url_name())?;
        let mut state = state;
        // A revisit truncates the log; write the truncation back so it
        // survives whichever way finalization persists the state.
        state.set_history_entries(history.entries())?;
        Ok(Self {
            engine,
            position,
            task_id,
            state,
            history,
        })
    }

    /// The position this instance is bound to
    pub fn position(&self) -> &Arc<FlowPosition> {
        &self.position
    }

    /// The task this instance is bound to
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Absolute URL of this instance, task parameter included
    pub fn absolute_url(&self) -> String {
        self.engine.absolute_url(&self.position, &self.task_id)
    }

    /// Run the full pipeline for one request.
    ///
    /// A precondition veto returns without persisting anything. Every
    /// other path ends in finalization: completed flows have their state
    /// deleted and redirect to the recorded completion URL; all others
    /// have their state persisted first.
    pub async fn handle(&mut self, request: &FlowRequest) -> Result<FlowResponse, FlowError> {
        tracing::debug!(
            position = self.position.url_name(),
            task_id = %self.task_id,
            method = ?request.method,
            "handling flow request"
        );

        if let Some(response) = self.check_preconditions(request) {
            return Ok(response);
        }

        let mut outcome = match self.run_prepare_hooks(request).await? {
            Some(response) => Outcome::Response(response),
            None => {
                let outcome = self.dispatch(request).await?;
                self.record_history(request, &outcome)?;
                outcome
            }
        };

        let mut completed = false;
        if let Outcome::Complete = outcome {
            match self.propagate_completion()? {
                NextStep::SendTo(next) => outcome = Outcome::SendTo(next.into()),
                NextStep::Complete => completed = true,
            }
        }

        self.finalize(outcome, completed).await
    }

    /// Phase one: required-state guards and precondition checks, root to
    /// leaf. The first veto wins.
    fn check_preconditions(&self, request: &FlowRequest) -> Option<FlowResponse> {
        for node in self.position.components() {
            for key in node.required_state() {
                if !self.state.contains_key(key) {
                    tracing::debug!(
                        component = node.key(),
                        key = %key,
                        "required state missing, vetoing request"
                    );
                    return Some(FlowResponse::Status {
                        code: 422,
                        message: "State is missing".to_string(),
                    });
                }
            }
            for precondition in node.preconditions() {
                if let Some(response) = precondition.check(request, &self.state) {
                    tracing::debug!(component = node.key(), "precondition vetoed request");
                    return Some(response);
                }
            }
        }
        None
    }

    /// Phase two: prepare hooks, root to leaf. A hook returning a response
    /// skips the remaining hooks and the dispatch, but unlike a
    /// precondition veto the state mutated so far is still persisted.
    async fn run_prepare_hooks(
        &mut self,
        request: &FlowRequest,
    ) -> Result<Option<FlowResponse>, FlowError> {
        let absolute_url = self.absolute_url();
        let back_url = self.history.back_url().map(str::to_string);

        for node in self.position.components() {
            let Some(hook) = node.prepare_hook() else {
                continue;
            };
            let hook = hook.clone();
            let mut ctx = StepContext::new(
                request,
                &mut self.state,
                node.key().to_string(),
                self.task_id.clone(),
                back_url.clone(),
                absolute_url.clone(),
                None,
            );
            if let Some(response) = hook.prepare(&mut ctx).await? {
                tracing::debug!(component = node.key(), "prepare hook short-circuited");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Phase three: dispatch the request to the leaf action. GET renders,
    /// POST submits; pending validation errors are consumed by the render.
    async fn dispatch(&mut self, request: &FlowRequest) -> Result<Outcome, FlowError> {
        let leaf = self.position.leaf().clone();
        let handler = leaf.handler().cloned().ok_or_else(|| {
            FlowError::Configuration(format!("flow position leaf '{}' has no handler", leaf.key()))
        })?;

        let absolute_url = self.absolute_url();
        let back_url = self.history.back_url().map(str::to_string);
        let errors = match request.method {
            RequestMethod::Get => self.state.take_validation_errors(),
            RequestMethod::Post => None,
        };

        let mut ctx = StepContext::new(
            request,
            &mut self.state,
            leaf.key().to_string(),
            self.task_id.clone(),
            back_url,
            absolute_url,
            errors,
        );

        match request.method {
            RequestMethod::Get => Ok(Outcome::Response(handler.render(&mut ctx).await?)),
            RequestMethod::Post => handler.submit(&mut ctx).await,
        }
    }

    /// Phase four: record the position in history, for GET requests whose
    /// dispatch produced a non-redirect response. Redirects, submissions,
    /// and short-circuited requests that never reached dispatch are
    /// waypoints, not places the user can come "back" to.
    fn record_history(&mut self, request: &FlowRequest, outcome: &Outcome) -> Result<(), FlowError> {
        let rendered = matches!(outcome, Outcome::Response(response) if !response.is_redirect());
        if request.method != RequestMethod::Get || !rendered {
            return Ok(());
        }
        let entry = HistoryEntry {
            position: self.position.url_name().to_string(),
            url: self.absolute_url(),
            skip_on_back: self.position.leaf().is_skip_on_back(),
        };
        self.history.record(&mut self.state, entry)
    }

    /// Phase five, one step: consult scaffold transition policies leaf to
    /// root until one names a destination; a position with no scaffold
    /// left to ask completes the whole flow.
    fn propagate_completion(&self) -> Result<NextStep, FlowError> {
        let chain = self.position.components();
        for idx in (0..chain.len().saturating_sub(1)).rev() {
            let scaffold = &chain[idx];
            let ctx = TransitionContext {
                scaffold,
                scaffold_index: idx,
                position: &self.position,
                registry: &self.engine.registry,
            };
            let transition = scaffold.transition().ok_or_else(|| {
                FlowError::Configuration(format!(
                    "position interior node '{}' is not a scaffold",
                    scaffold.key()
                ))
            })?;
            match transition.choose_next(&ctx)? {
                NextStep::SendTo(next) => {
                    tracing::debug!(
                        scaffold = scaffold.key(),
                        next = next.key(),
                        "transition chose next component"
                    );
                    return Ok(NextStep::SendTo(next));
                }
                NextStep::Complete => continue,
            }
        }
        tracing::debug!(position = self.position.url_name(), "flow completed");
        Ok(NextStep::Complete)
    }

    /// Phase six: persist or delete state and shape the final response.
    async fn finalize(
        &mut self,
        outcome: Outcome,
        completed: bool,
    ) -> Result<FlowResponse, FlowError> {
        if completed {
            let on_complete = self
                .state
                .on_complete()
                .map(str::to_string)
                .ok_or_else(|| {
                    FlowError::Configuration(
                        "flow completed without a destination; supply an on-complete URL at entry"
                            .to_string(),
                    )
                })?;
            self.engine.store.delete_state(&self.task_id).await?;
            tracing::debug!(task_id = %self.task_id, "task state deleted on completion");
            return Ok(FlowResponse::Redirect(on_complete));
        }

        self.engine.store.put_state(&self.task_id, &self.state).await?;

        match outcome {
            Outcome::Response(response) => Ok(response),
            Outcome::SendTo(target) => {
                let next = self.engine.positions.resolve_send_to(
                    &self.engine.registry,
                    &self.position,
                    &target,
                )?;
                Ok(FlowResponse::Redirect(
                    self.engine.absolute_url(&next, &self.task_id),
                ))
            }
            Outcome::Complete => Err(FlowError::Configuration(
                "completion outcome survived propagation".to_string(),
            )),
        }
    }
}
