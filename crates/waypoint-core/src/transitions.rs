//! Transition policies: what happens when an action on a scaffold reports
//! completion without an explicit destination.

use std::sync::Arc;

use crate::domain::component::ComponentDefinition;
use crate::domain::position::FlowPosition;
use crate::domain::registry::FlowRegistry;
use crate::error::FlowError;

/// What a transition policy decided
#[derive(Debug, Clone)]
pub enum NextStep {
    /// Nothing further at this scaffold; completion propagates to the
    /// parent scaffold, or to finalization at the root
    Complete,
    /// Send the user to this component (descending to its first action if
    /// it is a scaffold)
    SendTo(Arc<ComponentDefinition>),
}

/// Everything a policy may consult when choosing the next step
pub struct TransitionContext<'a> {
    /// The scaffold whose policy is being invoked
    pub scaffold: &'a Arc<ComponentDefinition>,
    /// Index of that scaffold within the active position's sequence
    pub scaffold_index: usize,
    /// The active flow position, root to leaf
    pub position: &'a FlowPosition,
    /// The component registry, for resolving declared children
    pub registry: &'a FlowRegistry,
}

impl TransitionContext<'_> {
    /// The scaffold's child on the active path, i.e. the component the
    /// completion bubbled up from
    pub fn active_child(&self) -> Result<&Arc<ComponentDefinition>, FlowError> {
        self.position
            .components()
            .get(self.scaffold_index + 1)
            .ok_or_else(|| {
                FlowError::Configuration(format!(
                    "transition invoked on '{}' with no active child",
                    self.scaffold.key()
                ))
            })
    }
}

/// A transition policy.
///
/// Invoked only when a completed child delegated "what next" upward; a
/// policy either names a concrete next component, has no further opinion
/// ([`NextStep::Complete`]), or fails with a configuration error for any
/// state it considers invalid.
pub trait Transition: Send + Sync {
    /// Choose what follows the just-completed child of this scaffold
    fn choose_next(&self, ctx: &TransitionContext<'_>) -> Result<NextStep, FlowError>;
}

/// The default policy: automatic transition is not allowed.
///
/// Completing without an explicit destination under this policy means an
/// action forgot to say where to go next, which is a flow-definition bug.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonAutomatic;

impl Transition for NonAutomatic {
    fn choose_next(&self, ctx: &TransitionContext<'_>) -> Result<NextStep, FlowError> {
        Err(FlowError::Configuration(format!(
            "action completed under '{}' without an explicit destination, \
             and the scaffold does not allow automatic transitions",
            ctx.scaffold.key()
        )))
    }
}

/// Advance to the next sibling in the scaffold's declared child set.
///
/// When the completed child is the last sibling, reports
/// [`NextStep::Complete`], which the response-propagation phase carries to
/// the parent scaffold - completion walks up the tree until some ancestor
/// has a next sibling or the root finalizes the flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl Transition for Linear {
    fn choose_next(&self, ctx: &TransitionContext<'_>) -> Result<NextStep, FlowError> {
        let active = ctx.active_child()?;
        let children = ctx.registry.children_of(ctx.scaffold)?;

        let child_idx = children
            .iter()
            .position(|child| child.key() == active.key())
            .ok_or_else(|| {
                FlowError::Configuration(format!(
                    "active child '{}' is not in the child set of '{}'",
                    active.key(),
                    ctx.scaffold.key()
                ))
            })?;

        match children.get(child_idx + 1) {
            Some(next) => Ok(NextStep::SendTo(next.clone())),
            None => Ok(NextStep::Complete),
        }
    }
}
