//! Static component definitions: the nodes of a flow tree.
//!
//! A flow is a tree whose internal nodes are scaffolds (grouping an ordered
//! set of possible children plus a transition policy) and whose leaves are
//! actions (each processing one unit of user interaction). Definitions are
//! built once at startup, registered, and shared immutably for the process
//! lifetime.

use std::fmt;
use std::sync::Arc;

use crate::transitions::{NonAutomatic, Transition};
use crate::types::ComponentRef;
use crate::{ActionHandler, Precondition, PrepareHook};

/// What kind of node a component is
pub enum ComponentKind {
    /// Leaf: handles one interaction
    Action {
        /// The dispatchable behavior of this leaf
        handler: Arc<dyn ActionHandler>,
    },
    /// Internal node: owns an ordered set of child possibilities and a
    /// transition policy
    Scaffold {
        /// Ordered child references, resolved through the registry freshly
        /// on every traversal
        children: Vec<ComponentRef>,
        /// Policy deciding what follows a completed child
        transition: Arc<dyn Transition>,
    },
}

/// Static definition of one flow component
pub struct ComponentDefinition {
    key: String,
    url: String,
    kind: ComponentKind,
    preconditions: Vec<Arc<dyn Precondition>>,
    prepare: Option<Arc<dyn PrepareHook>>,
    skip_on_back: bool,
    required_state: Vec<String>,
}

impl ComponentDefinition {
    /// Define a leaf action.
    ///
    /// The URL segment defaults to the lowercased key; override it with
    /// [`with_url`](Self::with_url).
    pub fn action(key: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        let key = key.into();
        let url = format!("/{}", key.to_lowercase());
        Self {
            key,
            url,
            kind: ComponentKind::Action {
                handler: Arc::new(handler),
            },
            preconditions: Vec::new(),
            prepare: None,
            skip_on_back: false,
            required_state: Vec::new(),
        }
    }

    /// Define a scaffold over an ordered set of children.
    ///
    /// The transition policy defaults to [`NonAutomatic`]: a child that
    /// completes without an explicit destination is a configuration error
    /// until a policy such as [`Linear`](crate::transitions::Linear) is set.
    pub fn scaffold<I, R>(key: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ComponentRef>,
    {
        let key = key.into();
        let url = format!("/{}", key.to_lowercase());
        Self {
            key,
            url,
            kind: ComponentKind::Scaffold {
                children: children.into_iter().map(Into::into).collect(),
                transition: Arc::new(NonAutomatic),
            },
            preconditions: Vec::new(),
            prepare: None,
            skip_on_back: false,
            required_state: Vec::new(),
        }
    }

    /// Override the URL segment this component contributes
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the transition policy. Only meaningful on a scaffold.
    ///
    /// # Panics
    ///
    /// Panics when called on an action; this is a wiring mistake caught at
    /// startup.
    pub fn with_transition(mut self, transition: impl Transition + 'static) -> Self {
        match &mut self.kind {
            ComponentKind::Scaffold { transition: t, .. } => *t = Arc::new(transition),
            ComponentKind::Action { .. } => {
                panic!("transition policy set on action '{}'", self.key)
            }
        }
        self
    }

    /// Append a precondition guard
    pub fn with_precondition(mut self, precondition: impl Precondition + 'static) -> Self {
        self.preconditions.push(Arc::new(precondition));
        self
    }

    /// Set the prepare hook
    pub fn with_prepare(mut self, hook: impl PrepareHook + 'static) -> Self {
        self.prepare = Some(Arc::new(hook));
        self
    }

    /// Elide this component from "back" history re-recording. Use for steps
    /// that change global rather than flow state, such as a login.
    pub fn skip_on_back(mut self) -> Self {
        self.skip_on_back = true;
        self
    }

    /// Require the named state keys to exist before this component may run
    pub fn requires_state<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_state = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Registry key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// URL segment contributed to generated paths
    pub fn url_segment(&self) -> &str {
        &self.url
    }

    /// Whether this is a leaf action
    pub fn is_action(&self) -> bool {
        matches!(self.kind, ComponentKind::Action { .. })
    }

    /// Whether this is a scaffold
    pub fn is_scaffold(&self) -> bool {
        matches!(self.kind, ComponentKind::Scaffold { .. })
    }

    /// The action handler, for a leaf
    pub fn handler(&self) -> Option<&Arc<dyn ActionHandler>> {
        match &self.kind {
            ComponentKind::Action { handler } => Some(handler),
            ComponentKind::Scaffold { .. } => None,
        }
    }

    /// The declared child references, for a scaffold
    pub fn children(&self) -> Option<&[ComponentRef]> {
        match &self.kind {
            ComponentKind::Scaffold { children, .. } => Some(children),
            ComponentKind::Action { .. } => None,
        }
    }

    /// The transition policy, for a scaffold
    pub fn transition(&self) -> Option<&Arc<dyn Transition>> {
        match &self.kind {
            ComponentKind::Scaffold { transition, .. } => Some(transition),
            ComponentKind::Action { .. } => None,
        }
    }

    /// The declared precondition guards, in order
    pub fn preconditions(&self) -> &[Arc<dyn Precondition>] {
        &self.preconditions
    }

    /// The prepare hook, if any
    pub fn prepare_hook(&self) -> Option<&Arc<dyn PrepareHook>> {
        self.prepare.as_ref()
    }

    /// Whether this component is elided from history re-recording
    pub fn is_skip_on_back(&self) -> bool {
        self.skip_on_back
    }

    /// State keys that must pre-exist before this component may run
    pub fn required_state(&self) -> &[String] {
        &self.required_state
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ComponentKind::Action { .. } => "Action",
            ComponentKind::Scaffold { .. } => "Scaffold",
        };
        f.debug_struct("ComponentDefinition")
            .field("key", &self.key)
            .field("kind", &kind)
            .field("url", &self.url)
            .finish()
    }
}
