//! Flow positions: static root-to-leaf paths through a component tree.
//!
//! A position is the address of "where a user can be" in a flow. Positions
//! are immutable, created lazily, and memoized by their canonical name; the
//! cache is the single place canonical-name uniqueness is enforced.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::component::ComponentDefinition;
use crate::domain::registry::FlowRegistry;
use crate::error::FlowError;
use crate::types::ComponentRef;

/// One possible position in a flow: an ordered sequence of component
/// definitions from a root scaffold down to one leaf action.
pub struct FlowPosition {
    app_namespace: Option<String>,
    flow_namespace: Option<String>,
    components: Vec<Arc<ComponentDefinition>>,
    url_name: String,
}

impl FlowPosition {
    fn new(
        registry: &FlowRegistry,
        app_namespace: Option<&str>,
        flow_namespace: Option<&str>,
        components: Vec<Arc<ComponentDefinition>>,
    ) -> Result<Self, FlowError> {
        let (leaf, scaffolds) = components.split_last().ok_or_else(|| {
            FlowError::Configuration("a flow position cannot be empty".to_string())
        })?;
        if !leaf.is_action() {
            return Err(FlowError::Configuration(format!(
                "flow position must end in an action, got scaffold '{}'",
                leaf.key()
            )));
        }
        for scaffold in scaffolds {
            if !scaffold.is_scaffold() {
                return Err(FlowError::Configuration(format!(
                    "flow position interior must be scaffolds, got action '{}'",
                    scaffold.key()
                )));
            }
        }

        let url_name = canonical_name(registry, app_namespace, flow_namespace, &components)?;
        Ok(Self {
            app_namespace: app_namespace.map(str::to_string),
            flow_namespace: flow_namespace.map(str::to_string),
            components,
            url_name,
        })
    }

    /// Canonical name: namespaces plus the short names of the sequence.
    /// Two positions are equal iff their canonical names are.
    pub fn url_name(&self) -> &str {
        &self.url_name
    }

    /// Application namespace this position is mounted under, if any
    pub fn app_namespace(&self) -> Option<&str> {
        self.app_namespace.as_deref()
    }

    /// Flow namespace this position is mounted under, if any
    pub fn flow_namespace(&self) -> Option<&str> {
        self.flow_namespace.as_deref()
    }

    /// The component sequence, root first
    pub fn components(&self) -> &[Arc<ComponentDefinition>] {
        &self.components
    }

    /// The root component
    pub fn root(&self) -> &Arc<ComponentDefinition> {
        &self.components[0]
    }

    /// The leaf action
    pub fn leaf(&self) -> &Arc<ComponentDefinition> {
        &self.components[self.components.len() - 1]
    }

    /// URL path of this position: the components' segments joined
    pub fn path(&self) -> String {
        self.components
            .iter()
            .map(|c| c.url_segment())
            .collect::<String>()
    }

    /// Whether this position is an entry point: true iff the sequence is
    /// identical to the canonical left-most descent from its own root.
    pub fn is_entry_point(&self, registry: &FlowRegistry) -> Result<bool, FlowError> {
        let initial = registry.initial_action_tree(self.root())?;
        Ok(initial.len() == self.components.len()
            && initial
                .iter()
                .zip(&self.components)
                .all(|(a, b)| Arc::ptr_eq(a, b)))
    }
}

impl PartialEq for FlowPosition {
    fn eq(&self, other: &Self) -> bool {
        self.url_name == other.url_name
    }
}

impl Eq for FlowPosition {}

impl fmt::Debug for FlowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.components.iter().map(|c| c.key()).collect();
        write!(f, "FlowPosition({} -> {})", self.url_name, keys.join(" / "))
    }
}

fn canonical_name(
    registry: &FlowRegistry,
    app_namespace: Option<&str>,
    flow_namespace: Option<&str>,
    components: &[Arc<ComponentDefinition>],
) -> Result<String, FlowError> {
    let mut prefix = match flow_namespace {
        Some(ns) => format!("flow_{}_", ns),
        None => "flow_".to_string(),
    };
    if let Some(app) = app_namespace {
        prefix = format!("{}:{}", app, prefix);
    }
    let short_names = components
        .iter()
        .map(|c| registry.short_name(c.key()).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{}{}", prefix, short_names.join("/")))
}

/// Lazy, memoizing store of flow positions, keyed by canonical name.
///
/// Recomputing an existing name for a different component sequence is a
/// configuration error and fails loudly rather than silently aliasing two
/// positions.
#[derive(Default)]
pub struct PositionCache {
    positions: DashMap<String, Arc<FlowPosition>>,
}

impl PositionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Build or retrieve the canonical position for a component sequence
    pub fn position_for(
        &self,
        registry: &FlowRegistry,
        app_namespace: Option<&str>,
        flow_namespace: Option<&str>,
        components: Vec<Arc<ComponentDefinition>>,
    ) -> Result<Arc<FlowPosition>, FlowError> {
        let position = FlowPosition::new(registry, app_namespace, flow_namespace, components)?;

        if let Some(existing) = self.positions.get(position.url_name()) {
            let same_sequence = existing.components.len() == position.components.len()
                && existing
                    .components
                    .iter()
                    .zip(&position.components)
                    .all(|(a, b)| Arc::ptr_eq(a, b));
            if !same_sequence {
                return Err(FlowError::Configuration(format!(
                    "flow position name '{}' computed for two different component sequences",
                    position.url_name()
                )));
            }
            return Ok(existing.clone());
        }

        let position = Arc::new(position);
        self.positions
            .insert(position.url_name().to_string(), position.clone());
        Ok(position)
    }

    /// Redirect resolution: where does "send the user to `target`" land,
    /// starting from `current`?
    ///
    /// Walks the current chain from the node immediately above the leaf
    /// upward; the first ancestor whose declared child set contains the
    /// target is the pivot. The new position is the chain prefix through
    /// the pivot plus the target's canonical initial-action descent. A
    /// component may therefore only send to a sibling of itself or of one
    /// of its ancestors - cross-branch jumps must go through a shared
    /// ancestor's declared action set.
    pub fn resolve_send_to(
        &self,
        registry: &FlowRegistry,
        current: &FlowPosition,
        target: &ComponentRef,
    ) -> Result<Arc<FlowPosition>, FlowError> {
        let target = registry.resolve(target)?;
        let chain = current.components();

        // Skip the leaf itself; it cannot be its own pivot.
        let mut pivot = None;
        for idx in (0..chain.len().saturating_sub(1)).rev() {
            let ancestor = &chain[idx];
            let children = registry.children_of(ancestor)?;
            if children.iter().any(|c| c.key() == target.key()) {
                pivot = Some(idx);
                break;
            }
        }

        let pivot = pivot.ok_or_else(|| {
            FlowError::Navigation(format!(
                "no ancestor of position '{}' can reach component '{}'",
                current.url_name(),
                target.key()
            ))
        })?;

        let mut components = chain[..=pivot].to_vec();
        components.extend(registry.initial_action_tree(&target)?);

        self.position_for(
            registry,
            current.app_namespace(),
            current.flow_namespace(),
            components,
        )
    }

    /// Number of memoized positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
