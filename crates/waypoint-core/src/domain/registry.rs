//! Process-wide component registry.
//!
//! Built by explicit registration calls at startup (there is no implicit
//! side effect from defining a component), then shared immutably behind an
//! `Arc`. Besides lookup, the registry assigns each component a stable
//! short name - its registration index - used in canonical position names,
//! so registration order must be deterministic across runs for URL
//! stability.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::component::ComponentDefinition;
use crate::error::FlowError;
use crate::types::ComponentRef;

/// Mapping from component key to definition, plus assigned short names
#[derive(Debug, Default)]
pub struct FlowRegistry {
    components: HashMap<String, Arc<ComponentDefinition>>,
    short_names: HashMap<String, String>,
    order: Vec<String>,
}

impl FlowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component definition.
    ///
    /// Fails with a configuration error when the key is already taken by a
    /// different definition.
    pub fn register(
        &mut self,
        definition: ComponentDefinition,
    ) -> Result<Arc<ComponentDefinition>, FlowError> {
        self.register_arc(Arc::new(definition))
    }

    /// Register an already shared definition. Re-registering the same
    /// definition is idempotent.
    pub fn register_arc(
        &mut self,
        definition: Arc<ComponentDefinition>,
    ) -> Result<Arc<ComponentDefinition>, FlowError> {
        let key = definition.key().to_string();
        if let Some(existing) = self.components.get(&key) {
            if Arc::ptr_eq(existing, &definition) {
                return Ok(definition);
            }
            return Err(FlowError::Configuration(format!(
                "duplicate flow component name: '{}'",
                key
            )));
        }

        let short_name = self.order.len().to_string();
        tracing::debug!(component = %key, short_name = %short_name, "registering flow component");
        self.short_names.insert(key.clone(), short_name);
        self.order.push(key.clone());
        self.components.insert(key, definition.clone());
        Ok(definition)
    }

    /// Look up a component by key
    pub fn get(&self, key: &str) -> Option<&Arc<ComponentDefinition>> {
        self.components.get(key)
    }

    /// Resolve a component reference to its definition.
    ///
    /// By-name references fail with a configuration error when nothing was
    /// registered under the name.
    pub fn resolve(&self, reference: &ComponentRef) -> Result<Arc<ComponentDefinition>, FlowError> {
        match reference {
            ComponentRef::Definition(definition) => Ok(definition.clone()),
            ComponentRef::Name(name) => self.components.get(name).cloned().ok_or_else(|| {
                FlowError::Configuration(format!("no such flow component: '{}'", name))
            }),
        }
    }

    /// The stable short name assigned to a component at registration
    pub fn short_name(&self, key: &str) -> Result<&str, FlowError> {
        self.short_names.get(key).map(String::as_str).ok_or_else(|| {
            FlowError::Configuration(format!("no such flow component: '{}'", key))
        })
    }

    /// Resolve a scaffold's declared children, freshly on every call so
    /// forward-declared names registered later are honored
    pub fn children_of(
        &self,
        scaffold: &ComponentDefinition,
    ) -> Result<Vec<Arc<ComponentDefinition>>, FlowError> {
        let children = scaffold.children().ok_or_else(|| {
            FlowError::Configuration(format!(
                "component '{}' is an action and has no children",
                scaffold.key()
            ))
        })?;
        children.iter().map(|child| self.resolve(child)).collect()
    }

    /// The canonical left-most descent from a component: the component
    /// itself for an action, or the scaffold followed by the recursive
    /// first-child descent down to an action.
    pub fn initial_action_tree(
        &self,
        component: &Arc<ComponentDefinition>,
    ) -> Result<Vec<Arc<ComponentDefinition>>, FlowError> {
        let mut tree = vec![component.clone()];
        let mut current = component.clone();
        while current.is_scaffold() {
            let first = self
                .children_of(&current)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    FlowError::Configuration(format!(
                        "scaffold '{}' has an empty child set",
                        current.key()
                    ))
                })?;
            tree.push(first.clone());
            current = first;
        }
        Ok(tree)
    }

    /// Registered component keys, in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
