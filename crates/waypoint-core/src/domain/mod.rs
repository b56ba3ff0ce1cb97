//! Domain layer: component tree model, registry, positions, task state,
//! history, and the state store boundary.

/// Static component definitions
pub mod component;

/// Back-navigation history
pub mod history;

/// Flow positions and their cache
pub mod position;

/// Component registry
pub mod registry;

/// Per-task state and identifiers
pub mod state;

/// State store boundary
pub mod store;
