//! Application services: the flow handler and the per-request pipeline.

use std::sync::Arc;

use crate::config::FlowConfig;
use crate::domain::position::{FlowPosition, PositionCache};
use crate::domain::registry::FlowRegistry;
use crate::domain::state::TaskId;
use crate::domain::store::StateStore;

/// Flow handler and entry URL construction
pub mod handler;

/// The active-position request pipeline
pub mod instance;

/// Everything a request pipeline needs that outlives single requests.
/// Built once by the handler builder and shared immutably.
pub(crate) struct EngineContext {
    pub registry: Arc<FlowRegistry>,
    pub positions: PositionCache,
    pub config: FlowConfig,
    pub store: Arc<dyn StateStore>,
}

impl EngineContext {
    /// Absolute URL of a position for a concrete task, task parameter
    /// included
    pub fn absolute_url(&self, position: &FlowPosition, task_id: &TaskId) -> String {
        format!(
            "{}{}?{}={}",
            self.config.site_root,
            position.path(),
            self.config.task_id_param,
            task_id
        )
    }
}
