//! The flow handler: the adapter-facing front of the engine.
//!
//! A handler owns the component registry, the position cache, the state
//! store, and the binder. The transport adapter enumerates [`Route`]s once
//! at startup, mounts them, and forwards matched requests to
//! [`FlowHandler::handle`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::{EngineContext, instance::FlowPositionInstance};
use crate::config::FlowConfig;
use crate::domain::component::ComponentDefinition;
use crate::domain::position::{FlowPosition, PositionCache};
use crate::domain::registry::FlowRegistry;
use crate::domain::state::{TaskId, TaskState};
use crate::domain::store::StateStore;
use crate::error::FlowError;
use crate::types::{ComponentRef, FlowRequest, FlowResponse};
use crate::Binder;

/// One mountable route: a URL path and the flow position it addresses
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    position: Arc<FlowPosition>,
}

impl Route {
    /// URL path to mount, site-relative
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The position requests on this path address
    pub fn position(&self) -> &Arc<FlowPosition> {
        &self.position
    }
}

/// Builder for a [`FlowHandler`]
pub struct FlowHandlerBuilder {
    registry: FlowRegistry,
    store: Option<Arc<dyn StateStore>>,
    binder: Option<Arc<dyn Binder>>,
    config: FlowConfig,
    app_namespace: Option<String>,
    entry_points: Vec<String>,
}

impl FlowHandlerBuilder {
    fn new() -> Self {
        Self {
            registry: FlowRegistry::new(),
            store: None,
            binder: None,
            config: FlowConfig::default(),
            app_namespace: None,
            entry_points: Vec::new(),
        }
    }

    /// Register a flow component
    pub fn component(mut self, definition: ComponentDefinition) -> Result<Self, FlowError> {
        self.registry.register(definition)?;
        Ok(self)
    }

    /// Register an already shared flow component
    pub fn component_arc(
        mut self,
        definition: Arc<ComponentDefinition>,
    ) -> Result<Self, FlowError> {
        self.registry.register_arc(definition)?;
        Ok(self)
    }

    /// Declare a registered component as a flow entry point. Routes are
    /// enumerated per entry point, and only entry-point positions may mint
    /// new tasks.
    pub fn entry_point(mut self, key: impl Into<String>) -> Self {
        self.entry_points.push(key.into());
        self
    }

    /// Set the state store
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the task binder
    pub fn binder(mut self, binder: impl Binder + 'static) -> Self {
        self.binder = Some(Arc::new(binder));
        self
    }

    /// Set the engine configuration
    pub fn config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    /// Mount all routes under an application namespace
    pub fn app_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.app_namespace = Some(namespace.into());
        self
    }

    /// Build the handler, validating that every entry point is registered
    /// and that a store and a binder were supplied
    pub fn build(self) -> Result<FlowHandler, FlowError> {
        let store = self
            .store
            .ok_or_else(|| FlowError::Configuration("flow handler has no state store".to_string()))?;
        let binder = self
            .binder
            .ok_or_else(|| FlowError::Configuration("flow handler has no binder".to_string()))?;

        let mut entry_points = Vec::with_capacity(self.entry_points.len());
        for key in &self.entry_points {
            let definition = self.registry.get(key).cloned().ok_or_else(|| {
                FlowError::Configuration(format!("entry point '{}' is not registered", key))
            })?;
            entry_points.push(definition);
        }

        Ok(FlowHandler {
            engine: Arc::new(EngineContext {
                registry: Arc::new(self.registry),
                positions: PositionCache::new(),
                config: self.config,
                store,
            }),
            binder,
            app_namespace: self.app_namespace,
            entry_points,
        })
    }
}

/// The engine front: route enumeration, task lifecycle, and request
/// dispatch.
pub struct FlowHandler {
    engine: Arc<EngineContext>,
    binder: Arc<dyn Binder>,
    app_namespace: Option<String>,
    entry_points: Vec<Arc<ComponentDefinition>>,
}

impl FlowHandler {
    /// Start building a handler
    pub fn builder() -> FlowHandlerBuilder {
        FlowHandlerBuilder::new()
    }

    /// The engine configuration
    pub fn flow_config(&self) -> &FlowConfig {
        &self.engine.config
    }

    /// The component registry
    pub fn registry(&self) -> &FlowRegistry {
        &self.engine.registry
    }

    /// Enumerate every mountable route of every entry point, optionally
    /// under a flow namespace.
    ///
    /// Each root-to-leaf path through an entry point's tree is one route.
    /// Two positions generating the same URL path is a configuration
    /// error; so is a component tree containing a cycle.
    pub fn routes(&self, flow_namespace: Option<&str>) -> Result<Vec<Route>, FlowError> {
        let mut routes = Vec::new();
        let mut seen_paths = HashSet::new();

        for entry in &self.entry_points {
            let mut chain = vec![entry.clone()];
            self.collect_routes(flow_namespace, &mut chain, &mut seen_paths, &mut routes)?;
        }
        Ok(routes)
    }

    fn collect_routes(
        &self,
        flow_namespace: Option<&str>,
        chain: &mut Vec<Arc<ComponentDefinition>>,
        seen_paths: &mut HashSet<String>,
        routes: &mut Vec<Route>,
    ) -> Result<(), FlowError> {
        let node = chain[chain.len() - 1].clone();

        if node.is_action() {
            let position = self.engine.positions.position_for(
                &self.engine.registry,
                self.app_namespace.as_deref(),
                flow_namespace,
                chain.clone(),
            )?;
            let path = position.path();
            if !seen_paths.insert(path.clone()) {
                return Err(FlowError::Configuration(format!(
                    "two flow positions generate the URL '{}'",
                    path
                )));
            }
            routes.push(Route { path, position });
            return Ok(());
        }

        for child in self.engine.registry.children_of(&node)? {
            if chain.iter().any(|c| c.key() == child.key()) {
                return Err(FlowError::Configuration(format!(
                    "component '{}' appears twice on a flow path",
                    child.key()
                )));
            }
            chain.push(child);
            self.collect_routes(flow_namespace, chain, seen_paths, routes)?;
            chain.pop();
        }
        Ok(())
    }

    /// URL a user enters the given flow at, with an optional completion
    /// redirect captured as a request parameter. No task exists yet; the
    /// first request on this URL mints one.
    pub fn entry_url(
        &self,
        root: &ComponentRef,
        on_complete: Option<&str>,
        flow_namespace: Option<&str>,
    ) -> Result<String, FlowError> {
        let root = self.engine.registry.resolve(root)?;
        let components = self.engine.registry.initial_action_tree(&root)?;
        let position = self.engine.positions.position_for(
            &self.engine.registry,
            self.app_namespace.as_deref(),
            flow_namespace,
            components,
        )?;

        let mut url = format!("{}{}", self.engine.config.site_root, position.path());
        if let Some(destination) = on_complete {
            // The destination is a URL itself; encode it so its own query
            // separators survive the round trip through ours.
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair(&self.engine.config.on_complete_param, destination)
                .finish();
            url = format!("{}?{}", url, query);
        }
        Ok(url)
    }

    /// Handle a request matched to a position's route.
    ///
    /// A request carrying a task parameter loads and verifies the task: a
    /// malformed identifier, an unknown task, or a binding mismatch are
    /// all the same opaque `NotFound`. A request without one mints a fresh
    /// task, which only an entry-point position may do.
    pub async fn handle(
        &self,
        position: &Arc<FlowPosition>,
        request: &FlowRequest,
    ) -> Result<FlowResponse, FlowError> {
        let state = match request.param(&self.engine.config.task_id_param) {
            Some(raw) => self.load_task(raw, request).await?,
            None => self.mint_task(position, request).await?,
        };

        let mut instance =
            FlowPositionInstance::new(self.engine.clone(), position.clone(), state)?;
        instance.handle(request).await
    }

    async fn load_task(&self, raw: &str, request: &FlowRequest) -> Result<TaskState, FlowError> {
        let task_id = TaskId::parse(raw)?;
        let state = self.engine.store.get_state(&task_id).await?;

        let token = self.binder.bind(request);
        if state.bound_to() != token.as_deref() || token.is_none() {
            tracing::debug!(task_id = %task_id, "task binding mismatch, treating as absent");
            return Err(FlowError::NotFound);
        }
        Ok(state)
    }

    async fn mint_task(
        &self,
        position: &Arc<FlowPosition>,
        request: &FlowRequest,
    ) -> Result<TaskState, FlowError> {
        if !position.is_entry_point(&self.engine.registry)? {
            tracing::debug!(
                position = position.url_name(),
                "taskless request on a non-entry position"
            );
            return Err(FlowError::NotFound);
        }

        let token = self.binder.bind(request).ok_or_else(|| {
            FlowError::Configuration(
                "request carries nothing to bind a new task to".to_string(),
            )
        })?;

        let task_id = TaskId::random();
        let mut state = TaskState::for_task(&task_id, &token);
        if let Some(destination) = request.param(&self.engine.config.on_complete_param) {
            state.set_on_complete(destination);
        }
        self.engine.store.put_state(&task_id, &state).await?;
        tracing::debug!(task_id = %task_id, position = position.url_name(), "minted new task");
        Ok(state)
    }
}
