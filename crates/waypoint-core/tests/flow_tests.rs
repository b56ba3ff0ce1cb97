//! End-to-end tests of the flow engine: full request cycles against the
//! in-memory state store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use waypoint_core::domain::store::memory::{CountingStateStore, MemoryStateStore};
use waypoint_core::preconditions::EnsureAuthenticated;
use waypoint_core::{
    ActionHandler, ComponentDefinition, DefaultAction, FlowError, FlowHandler, FlowPosition,
    FlowRequest, FlowResponse, Linear, Outcome, PrepareHook, RenderPayload, Route, SessionBinder,
    StateStore, StepContext, TaskId,
};

/// Root{A, Mid{B, C}, D}, both scaffolds linear
fn sample_handler(store: Arc<dyn StateStore>) -> FlowHandler {
    FlowHandler::builder()
        .component(ComponentDefinition::action("A", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("B", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("C", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("D", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::scaffold("Mid", ["B", "C"]).with_transition(Linear))
        .unwrap()
        .component(ComponentDefinition::scaffold("Root", ["A", "Mid", "D"]).with_transition(Linear))
        .unwrap()
        .entry_point("Root")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap()
}

fn position<'a>(routes: &'a [Route], path: &str) -> &'a Arc<FlowPosition> {
    routes
        .iter()
        .find(|r| r.path() == path)
        .map(Route::position)
        .unwrap_or_else(|| panic!("no route for {path}"))
}

fn get(session: &str) -> FlowRequest {
    FlowRequest::get().with_context("session", json!(session))
}

fn post(session: &str) -> FlowRequest {
    FlowRequest::post().with_context("session", json!(session))
}

fn render(response: FlowResponse) -> RenderPayload {
    match response {
        FlowResponse::Render(payload) => payload,
        other => panic!("expected a render, got {other:?}"),
    }
}

fn redirect(response: FlowResponse) -> String {
    match response {
        FlowResponse::Redirect(url) => url,
        other => panic!("expected a redirect, got {other:?}"),
    }
}

/// Split "/root/a?_id=<id>" into path and task id
fn split_url(url: &str) -> (&str, &str) {
    let (path, query) = url.split_once('?').expect("url has no query");
    let id = query.strip_prefix("_id=").expect("query is not a task id");
    (path, id)
}

#[tokio::test]
async fn test_entry_request_mints_task_and_renders_first_step() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store.clone());
    let routes = handler.routes(None).unwrap();

    let response = handler
        .handle(position(&routes, "/root/a"), &get("s1"))
        .await
        .unwrap();

    let payload = render(response);
    assert_eq!(payload.action, "A");
    assert_eq!(payload.back_url, None);
    assert_eq!(payload.task_id.len(), 32);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_linear_walk_through_nested_scaffolds() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store.clone());
    let routes = handler.routes(None).unwrap();

    // Enter with a completion destination.
    let entry = get("s1").with_param("_on_complete", "/done");
    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &entry)
            .await
            .unwrap(),
    );
    let task_id = payload.task_id;

    let mut path = "/root/a".to_string();
    let mut visited = vec![path.clone()];

    // Submit each step and follow the redirect until the flow completes.
    loop {
        let request = post("s1").with_param("_id", task_id.clone());
        let url = redirect(
            handler
                .handle(position(&routes, &path), &request)
                .await
                .unwrap(),
        );
        if url == "/done" {
            break;
        }
        let (next_path, next_id) = split_url(&url);
        assert_eq!(next_id, task_id, "task id survives the walk");
        path = next_path.to_string();
        visited.push(path.clone());
    }

    assert_eq!(visited, ["/root/a", "/root/mid/b", "/root/mid/c", "/root/d"]);
    assert!(store.is_empty(), "completed task state is deleted");

    // The finished task is gone for good.
    let stale = get("s1").with_param("_id", task_id);
    let err = handler
        .handle(position(&routes, "/root/a"), &stale)
        .await
        .unwrap_err();
    assert_eq!(err, FlowError::NotFound);
}

#[tokio::test]
async fn test_completion_without_destination_is_configuration_error() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store.clone());
    let routes = handler.routes(None).unwrap();

    // Enter without an on-complete parameter and submit the last step.
    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &get("s1"))
            .await
            .unwrap(),
    );
    let request = post("s1").with_param("_id", payload.task_id);
    let err = handler
        .handle(position(&routes, "/root/d"), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Configuration(msg) if msg.contains("destination")));
    assert_eq!(store.len(), 1, "state survives the failed completion");
}

#[tokio::test]
async fn test_malformed_task_id_never_reaches_the_store() {
    let inner: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let counting = Arc::new(CountingStateStore::wrap(inner));
    let handler = sample_handler(counting.clone());
    let routes = handler.routes(None).unwrap();

    for raw in ["zzz", "ABCDEF78901234567890123456789012", "1234"] {
        let request = get("s1").with_param("_id", raw);
        let err = handler
            .handle(position(&routes, "/root/a"), &request)
            .await
            .unwrap_err();
        assert_eq!(err, FlowError::NotFound, "{raw:?}");
    }
    assert_eq!(counting.calls(), 0);
}

#[tokio::test]
async fn test_unknown_task_id_is_not_found() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store);
    let routes = handler.routes(None).unwrap();

    let request = get("s1").with_param("_id", "0123456789abcdef0123456789abcdef");
    let err = handler
        .handle(position(&routes, "/root/a"), &request)
        .await
        .unwrap_err();
    assert_eq!(err, FlowError::NotFound);
}

#[tokio::test]
async fn test_binding_mismatch_is_indistinguishable_from_absence() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store);
    let routes = handler.routes(None).unwrap();

    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &get("alice"))
            .await
            .unwrap(),
    );

    // Same valid task id, different session.
    let stolen = get("mallory").with_param("_id", payload.task_id.clone());
    let err = handler
        .handle(position(&routes, "/root/a"), &stolen)
        .await
        .unwrap_err();
    assert_eq!(err, FlowError::NotFound);

    // No session at all.
    let anonymous = FlowRequest::get().with_param("_id", payload.task_id);
    let err = handler
        .handle(position(&routes, "/root/a"), &anonymous)
        .await
        .unwrap_err();
    assert_eq!(err, FlowError::NotFound);
}

#[tokio::test]
async fn test_taskless_request_on_non_entry_position_is_not_found() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store.clone());
    let routes = handler.routes(None).unwrap();

    let err = handler
        .handle(position(&routes, "/root/mid/b"), &get("s1"))
        .await
        .unwrap_err();
    assert_eq!(err, FlowError::NotFound);
    assert!(store.is_empty(), "no task is minted mid-flow");
}

#[tokio::test]
async fn test_back_navigation_truncates_history() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store);
    let routes = handler.routes(None).unwrap();

    // Render A, advance to B, render B.
    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &get("s1"))
            .await
            .unwrap(),
    );
    let task_id = payload.task_id;
    let advance = post("s1").with_param("_id", task_id.clone());
    let url = redirect(
        handler
            .handle(position(&routes, "/root/a"), &advance)
            .await
            .unwrap(),
    );
    assert_eq!(split_url(&url).0, "/root/mid/b");

    let at_b = get("s1").with_param("_id", task_id.clone());
    let payload = render(
        handler
            .handle(position(&routes, "/root/mid/b"), &at_b)
            .await
            .unwrap(),
    );
    let back = payload.back_url.expect("B has a back url");
    assert_eq!(split_url(&back).0, "/root/a");

    // Go back to A: the stale future is discarded, so A has no back url
    // again, and a fresh visit of B points back at A exactly as before.
    let back_at_a = get("s1").with_param("_id", task_id.clone());
    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &back_at_a)
            .await
            .unwrap(),
    );
    assert_eq!(payload.back_url, None);

    let at_b_again = get("s1").with_param("_id", task_id);
    let payload = render(
        handler
            .handle(position(&routes, "/root/mid/b"), &at_b_again)
            .await
            .unwrap(),
    );
    let back = payload.back_url.expect("B has a back url after the loop");
    assert_eq!(split_url(&back).0, "/root/a");
}

struct Unavailable;

#[async_trait]
impl PrepareHook for Unavailable {
    async fn prepare(
        &self,
        _ctx: &mut StepContext<'_>,
    ) -> Result<Option<FlowResponse>, FlowError> {
        Ok(Some(FlowResponse::Status {
            code: 503,
            message: "temporarily unavailable".to_string(),
        }))
    }
}

#[tokio::test]
async fn test_prepare_short_circuit_skips_history() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("A", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("Step", DefaultAction).with_prepare(Unavailable))
        .unwrap()
        .component(ComponentDefinition::scaffold("Root", ["A", "Step"]).with_transition(Linear))
        .unwrap()
        .entry_point("Root")
        .store(store.clone())
        .binder(SessionBinder::new())
        .build()
        .unwrap();
    let routes = handler.routes(None).unwrap();

    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &get("s1"))
            .await
            .unwrap(),
    );
    let task_id = payload.task_id;

    // The gated step answers without ever dispatching; nothing about it
    // may land in history.
    let request = get("s1").with_param("_id", task_id.clone());
    let response = handler
        .handle(position(&routes, "/root/step"), &request)
        .await
        .unwrap();
    assert!(matches!(response, FlowResponse::Status { code: 503, .. }));

    let state = store
        .get_state(&TaskId::parse(&task_id).unwrap())
        .await
        .unwrap();
    let entries = state.history_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(split_url(&entries[0].url).0.ends_with("/root/a"));
}

struct JumpTo(&'static str);

#[async_trait]
impl ActionHandler for JumpTo {
    async fn render(&self, ctx: &mut StepContext<'_>) -> Result<FlowResponse, FlowError> {
        Ok(ctx.render())
    }

    async fn submit(&self, _ctx: &mut StepContext<'_>) -> Result<Outcome, FlowError> {
        Ok(Outcome::SendTo(self.0.into()))
    }
}

#[tokio::test]
async fn test_explicit_send_to_pivots_through_the_tree() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("A", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("B", JumpTo("D")))
        .unwrap()
        .component(ComponentDefinition::action("C", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("D", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::scaffold("Mid", ["B", "C"]).with_transition(Linear))
        .unwrap()
        .component(ComponentDefinition::scaffold("Root", ["A", "Mid", "D"]).with_transition(Linear))
        .unwrap()
        .entry_point("Root")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap();
    let routes = handler.routes(None).unwrap();

    let payload = render(
        handler
            .handle(position(&routes, "/root/a"), &get("s1"))
            .await
            .unwrap(),
    );

    // Submitting B jumps over C straight to D, a sibling of B's ancestor.
    let request = post("s1").with_param("_id", payload.task_id);
    let url = redirect(
        handler
            .handle(position(&routes, "/root/mid/b"), &request)
            .await
            .unwrap(),
    );
    assert_eq!(split_url(&url).0, "/root/d");
}

#[tokio::test]
async fn test_non_automatic_scaffold_rejects_silent_completion() {
    let store = Arc::new(MemoryStateStore::new());
    // No transition policy on the scaffold.
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("One", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::action("Two", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::scaffold("Strict", ["One", "Two"]))
        .unwrap()
        .entry_point("Strict")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap();
    let routes = handler.routes(None).unwrap();

    let payload = render(
        handler
            .handle(position(&routes, "/strict/one"), &get("s1"))
            .await
            .unwrap(),
    );
    let request = post("s1").with_param("_id", payload.task_id);
    let err = handler
        .handle(position(&routes, "/strict/one"), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Configuration(msg) if msg.contains("explicit destination")));
}

struct EmailForm;

#[async_trait]
impl ActionHandler for EmailForm {
    async fn render(&self, ctx: &mut StepContext<'_>) -> Result<FlowResponse, FlowError> {
        Ok(ctx.render())
    }

    async fn submit(&self, ctx: &mut StepContext<'_>) -> Result<Outcome, FlowError> {
        match ctx.request.param("email") {
            Some(email) if email.contains('@') => {
                ctx.state.insert("email", json!(email));
                Ok(Outcome::Complete)
            }
            _ => {
                ctx.reject_with_errors(json!({"email": "enter a valid address"}));
                let url = ctx.absolute_url().to_string();
                Ok(Outcome::Response(FlowResponse::Redirect(url)))
            }
        }
    }
}

#[tokio::test]
async fn test_rejected_submission_renders_errors_once() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("Email", EmailForm))
        .unwrap()
        .component(ComponentDefinition::action("Confirm", DefaultAction))
        .unwrap()
        .component(ComponentDefinition::scaffold("Signup", ["Email", "Confirm"]).with_transition(Linear))
        .unwrap()
        .entry_point("Signup")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap();
    let routes = handler.routes(None).unwrap();
    let at_email = position(&routes, "/signup/email");

    let payload = render(handler.handle(at_email, &get("s1")).await.unwrap());
    let task_id = payload.task_id;

    // An invalid submission redirects back to the form.
    let bad = post("s1")
        .with_param("_id", task_id.clone())
        .with_param("email", "nope");
    let url = redirect(handler.handle(at_email, &bad).await.unwrap());
    assert_eq!(split_url(&url).0, "/signup/email");

    // The next render carries the errors; the one after does not.
    let reload = get("s1").with_param("_id", task_id.clone());
    let payload = render(handler.handle(at_email, &reload).await.unwrap());
    assert_eq!(payload.errors, Some(json!({"email": "enter a valid address"})));

    let reload = get("s1").with_param("_id", task_id.clone());
    let payload = render(handler.handle(at_email, &reload).await.unwrap());
    assert_eq!(payload.errors, None);

    // A valid submission stores the value and advances.
    let good = post("s1")
        .with_param("_id", task_id)
        .with_param("email", "a@b.c");
    let url = redirect(handler.handle(at_email, &good).await.unwrap());
    assert_eq!(split_url(&url).0, "/signup/confirm");
}

#[tokio::test]
async fn test_required_state_guard_vetoes_early_access() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("Email", DefaultAction))
        .unwrap()
        .component(
            ComponentDefinition::action("Confirm", DefaultAction).requires_state(["email"]),
        )
        .unwrap()
        .component(ComponentDefinition::scaffold("Signup", ["Email", "Confirm"]).with_transition(Linear))
        .unwrap()
        .entry_point("Signup")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap();
    let routes = handler.routes(None).unwrap();

    let payload = render(
        handler
            .handle(position(&routes, "/signup/email"), &get("s1"))
            .await
            .unwrap(),
    );

    // Jumping straight to the confirm step is vetoed until the email step
    // populated its state.
    let request = get("s1").with_param("_id", payload.task_id);
    let response = handler
        .handle(position(&routes, "/signup/confirm"), &request)
        .await
        .unwrap();
    assert!(matches!(response, FlowResponse::Status { code: 422, .. }));
}

#[tokio::test]
async fn test_precondition_vetoes_before_any_hook() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("Step", DefaultAction))
        .unwrap()
        .component(
            ComponentDefinition::scaffold("Secure", ["Step"])
                .with_transition(Linear)
                .with_precondition(EnsureAuthenticated::new().with_error_url("/login")),
        )
        .unwrap()
        .entry_point("Secure")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap();
    let routes = handler.routes(None).unwrap();
    let at_step = position(&routes, "/secure/step");

    let response = handler.handle(at_step, &get("s1")).await.unwrap();
    assert_eq!(response, FlowResponse::Redirect("/login".to_string()));

    let authenticated = get("s1").with_context("authenticated", json!(true));
    let payload = render(handler.handle(at_step, &authenticated).await.unwrap());
    assert_eq!(payload.action, "Step");
}

#[tokio::test]
async fn test_route_enumeration_and_uniqueness() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store);

    let routes = handler.routes(None).unwrap();
    let paths: Vec<&str> = routes.iter().map(Route::path).collect();
    assert_eq!(paths, ["/root/a", "/root/mid/b", "/root/mid/c", "/root/d"]);

    // A namespaced enumeration addresses distinct positions.
    let namespaced = handler.routes(Some("signup")).unwrap();
    assert!(namespaced[0].position().url_name().starts_with("flow_signup_"));
}

#[tokio::test]
async fn test_colliding_urls_fail_route_enumeration() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = FlowHandler::builder()
        .component(ComponentDefinition::action("X", DefaultAction).with_url("/same"))
        .unwrap()
        .component(ComponentDefinition::action("Y", DefaultAction).with_url("/same"))
        .unwrap()
        .component(ComponentDefinition::scaffold("R", ["X", "Y"]).with_transition(Linear))
        .unwrap()
        .entry_point("R")
        .store(store)
        .binder(SessionBinder::new())
        .build()
        .unwrap();

    let err = handler.routes(None).unwrap_err();
    assert!(matches!(err, FlowError::Configuration(msg) if msg.contains("/r/same")));
}

#[tokio::test]
async fn test_entry_url_carries_completion_destination() {
    let store = Arc::new(MemoryStateStore::new());
    let handler = sample_handler(store);

    let url = handler
        .entry_url(&"Root".into(), Some("/done"), None)
        .unwrap();
    assert_eq!(url, "/root/a?_on_complete=%2Fdone");

    // A destination with its own query string must not bleed into ours.
    let url = handler
        .entry_url(&"Root".into(), Some("/done?next=1&kind=trial"), None)
        .unwrap();
    assert_eq!(url, "/root/a?_on_complete=%2Fdone%3Fnext%3D1%26kind%3Dtrial");

    let bare = handler.entry_url(&"Root".into(), None, None).unwrap();
    assert_eq!(bare, "/root/a");
}
