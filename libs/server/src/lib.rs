//! HTTP API adapter.
//!
//! Every registered APIEndpoint extension mounts its applet tree at
//! `/<name>/`, children at `/<name>/<child>/`, and so on. Requests must
//! negotiate JSON; parameters come from the query string (GET) or a JSON
//! body object (POST). Each route re-enters the same tree dispatch the
//! CLI uses and wraps the outcome as `{"result": ...}`. Failures become
//! `{"error": ...}` with the matching status code, so one misbehaving
//! endpoint never takes down the server.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, Request, State},
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Map, Value, json};
use steward_kit::applet::{AppletError, DispatchError, Node};
use tracing::{error, info};

#[derive(Clone)]
struct RouteState {
    root: Arc<Node>,
    selectors: Arc<Vec<String>>,
}

/// Builds the router for a set of named endpoint trees.
pub fn build_router(endpoints: Vec<(String, Node)>) -> Router {
    let mut router = Router::new();
    let mut mounted = BTreeMap::new();

    for (name, node) in endpoints {
        let root = Arc::new(node);
        let url = format!("/{name}/");
        router = mount(router, &mut mounted, &root, &url, Vec::new());
        info!(endpoint = name, "mounted http endpoint");
    }

    router
        .route("/_/", get(introspect).with_state(Arc::new(mounted)))
        .fallback(unknown_endpoint)
        .layer(middleware::from_fn(require_json))
}

/// Binds and serves until the process is stopped.
pub async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn mount(
    mut router: Router,
    mounted: &mut BTreeMap<String, String>,
    root: &Arc<Node>,
    url: &str,
    selectors: Vec<String>,
) -> Router {
    let node = match root.descend(&as_strs(&selectors)) {
        Some(node) => node,
        None => return router,
    };
    mounted.insert(url.to_owned(), node.help().to_owned());

    let state = RouteState {
        root: Arc::clone(root),
        selectors: Arc::new(selectors.clone()),
    };
    router = router.route(url, get(handle_applet).post(handle_applet).with_state(state));

    let children: Vec<String> = node.children().map(|(name, _)| name.to_owned()).collect();
    for child in children {
        let child_url = format!("{url}{child}/");
        let mut child_selectors = selectors.clone();
        child_selectors.push(child);
        router = mount(router, mounted, root, &child_url, child_selectors);
    }
    router
}

async fn handle_applet(
    State(state): State<RouteState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let raw = match raw_parameters(&method, &query, &body) {
        Ok(raw) => raw,
        Err(response) => return response,
    };

    match state.root.dispatch(&as_strs(&state.selectors), &raw) {
        Ok(outcome) => (StatusCode::OK, Json(outcome.to_body())).into_response(),
        Err(DispatchError::Binding(AppletError::NotInvocable)) => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "endpoint is not directly invocable, use a child path",
        ),
        Err(DispatchError::Binding(binding)) => {
            error_response(StatusCode::BAD_REQUEST, &binding.to_string())
        }
        Err(DispatchError::Handler(failure)) => {
            error!(error = %format!("{failure:#}"), "endpoint handler failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{failure:#}"))
        }
    }
}

/// GET parameters come from the query string as strings (the binding
/// layer coerces them); POST parameters come from a JSON object body.
fn raw_parameters(
    method: &Method,
    query: &HashMap<String, String>,
    body: &Bytes,
) -> Result<Map<String, Value>, Response> {
    if method == Method::GET {
        return Ok(query
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect());
    }
    if body.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "request body must be a JSON object",
        )),
        Err(_) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "request body is not valid JSON",
        )),
    }
}

async fn require_json(request: Request, next: Next) -> Response {
    let headers = request.headers();
    if let Some(accept) = headers.get(header::ACCEPT) {
        let accept = accept.to_str().unwrap_or("");
        if !accept.contains("application/json") && !accept.contains("*/*") {
            return error_response(
                StatusCode::NOT_ACCEPTABLE,
                "this API only serves application/json",
            );
        }
    }
    if request.method() == Method::POST || request.method() == Method::PUT {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !content_type.contains("application/json") {
            return error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "this API only accepts application/json requests",
            );
        }
    }
    next.run(request).await
}

async fn introspect(State(mounted): State<Arc<BTreeMap<String, String>>>) -> Response {
    (StatusCode::OK, Json(json!({ "result": &*mounted }))).into_response()
}

async fn unknown_endpoint() -> Response {
    error_response(StatusCode::NOT_FOUND, "no such endpoint")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn as_strs(selectors: &[String]) -> Vec<&str> {
    selectors.iter().map(String::as_str).collect()
}
