//! HTTP server setup and dispatch.
//!
//! # Responsibilities
//! - Build the axum Router: catch-all dispatch plus the WebSocket endpoint
//! - Wire up middleware (CORS, tracing)
//! - Bind the listener and run one instance to completion
//! - Execute the matched endpoint's action and shape the response
//!
//! # Design Decisions
//! - The dispatch table is scanned in registration order, first match wins;
//!   no per-request pattern parsing
//! - Configured headers and content type are applied before a handler
//!   script's own response fields
//! - Index mutations go through the per-index lock; everything else in the
//!   table is immutable

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::util::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::lifecycle::Shutdown;
use crate::payload::{PayloadBody, ResolvedPayload};
use crate::routing::compiler::{Action, ConfiguredHeaders, SharedIndex};
use crate::routing::{DispatchTable, PathParams};
use crate::script::{LoadedScript, ScriptError, ScriptRequest, SocketPeer};
use crate::socket::parse_envelope;
use crate::store::{IndexError, IndexKey};

/// Request bodies larger than this are truncated away.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Application state injected into handlers. One per instance.
#[derive(Clone)]
struct AppState {
    table: Arc<DispatchTable>,
}

/// One running server generation: bound address, compiled dispatch table,
/// live listener task. Destroyed before the next generation starts.
pub struct ServerInstance {
    addr: SocketAddr,
    shutdown: Shutdown,
    task: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl ServerInstance {
    /// Bind `address` and serve the compiled table until shut down.
    pub async fn serve(address: &str, table: DispatchTable) -> Result<Self, std::io::Error> {
        let state = AppState {
            table: Arc::new(table),
        };

        let mut router = Router::new();
        if !state.table.socket.is_empty() {
            router = router.route("/ws", get(socket_upgrade));
        }
        let router = router
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(address).await?;
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        _ = signal.recv() => {}
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Shutdown signal received");
                        }
                    }
                })
                .await
        });

        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close the listener and wait for the serve task to finish. In-flight
    /// requests are not drained beyond what the transport already started.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        match self.task.await {
            Ok(Err(err)) => tracing::error!(error = %err, "serve task ended with error"),
            Err(err) => tracing::error!(error = %err, "serve task panicked"),
            Ok(Ok(())) => {}
        }
        tracing::info!(address = %self.addr, "HTTP server stopped");
    }

    /// Run until the serve task exits on its own (error or shutdown signal).
    pub async fn wait(&mut self) -> Result<(), std::io::Error> {
        (&mut self.task)
            .await
            .unwrap_or_else(|err| Err(std::io::Error::other(err)))
    }
}

/// Main dispatch handler: look up the endpoint, execute its action.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(method = %method, path = %path, "dispatching request");

    let Some((endpoint, params)) = state.table.find(&method, &path) else {
        tracing::debug!(method = %method, path = %path, "no route matched");
        return empty(StatusCode::NOT_FOUND);
    };

    match &endpoint.action {
        Action::Fixed { payload, headers } => fixed_response(payload, headers),
        Action::Mount { serve, prefix } => serve_mount(serve.clone(), prefix, request).await,
        Action::Script {
            script,
            verb,
            content_type,
            headers,
        } => {
            run_script(
                &state.table,
                script,
                verb,
                content_type.as_deref(),
                headers,
                params,
                request,
            )
            .await
        }
        Action::List { index } => {
            let index = index.read().await;
            json_body(StatusCode::OK, &Value::Array(index.list().to_vec()))
        }
        Action::Create { index } => create_item(index, request).await,
        Action::Fetch { index, param } => {
            let key = key_from(&params, param);
            match index.read().await.get(&key) {
                Ok(item) => json_body(StatusCode::OK, item),
                Err(_) => empty(StatusCode::NOT_FOUND),
            }
        }
        Action::Merge { index, param } => {
            mutate_item(index, &params, param, request, |index, key, body| {
                index.merge(key, body)
            })
            .await
        }
        Action::Replace { index, param } => {
            mutate_item(index, &params, param, request, |index, key, body| {
                index.replace(key, body)
            })
            .await
        }
        Action::Delete { index, param } => {
            let key = key_from(&params, param);
            match index.write().await.delete(&key) {
                Ok(()) => empty(StatusCode::NO_CONTENT),
                Err(_) => empty(StatusCode::NOT_FOUND),
            }
        }
    }
}

async fn create_item(index: &SharedIndex, request: Request<Body>) -> Response {
    let Some(item) = read_json_body(request).await else {
        return empty(StatusCode::BAD_REQUEST);
    };
    match index.write().await.create(item) {
        Ok(()) => empty(StatusCode::CREATED),
        Err(IndexError::Conflict(key)) => {
            tracing::debug!(key = ?key, "create conflicts with existing item");
            empty(StatusCode::CONFLICT)
        }
        Err(IndexError::NotFound(_)) => empty(StatusCode::NOT_FOUND),
    }
}

async fn mutate_item<F>(
    index: &SharedIndex,
    params: &PathParams,
    param: &str,
    request: Request<Body>,
    apply: F,
) -> Response
where
    F: FnOnce(&mut crate::store::ResourceIndex, &IndexKey, Value) -> Result<(), IndexError>,
{
    let Some(body) = read_json_body(request).await else {
        return empty(StatusCode::BAD_REQUEST);
    };
    let key = key_from(params, param);
    match apply(&mut *index.write().await, &key, body) {
        Ok(()) => empty(StatusCode::NO_CONTENT),
        Err(_) => empty(StatusCode::NOT_FOUND),
    }
}

fn key_from(params: &PathParams, param: &str) -> IndexKey {
    vec![params.get(param).cloned().unwrap_or_default()]
}

async fn read_json_body(request: Request<Body>) -> Option<Value> {
    let bytes = axum::body::to_bytes(request.into_body(), BODY_LIMIT)
        .await
        .ok()?;
    if bytes.is_empty() {
        return Some(Value::Null);
    }
    serde_json::from_slice(&bytes).ok()
}

fn fixed_response(payload: &ResolvedPayload, headers: &ConfiguredHeaders) -> Response {
    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(content_type) = &payload.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder = apply_headers(builder, headers);
    let body = match &payload.body {
        PayloadBody::Text(text) => Body::from(text.clone()),
        PayloadBody::Binary(raw) => Body::from(raw.clone()),
    };
    builder.body(body).unwrap_or_else(|_| {
        empty(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

async fn run_script(
    table: &DispatchTable,
    script: &LoadedScript,
    verb: &str,
    content_type: Option<&str>,
    headers: &ConfiguredHeaders,
    params: PathParams,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let query = parse_query(parts.uri.query());
    let header_map: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body_bytes = axum::body::to_bytes(body, BODY_LIMIT).await.unwrap_or_default();
    let body_value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
        })
    };

    let script_request = ScriptRequest {
        method: verb.to_string(),
        path: parts.uri.path().to_string(),
        params,
        query,
        headers: header_map,
        body: body_value,
    };

    match table.scripts.invoke_http(script, verb, &script_request) {
        Ok(result) => {
            let status =
                StatusCode::from_u16(result.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            // Configured headers and content type go on first; the script's
            // own headers may override them.
            let mut builder = Response::builder().status(status);
            if let Some(content_type) = content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            builder = apply_headers(builder, headers);
            let mut script_set_content_type = false;
            for (name, value) in &result.headers {
                if name.eq_ignore_ascii_case("content-type") {
                    script_set_content_type = true;
                    if let Some(headers_mut) = builder.headers_mut() {
                        headers_mut.remove(header::CONTENT_TYPE);
                    }
                }
                builder = builder.header(name.as_str(), value.as_str());
            }

            let body = match result.body {
                None => Body::empty(),
                Some(Value::String(text)) => Body::from(text),
                Some(structured) => {
                    if content_type.is_none() && !script_set_content_type {
                        builder = builder.header(header::CONTENT_TYPE, "application/json");
                    }
                    Body::from(
                        serde_json::to_string_pretty(&structured)
                            .unwrap_or_else(|_| structured.to_string()),
                    )
                }
            };
            builder
                .body(body)
                .unwrap_or_else(|_| empty(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(ScriptError::NotExported { function, .. }) => {
            tracing::debug!(verb = %function, "script does not implement verb");
            empty(StatusCode::NOT_IMPLEMENTED)
        }
        Err(err) => {
            tracing::error!(error = %err, "handler script failed");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn serve_mount(serve: ServeDir, prefix: &str, request: Request<Body>) -> Response {
    let (mut parts, _body) = request.into_parts();
    let full_path = parts.uri.path().to_string();
    let stripped = full_path.strip_prefix(prefix).unwrap_or(full_path.as_str());
    let stripped = if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    };
    let rewritten = match parts.uri.query() {
        Some(query) => format!("{stripped}?{query}"),
        None => stripped,
    };
    if let Ok(uri) = rewritten.parse() {
        parts.uri = uri;
    }
    let request = Request::from_parts(parts, Body::empty());

    match serve.oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(infallible) => match infallible {},
    }
}

fn apply_headers(
    mut builder: axum::http::response::Builder,
    headers: &ConfiguredHeaders,
) -> axum::http::response::Builder {
    for (name, value) in headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => tracing::warn!(header = %name, "skipping invalid configured header"),
        }
    }
    builder
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn json_body(status: StatusCode, value: &Value) -> Response {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(text))
        .unwrap_or_else(|_| empty(StatusCode::INTERNAL_SERVER_ERROR))
}

fn empty(status: StatusCode) -> Response {
    (status, Body::empty()).into_response()
}

/// Upgrade handler for the messaging endpoint.
async fn socket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Per-connection loop: inbound envelopes dispatch through the socket
/// router; outbound frames queued by handlers flush back to the client.
async fn handle_socket(state: AppState, mut socket: WebSocket) {
    tracing::debug!("socket connected");
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let peer = SocketPeer::new(outbound_tx);

    enum ConnEvent {
        Inbound(Option<Result<Message, axum::Error>>),
        Outbound(Option<String>),
    }

    loop {
        let event = tokio::select! {
            inbound = socket.recv() => ConnEvent::Inbound(inbound),
            outbound = outbound_rx.recv() => ConnEvent::Outbound(outbound),
        };

        match event {
            ConnEvent::Inbound(Some(Ok(Message::Text(text)))) => {
                match parse_envelope(text.as_str()) {
                    Some(envelope) => {
                        state.table.socket.dispatch(
                            &state.table.scripts,
                            &envelope.event,
                            &envelope.data,
                            &peer,
                        );
                    }
                    None => tracing::trace!("dropping non-envelope frame"),
                }
            }
            ConnEvent::Inbound(Some(Ok(Message::Close(_))))
            | ConnEvent::Inbound(None)
            | ConnEvent::Outbound(None) => break,
            ConnEvent::Inbound(Some(Ok(_))) => {}
            ConnEvent::Inbound(Some(Err(err))) => {
                tracing::debug!(error = %err, "socket receive failed");
                break;
            }
            ConnEvent::Outbound(Some(frame)) => {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("socket disconnected");
}
