//! Route compilation.
//!
//! # Responsibilities
//! - Turn a validated ConfigSnapshot into one frozen DispatchTable
//! - Preflight every route: referenced paths exist, indexed collections are
//!   arrays, patterns compile
//! - Resolve static/inline payloads once, build resource indexes, load
//!   handler scripts
//!
//! # Design Decisions
//! - Compilation is all-or-nothing: the first preflight violation aborts the
//!   whole load with the route's array position in the diagnostic
//! - Indexed routes ignore declared methods and register the fixed CRUD set
//!   across the detail path and the derived list path
//! - A static path that is a directory becomes a prefix-matched
//!   pass-through mount instead of a single payload

use axum::http::Method;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::services::ServeDir;

use crate::config::schema::{Direction, MatchType, RouteConfig};
use crate::config::ConfigSnapshot;
use crate::payload::{self, PayloadError, ResolvedPayload};
use crate::routing::pattern::{self, PathParams, PathPattern, PatternError};
use crate::script::{HandlerCache, LoadedScript, ScriptError};
use crate::socket::{EventMatcher, SocketRoute, SocketRouter};
use crate::store::ResourceIndex;

/// Fatal compilation failure, tagged with the offending route's position.
#[derive(Debug, Error)]
#[error("{section} route[{position}] ({detail}): {kind}")]
pub struct CompileError {
    pub section: &'static str,
    pub position: usize,
    pub detail: String,
    pub kind: CompileErrorKind,
}

#[derive(Debug, Error)]
pub enum CompileErrorKind {
    #[error("static path does not exist: {0:?}")]
    MissingStatic(PathBuf),
    #[error("handler path does not exist: {0:?}")]
    MissingHandler(PathBuf),
    #[error("indexed routes must use matchType==\"params\"")]
    IndexNeedsParams,
    #[error("only contentType==\"application/json\" is indexable")]
    IndexNeedsJson,
    #[error("indexed routes need exactly one named parameter")]
    IndexParamCount,
    #[error("route must declare at least one method")]
    NoMethods,
    #[error("unsupported method \"{0}\"")]
    UnsupportedMethod(String),
    #[error("socket routes support only exact or regex matching")]
    UnsupportedEventMatch,
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// A resource index shared by the five endpoints of one indexed route.
///
/// Dispatch runs on the transport's worker pool, so mutation goes through a
/// per-index lock; the index is still owned by exactly one route of one
/// instance.
pub type SharedIndex = Arc<RwLock<ResourceIndex>>;

/// Response headers configured on a route, applied before the payload or
/// handler result.
pub type ConfiguredHeaders = Arc<Vec<(String, String)>>;

/// What a matched endpoint does.
#[derive(Debug)]
pub enum Action {
    /// Serve one frozen payload.
    Fixed {
        payload: Arc<ResolvedPayload>,
        headers: ConfiguredHeaders,
    },
    /// Invoke a verb-named handler script function.
    Script {
        script: Arc<LoadedScript>,
        verb: String,
        content_type: Option<String>,
        headers: ConfiguredHeaders,
    },
    /// Pass-through file serving under a path prefix.
    Mount { serve: ServeDir, prefix: String },
    /// Indexed collection, full list.
    List { index: SharedIndex },
    /// Indexed create; 409 on key conflict.
    Create { index: SharedIndex },
    /// Indexed detail lookup; 404 when absent.
    Fetch { index: SharedIndex, param: String },
    /// Indexed shallow merge; 404 when absent.
    Merge { index: SharedIndex, param: String },
    /// Indexed full replace; 404 when absent.
    Replace { index: SharedIndex, param: String },
    /// Indexed delete; 404 when absent.
    Delete { index: SharedIndex, param: String },
}

/// One registered (method, pattern, action) entry.
#[derive(Debug)]
pub struct Endpoint {
    pub method: Method,
    pub pattern: PathPattern,
    pub action: Action,
}

/// One instance's complete dispatch state: the HTTP table, the socket
/// router, and the script cache that owns every compiled handler.
#[derive(Debug)]
pub struct DispatchTable {
    pub endpoints: Vec<Endpoint>,
    pub socket: SocketRouter,
    pub scripts: HandlerCache,
}

impl DispatchTable {
    /// Find the first endpoint matching this request, in registration order.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Endpoint, PathParams)> {
        self.endpoints.iter().find_map(|endpoint| {
            if endpoint.method != *method {
                return None;
            }
            endpoint
                .pattern
                .matches(path)
                .map(|params| (endpoint, params))
        })
    }
}

/// Compile a validated snapshot into a dispatch table.
pub fn compile(snapshot: &ConfigSnapshot) -> Result<DispatchTable, CompileError> {
    let mut scripts = HandlerCache::new();
    let mut endpoints = Vec::new();

    for (position, route) in snapshot.document.http.iter().enumerate() {
        compile_http_route(snapshot, &mut scripts, &mut endpoints, route).map_err(|kind| {
            CompileError {
                section: "http",
                position,
                detail: route.describe(),
                kind,
            }
        })?;
    }

    let mut socket_routes = Vec::new();
    for (position, route) in snapshot.document.socket.iter().enumerate() {
        if route.direction != Direction::Inbound {
            continue;
        }
        let compiled = compile_socket_route(snapshot, &mut scripts, route).map_err(|kind| {
            CompileError {
                section: "socket",
                position,
                detail: route.event.clone(),
                kind,
            }
        })?;
        socket_routes.push(compiled);
    }

    tracing::info!(
        endpoints = endpoints.len(),
        socket_routes = socket_routes.len(),
        "dispatch table compiled"
    );

    Ok(DispatchTable {
        endpoints,
        socket: SocketRouter::new(socket_routes),
        scripts,
    })
}

fn compile_http_route(
    snapshot: &ConfigSnapshot,
    scripts: &mut HandlerCache,
    endpoints: &mut Vec<Endpoint>,
    route: &RouteConfig,
) -> Result<(), CompileErrorKind> {
    if route.index {
        return compile_indexed_route(snapshot, endpoints, route);
    }

    let headers: ConfiguredHeaders = Arc::new(
        route
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    );

    let methods = route.declared_methods();
    if methods.is_empty() {
        return Err(CompileErrorKind::NoMethods);
    }

    if let Some(handler) = &route.handler {
        let path = snapshot.resolve(handler);
        if !path.exists() {
            return Err(CompileErrorKind::MissingHandler(path));
        }
        let script = scripts.load(&path)?;
        for verb in methods {
            tracing::info!(method = %verb, path = %route.path, "registering route with handler script");
            endpoints.push(Endpoint {
                method: parse_method(&verb)?,
                pattern: PathPattern::compile(&route.path, route.match_type)?,
                action: Action::Script {
                    script: script.clone(),
                    verb,
                    content_type: route.content_type().map(str::to_string),
                    headers: headers.clone(),
                },
            });
        }
        return Ok(());
    }

    if let Some(static_path) = &route.static_path {
        let path = snapshot.resolve(static_path);
        if !path.exists() {
            return Err(CompileErrorKind::MissingStatic(path));
        }
        if path.is_dir() {
            for verb in methods {
                tracing::info!(method = %verb, path = %route.path, dir = %path.display(), "registering file-serving mount");
                endpoints.push(Endpoint {
                    method: parse_method(&verb)?,
                    pattern: PathPattern::prefix(&route.path),
                    action: Action::Mount {
                        serve: ServeDir::new(&path),
                        prefix: route.path.trim_end_matches('/').to_string(),
                    },
                });
            }
            return Ok(());
        }
        let payload = Arc::new(payload::resolve_static(&path, route.content_type())?);
        return register_fixed(endpoints, route, methods, payload, headers);
    }

    // Validation guarantees exactly one source, so this is the inline arm.
    let inline = route.inline.as_ref().expect("validated route has a source");
    let payload = Arc::new(payload::resolve_inline(inline, route.content_type())?);
    register_fixed(endpoints, route, methods, payload, headers)
}

fn register_fixed(
    endpoints: &mut Vec<Endpoint>,
    route: &RouteConfig,
    methods: Vec<String>,
    payload: Arc<ResolvedPayload>,
    headers: ConfiguredHeaders,
) -> Result<(), CompileErrorKind> {
    let kind = if route.static_path.is_some() { "static" } else { "inline" };
    for verb in methods {
        tracing::info!(method = %verb, path = %route.path, "registering {kind} route");
        endpoints.push(Endpoint {
            method: parse_method(&verb)?,
            pattern: PathPattern::compile(&route.path, route.match_type)?,
            action: Action::Fixed {
                payload: payload.clone(),
                headers: headers.clone(),
            },
        });
    }
    Ok(())
}

fn compile_indexed_route(
    snapshot: &ConfigSnapshot,
    endpoints: &mut Vec<Endpoint>,
    route: &RouteConfig,
) -> Result<(), CompileErrorKind> {
    if route.match_type != MatchType::Params {
        return Err(CompileErrorKind::IndexNeedsParams);
    }
    if route.content_type() != Some("application/json") {
        return Err(CompileErrorKind::IndexNeedsJson);
    }
    let params = pattern::param_names(&route.path);
    let [param] = params.as_slice() else {
        return Err(CompileErrorKind::IndexParamCount);
    };

    let items = if let Some(static_path) = &route.static_path {
        let path = snapshot.resolve(static_path);
        if !path.exists() {
            return Err(CompileErrorKind::MissingStatic(path));
        }
        payload::load_collection(&path)?
    } else {
        let inline = route.inline.as_ref().expect("validated route has a source");
        payload::collection_items(inline.clone())?
    };

    let index: SharedIndex = Arc::new(RwLock::new(ResourceIndex::build(
        items,
        vec![param.clone()],
    )));
    let detail = PathPattern::compile(&route.path, MatchType::Params)?;
    let list = PathPattern::Exact(pattern::list_path(&route.path, param));

    tracing::info!(path = %route.path, param = %param, "registering indexed route");

    // List endpoints on the derived path, then the detail CRUD set.
    endpoints.push(Endpoint {
        method: Method::GET,
        pattern: list.clone(),
        action: Action::List {
            index: index.clone(),
        },
    });
    endpoints.push(Endpoint {
        method: Method::POST,
        pattern: list,
        action: Action::Create {
            index: index.clone(),
        },
    });
    for (method, make) in [
        (Method::GET, make_fetch as fn(SharedIndex, String) -> Action),
        (Method::PATCH, make_merge),
        (Method::PUT, make_replace),
        (Method::DELETE, make_delete),
    ] {
        endpoints.push(Endpoint {
            method,
            pattern: detail.clone(),
            action: make(index.clone(), param.clone()),
        });
    }
    Ok(())
}

fn make_fetch(index: SharedIndex, param: String) -> Action {
    Action::Fetch { index, param }
}

fn make_merge(index: SharedIndex, param: String) -> Action {
    Action::Merge { index, param }
}

fn make_replace(index: SharedIndex, param: String) -> Action {
    Action::Replace { index, param }
}

fn make_delete(index: SharedIndex, param: String) -> Action {
    Action::Delete { index, param }
}

fn compile_socket_route(
    snapshot: &ConfigSnapshot,
    scripts: &mut HandlerCache,
    route: &crate::config::schema::SocketRouteConfig,
) -> Result<SocketRoute, CompileErrorKind> {
    let path = snapshot.resolve(&route.handler);
    if !path.exists() {
        return Err(CompileErrorKind::MissingHandler(path));
    }
    let script = scripts.load(&path)?;
    let matcher = match route.match_type {
        MatchType::Exact => EventMatcher::Exact(route.event.clone()),
        MatchType::Regex => EventMatcher::Regex(Regex::new(&route.event).map_err(|source| {
            PatternError::Regex {
                pattern: route.event.clone(),
                source,
            }
        })?),
        MatchType::Params => return Err(CompileErrorKind::UnsupportedEventMatch),
    };
    Ok(SocketRoute { matcher, script })
}

fn parse_method(verb: &str) -> Result<Method, CompileErrorKind> {
    Method::from_bytes(verb.to_ascii_uppercase().as_bytes())
        .map_err(|_| CompileErrorKind::UnsupportedMethod(verb.to_string()))
}
