//! Handler script loading and invocation.
//!
//! # Responsibilities
//! - Load and compile user-supplied Rhai handler scripts
//! - Cache compiled scripts for one instance's lifetime
//! - Invoke verb-named functions for HTTP routes and event-named functions
//!   for socket routes
//!
//! # Design Decisions
//! - The cache is owned by exactly one server instance; a reload builds a
//!   fresh cache and therefore recompiles every script from disk
//! - Verb dispatch is capability-checked against the compiled AST's function
//!   list; invoking an unexported verb is an explicit error, never a silent
//!   no-op
//! - Event names bind to their identifier form (`chat:join` → `chat_join`)
//!   since script function names must be identifiers

use rhai::{Dynamic, Engine, Scope, AST};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error loading or running a handler script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read handler script {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to compile handler script {path:?}: {message}")]
    Compile { path: PathBuf, message: String },
    #[error("handler script {path:?} does not define \"{function}\"")]
    NotExported { path: PathBuf, function: String },
    #[error("handler script {path:?} failed in \"{function}\": {message}")]
    Eval {
        path: PathBuf,
        function: String,
        message: String,
    },
}

/// The request map passed to an HTTP handler function.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptRequest {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// What a handler function produced, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// One side of a socket connection, handed to event handler functions as
/// `conn`. `conn.emit(event, data)` queues an outbound JSON envelope.
#[derive(Clone)]
pub struct SocketPeer {
    outbound: mpsc::UnboundedSender<String>,
}

impl SocketPeer {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { outbound }
    }

    fn emit(&mut self, event: &str, data: Dynamic) {
        let value = rhai::serde::from_dynamic::<Value>(&data).unwrap_or(Value::Null);
        let frame = serde_json::json!({ "event": event, "data": value });
        // Send failure means the connection is gone; nothing to do.
        let _ = self.outbound.send(frame.to_string());
    }
}

/// A compiled handler script.
#[derive(Debug)]
pub struct LoadedScript {
    path: PathBuf,
    ast: AST,
}

impl LoadedScript {
    /// Whether the script defines a function under this name.
    pub fn exports(&self, function: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == function)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Per-instance script engine plus compiled-script cache.
#[derive(Debug)]
pub struct HandlerCache {
    engine: Engine,
    scripts: HashMap<PathBuf, Arc<LoadedScript>>,
}

impl HandlerCache {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.register_type_with_name::<SocketPeer>("Connection");
        engine.register_fn("emit", SocketPeer::emit);
        Self {
            engine,
            scripts: HashMap::new(),
        }
    }

    /// Return the cached script, or read + compile fresh and cache it.
    pub fn load(&mut self, path: &Path) -> Result<Arc<LoadedScript>, ScriptError> {
        if let Some(script) = self.scripts.get(path) {
            return Ok(script.clone());
        }
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ast = self
            .engine
            .compile(&source)
            .map_err(|err| ScriptError::Compile {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let script = Arc::new(LoadedScript {
            path: path.to_path_buf(),
            ast,
        });
        self.scripts.insert(path.to_path_buf(), script.clone());
        Ok(script)
    }

    /// Invoke the verb-named function of an HTTP handler script.
    pub fn invoke_http(
        &self,
        script: &LoadedScript,
        verb: &str,
        request: &ScriptRequest,
    ) -> Result<ScriptResponse, ScriptError> {
        if !script.exports(verb) {
            return Err(ScriptError::NotExported {
                path: script.path.clone(),
                function: verb.to_string(),
            });
        }
        let request = rhai::serde::to_dynamic(request).map_err(|err| ScriptError::Eval {
            path: script.path.clone(),
            function: verb.to_string(),
            message: err.to_string(),
        })?;
        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &script.ast, verb, (request,))
            .map_err(|err| ScriptError::Eval {
                path: script.path.clone(),
                function: verb.to_string(),
                message: err.to_string(),
            })?;
        let value = rhai::serde::from_dynamic::<Value>(&result).unwrap_or(Value::Null);
        Ok(interpret_response(value))
    }

    /// Invoke an event handler function of a socket handler script.
    pub fn invoke_socket(
        &self,
        script: &LoadedScript,
        function: &str,
        peer: SocketPeer,
        data: &Value,
    ) -> Result<(), ScriptError> {
        let data = rhai::serde::to_dynamic(data).map_err(|err| ScriptError::Eval {
            path: script.path.clone(),
            function: function.to_string(),
            message: err.to_string(),
        })?;
        let mut scope = Scope::new();
        self.engine
            .call_fn::<Dynamic>(&mut scope, &script.ast, function, (peer, data))
            .map_err(|err| ScriptError::Eval {
                path: script.path.clone(),
                function: function.to_string(),
                message: err.to_string(),
            })?;
        Ok(())
    }
}

impl Default for HandlerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// An event's script function name: identifier characters kept, everything
/// else mapped to `_`, with a leading `_` if the event starts with a digit.
pub fn event_function_name(event: &str) -> String {
    let mut name: String = event
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Normalize a handler function's return value: a map carrying any of
/// `status`/`headers`/`body` is a response descriptor; anything else is a
/// bare 200 body.
fn interpret_response(value: Value) -> ScriptResponse {
    if let Value::Object(ref fields) = value {
        let descriptor = ["status", "headers", "body"]
            .iter()
            .any(|k| fields.contains_key(*k));
        if descriptor {
            let status = fields
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(200);
            let headers = fields
                .get("headers")
                .and_then(Value::as_object)
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let body = fields.get("body").filter(|b| !b.is_null()).cloned();
            return ScriptResponse {
                status,
                headers,
                body,
            };
        }
    }

    ScriptResponse {
        status: 200,
        headers: Vec::new(),
        body: match value {
            Value::Null => None,
            other => Some(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_script(source: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handler.rhai");
        std::fs::write(&path, source).unwrap();
        (dir, path)
    }

    fn request() -> ScriptRequest {
        ScriptRequest {
            method: "get".into(),
            path: "/things/7".into(),
            params: HashMap::from([("id".into(), "7".into())]),
            query: HashMap::new(),
            headers: HashMap::new(),
            body: Value::Null,
        }
    }

    #[test]
    fn invokes_verb_named_function() {
        let (_dir, path) = write_script(
            r#"
            fn get(req) {
                #{ status: 200, body: #{ id: req.params.id, ok: true } }
            }
            "#,
        );
        let mut cache = HandlerCache::new();
        let script = cache.load(&path).unwrap();
        let response = cache.invoke_http(&script, "get", &request()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Some(json!({"id": "7", "ok": true})));
    }

    #[test]
    fn bare_return_value_becomes_the_body() {
        let (_dir, path) = write_script(r#"fn get(req) { "pong" }"#);
        let mut cache = HandlerCache::new();
        let script = cache.load(&path).unwrap();
        let response = cache.invoke_http(&script, "get", &request()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Some(json!("pong")));
    }

    #[test]
    fn unexported_verb_is_an_explicit_error() {
        let (_dir, path) = write_script(r#"fn get(req) { "only get" }"#);
        let mut cache = HandlerCache::new();
        let script = cache.load(&path).unwrap();
        let err = cache.invoke_http(&script, "post", &request()).unwrap_err();
        assert!(matches!(err, ScriptError::NotExported { .. }));
    }

    #[test]
    fn load_caches_by_path() {
        let (_dir, path) = write_script(r#"fn get(req) { 1 }"#);
        let mut cache = HandlerCache::new();
        let first = cache.load(&path).unwrap();
        let second = cache.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn compile_error_names_the_script() {
        let (_dir, path) = write_script("fn get(req) {");
        let mut cache = HandlerCache::new();
        let err = cache.load(&path).unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }));
        assert!(err.to_string().contains("handler.rhai"));
    }

    #[test]
    fn socket_handler_can_emit() {
        let (_dir, path) = write_script(
            r#"
            fn chat_join(conn, data) {
                conn.emit("chat:joined", #{ room: data.room });
            }
            "#,
        );
        let mut cache = HandlerCache::new();
        let script = cache.load(&path).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        cache
            .invoke_socket(
                &script,
                "chat_join",
                SocketPeer::new(tx),
                &json!({"room": "lobby"}),
            )
            .unwrap();

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame, json!({"event": "chat:joined", "data": {"room": "lobby"}}));
    }

    #[test]
    fn event_names_map_to_identifiers() {
        assert_eq!(event_function_name("chat:join"), "chat_join");
        assert_eq!(event_function_name("ping"), "ping");
        assert_eq!(event_function_name("2fa-done"), "_2fa_done");
    }
}
