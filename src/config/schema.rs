//! Configuration schema definitions.
//!
//! This module defines the complete structure of the mock configuration
//! document. All types derive Serde traits for deserialization from the
//! JSON document an operator supplies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration document.
///
/// Shape: `{ "http": [RouteConfig, ...], "socket": [SocketRouteConfig, ...] }`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MockConfig {
    /// HTTP route definitions, dispatched in array order.
    pub http: Vec<RouteConfig>,

    /// Messaging event routes, matched in array order.
    pub socket: Vec<SocketRouteConfig>,
}

/// How a route's path or event pattern is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Literal comparison (trailing-slash-insensitive for paths).
    #[default]
    Exact,
    /// Express-style `:name` parameter segments.
    Params,
    /// Compiled regular expression over the raw path/event.
    Regex,
}

/// Direction of a messaging route. Only inbound routes are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

/// One declarative HTTP route.
///
/// Exactly one of `static`, `inline`, `handler` must be set; validation
/// enforces this before the route compiler ever sees the document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteConfig {
    /// Path pattern, interpreted per `match_type`.
    pub path: String,

    /// Path interpretation mode.
    pub match_type: MatchType,

    /// Single HTTP method. Ignored when `methods` is set.
    pub method: Option<String>,

    /// Explicit method list. Indexed routes ignore both fields and get the
    /// fixed CRUD set instead.
    pub methods: Option<Vec<String>>,

    /// Path to a fixture file (or directory) relative to the config folder.
    #[serde(rename = "static")]
    pub static_path: Option<String>,

    /// Payload embedded directly in the document. A string in data-URI form
    /// (`data:<mime>;base64,...`) is decoded.
    pub inline: Option<serde_json::Value>,

    /// Path to a handler script relative to the config folder.
    pub handler: Option<String>,

    /// Content type applied to responses.
    pub content_type: Option<String>,

    /// Extra response headers.
    pub headers: Option<BTreeMap<String, String>>,

    /// Expose the backing collection as a keyed CRUD resource.
    pub index: bool,

    /// Additional files to watch for reload (handler routes only).
    pub assets: Vec<String>,
}

impl RouteConfig {
    /// Declared methods, lower-cased. Empty when neither field is set.
    pub fn declared_methods(&self) -> Vec<String> {
        let raw: Vec<&String> = match (&self.methods, &self.method) {
            (Some(list), _) => list.iter().collect(),
            (None, Some(single)) => vec![single],
            (None, None) => Vec::new(),
        };
        raw.into_iter().map(|m| m.to_ascii_lowercase()).collect()
    }

    /// Declared content type, treating an empty string as absent.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref().filter(|ct| !ct.is_empty())
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        let source = if self.static_path.is_some() {
            "static"
        } else if self.inline.is_some() {
            "inline"
        } else if self.handler.is_some() {
            "handler"
        } else {
            "no source"
        };
        format!("{} ({})", self.path, source)
    }
}

/// One declarative messaging route.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SocketRouteConfig {
    /// Event pattern, interpreted per `match_type`.
    pub event: String,

    /// Event interpretation mode: exact or regex.
    pub match_type: MatchType,

    /// Only `inbound` routes are compiled; others are skipped.
    pub direction: Direction,

    /// Path to a handler script relative to the config folder.
    pub handler: String,
}
