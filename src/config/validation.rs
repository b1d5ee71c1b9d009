//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Enforce the indexed-route invariants
//! - Check each route declares exactly one payload source
//! - Report the offending route's position in the array
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MockConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system; filesystem-dependent
//!   checks (paths exist, collections are arrays) live in the route compiler

use crate::config::schema::{MatchType, MockConfig, RouteConfig};
use crate::routing::pattern;

/// A single validation failure, tagged with the route's array position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Which array the route lives in ("http" or "socket").
    pub section: &'static str,
    /// Index into that array.
    pub position: usize,
    /// What is wrong.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} route[{}]: {}",
            self.section, self.position, self.message
        )
    }
}

/// Validate the whole document, collecting every error.
pub fn validate_config(config: &MockConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (position, route) in config.http.iter().enumerate() {
        for message in check_http_route(route) {
            errors.push(ValidationError {
                section: "http",
                position,
                message,
            });
        }
    }

    for (position, route) in config.socket.iter().enumerate() {
        if route.event.is_empty() {
            errors.push(ValidationError {
                section: "socket",
                position,
                message: "event pattern must not be empty".into(),
            });
        }
        if route.handler.is_empty() {
            errors.push(ValidationError {
                section: "socket",
                position,
                message: "handler path must not be empty".into(),
            });
        }
        if route.match_type == MatchType::Params {
            errors.push(ValidationError {
                section: "socket",
                position,
                message: "socket routes support only exact or regex matching".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_route(route: &RouteConfig) -> Vec<String> {
    let mut messages = Vec::new();

    if route.path.is_empty() {
        messages.push("path must not be empty".into());
    }

    let sources = [
        route.static_path.is_some(),
        route.inline.is_some(),
        route.handler.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if sources != 1 {
        messages.push(format!(
            "exactly one of static, inline, handler must be set (found {sources})"
        ));
    }

    if route.index {
        if route.match_type != MatchType::Params {
            messages.push("indexed routes must use matchType==\"params\"".into());
        }
        if route.content_type() != Some("application/json") {
            messages.push("only contentType==\"application/json\" is indexable".into());
        }
        if route.handler.is_some() {
            messages.push("indexed routes take a static or inline collection, not a handler".into());
        }
        if route.match_type == MatchType::Params
            && pattern::param_names(&route.path).len() != 1
        {
            messages.push(format!(
                "indexed routes need exactly one named parameter in \"{}\"",
                route.path
            ));
        }
    } else if route.declared_methods().is_empty() {
        messages.push("route must declare at least one method".into());
    }

    if !route.assets.is_empty() && route.handler.is_none() {
        messages.push("assets are only meaningful on handler routes".into());
    }

    messages
}
