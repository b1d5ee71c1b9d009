//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile a route's path into a matcher, once, at route-compile time
//! - Match request paths and extract named parameters
//! - Derive the list path for an indexed route
//!
//! # Design Decisions
//! - Tagged variants (exact / prefix / params / regex), never re-parsed
//!   per request
//! - Exact and params matching is trailing-slash-insensitive
//! - Regex matches run against the raw path and capture nothing

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::schema::MatchType;

/// Named parameters extracted from a matched path.
pub type PathParams = HashMap<String, String>;

/// Error compiling a path pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex \"{pattern}\": {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
}

/// One segment of a `params` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path matcher.
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// Literal path, trailing-slash-insensitive.
    Exact(String),
    /// Path prefix, used by directory mounts.
    Prefix(String),
    /// Segment list with `:name` parameters.
    Params(Vec<Segment>),
    /// Compiled regular expression over the raw path.
    Regex(Regex),
}

impl PathPattern {
    /// Compile `path` according to the route's match type.
    pub fn compile(path: &str, match_type: MatchType) -> Result<Self, PatternError> {
        match match_type {
            MatchType::Exact => Ok(PathPattern::Exact(normalize(path).to_string())),
            MatchType::Params => Ok(PathPattern::Params(parse_segments(path))),
            MatchType::Regex => Regex::new(path)
                .map(PathPattern::Regex)
                .map_err(|source| PatternError::Regex {
                    pattern: path.to_string(),
                    source,
                }),
        }
    }

    /// Compile a prefix matcher for a directory mount.
    pub fn prefix(path: &str) -> Self {
        PathPattern::Prefix(normalize(path).to_string())
    }

    /// Match a request path. `Some` carries the extracted parameters
    /// (empty for non-params patterns).
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        match self {
            PathPattern::Exact(expected) => {
                (normalize(path) == expected).then(PathParams::new)
            }
            PathPattern::Prefix(prefix) => {
                path.starts_with(prefix.as_str()).then(PathParams::new)
            }
            PathPattern::Params(segments) => match_segments(segments, path),
            PathPattern::Regex(re) => re.is_match(path).then(PathParams::new),
        }
    }
}

/// Named parameters declared in a `params` path, in order of appearance.
pub fn param_names(path: &str) -> Vec<String> {
    parse_segments(path)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Param(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// The list path of an indexed route: the parameterized path with the
/// `:param` segment removed (`/elements/:id` → `/elements`).
pub fn list_path(path: &str, param: &str) -> String {
    let kept: Vec<&str> = normalize(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| segment.strip_prefix(':') != Some(param))
        .collect();
    if kept.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", kept.join("/"))
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn parse_segments(path: &str) -> Vec<Segment> {
    normalize(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(segment.to_string()),
        })
        .collect()
}

fn match_segments(segments: &[Segment], path: &str) -> Option<PathParams> {
    let parts: Vec<&str> = normalize(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = PathParams::new();
    for (segment, part) in segments.iter().zip(parts) {
        match segment {
            Segment::Literal(literal) if literal == part => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), part.to_string());
            }
        }
    }
    Some(params)
}
