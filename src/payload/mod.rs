//! Payload resolution.
//!
//! # Responsibilities
//! - Resolve a route's static or inline source into one frozen body
//! - Decode `data:<mime>;base64,...` inline payloads
//! - Parse json/yaml sources into structured values (YAML is treated as a
//!   superset of JSON)
//! - Classify content types as textual or binary
//!
//! # Design Decisions
//! - Resolution happens once, at route-compile time; requests only ever see
//!   the frozen result
//! - Structured payloads render as pretty JSON text, so a static file and an
//!   inline value with equal content resolve byte-identically

use base64::Engine;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error resolving a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("payload is not valid UTF-8 text")]
    NotText(#[from] std::string::FromUtf8Error),
    #[error("invalid base64 in inline data URI: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("inline data URI body does not parse as {content_type}: {source}")]
    InlineParse {
        content_type: String,
        source: serde_yaml::Error,
    },
    #[error("only arrays are indexable")]
    NotAnArray,
}

/// The resolved body of a static/inline route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    Text(String),
    Binary(Vec<u8>),
}

/// A frozen payload plus the content type it should be served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPayload {
    pub content_type: Option<String>,
    pub body: PayloadBody,
}

/// Shared textual classifier, reused by route integrity checks: true for
/// `text/*` and the handful of textual `application/*` types.
pub fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text")
        || matches!(
            content_type,
            "application/xml"
                | "application/x-sh"
                | "application/x-www-form-urlencoded"
                | "application/javascript"
        )
}

fn is_structured(content_type: &str) -> bool {
    content_type.contains("json") || content_type.contains("yaml")
}

/// Resolve a static file into a frozen payload.
pub fn resolve_static(
    path: &Path,
    content_type: Option<&str>,
) -> Result<ResolvedPayload, PayloadError> {
    let raw = std::fs::read(path).map_err(|source| PayloadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let body = match content_type {
        Some(ct) if is_structured(ct) => {
            let text = String::from_utf8(raw)?;
            let value: serde_json::Value =
                serde_yaml::from_str(&text).map_err(|source| PayloadError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            PayloadBody::Text(pretty(&value))
        }
        Some(ct) if is_textual(ct) => PayloadBody::Text(String::from_utf8(raw)?),
        _ => PayloadBody::Binary(raw),
    };

    Ok(ResolvedPayload {
        content_type: content_type.map(str::to_string),
        body,
    })
}

/// Resolve an inline configuration value into a frozen payload.
pub fn resolve_inline(
    value: &serde_json::Value,
    content_type: Option<&str>,
) -> Result<ResolvedPayload, PayloadError> {
    if let Some(text) = value.as_str() {
        if let Some((mime, encoded)) = split_data_uri(text) {
            return resolve_data_uri(mime, encoded, content_type);
        }
    }

    let body = match content_type {
        Some(ct) if is_structured(ct) => PayloadBody::Text(
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        ),
        _ => match value {
            serde_json::Value::String(text) => PayloadBody::Text(text.clone()),
            other => PayloadBody::Text(pretty(other)),
        },
    };

    Ok(ResolvedPayload {
        content_type: content_type.map(str::to_string),
        body,
    })
}

/// Load the backing collection of an indexed route from a static file.
pub fn load_collection(path: &Path) -> Result<Vec<serde_json::Value>, PayloadError> {
    let text = std::fs::read_to_string(path).map_err(|source| PayloadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_yaml::from_str(&text).map_err(|source| PayloadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    collection_items(value)
}

/// Interpret an inline value as an indexed route's backing collection.
pub fn collection_items(
    value: serde_json::Value,
) -> Result<Vec<serde_json::Value>, PayloadError> {
    match value {
        serde_json::Value::Array(items) => Ok(items),
        _ => Err(PayloadError::NotAnArray),
    }
}

fn resolve_data_uri(
    mime: &str,
    encoded: &str,
    declared: Option<&str>,
) -> Result<ResolvedPayload, PayloadError> {
    let raw = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    // The declared content type wins; the URI's mime fills the gap.
    let content_type = declared.unwrap_or(mime).to_string();

    let body = if is_textual(mime) {
        let text = String::from_utf8(raw)?;
        if is_structured(&content_type) {
            let value: serde_json::Value =
                serde_yaml::from_str(&text).map_err(|source| PayloadError::InlineParse {
                    content_type: content_type.clone(),
                    source,
                })?;
            PayloadBody::Text(pretty(&value))
        } else {
            PayloadBody::Text(text)
        }
    } else if is_structured(&content_type) {
        let text = String::from_utf8(raw)?;
        let value: serde_json::Value =
            serde_yaml::from_str(&text).map_err(|source| PayloadError::InlineParse {
                content_type: content_type.clone(),
                source,
            })?;
        PayloadBody::Text(pretty(&value))
    } else {
        PayloadBody::Binary(raw)
    };

    Ok(ResolvedPayload {
        content_type: Some(content_type),
        body,
    })
}

fn split_data_uri(text: &str) -> Option<(&str, &str)> {
    static DATA_URI: OnceLock<Regex> = OnceLock::new();
    let re = DATA_URI.get_or_init(|| Regex::new(r"^data:(.*?);base64,(.*)$").unwrap());
    let captures = re.captures(text)?;
    Some((
        captures.get(1).unwrap().as_str(),
        captures.get(2).unwrap().as_str(),
    ))
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
