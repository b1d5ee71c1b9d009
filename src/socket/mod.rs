//! Socket event routing.
//!
//! # Responsibilities
//! - Match inbound messaging events against configured descriptors
//! - Invoke the matching script functions, in descriptor order
//!
//! # Design Decisions
//! - Matchers are tagged variants (exact / regex) built once at route-compile
//!   time, never re-parsed per event
//! - Every matching descriptor fires independently; a descriptor only fires
//!   if its script actually defines a function for the event
//! - Unmatched events are dropped without error; script faults are logged
//!   and never tear down the connection

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::script::{event_function_name, HandlerCache, LoadedScript, SocketPeer};

/// Compiled matcher for one inbound event descriptor.
#[derive(Debug, Clone)]
pub enum EventMatcher {
    Exact(String),
    Regex(Regex),
}

impl EventMatcher {
    pub fn matches(&self, event: &str) -> bool {
        match self {
            EventMatcher::Exact(expected) => event == expected,
            EventMatcher::Regex(re) => re.is_match(event),
        }
    }
}

/// One compiled inbound socket route.
#[derive(Debug)]
pub struct SocketRoute {
    pub matcher: EventMatcher,
    pub script: Arc<LoadedScript>,
}

/// Dispatch table for inbound messaging events.
#[derive(Debug, Default)]
pub struct SocketRouter {
    routes: Vec<SocketRoute>,
}

/// Wire envelope for messaging frames, both directions.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl SocketRouter {
    pub fn new(routes: Vec<SocketRoute>) -> Self {
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run one inbound event through every descriptor. Returns how many
    /// handler functions fired.
    pub fn dispatch(
        &self,
        cache: &HandlerCache,
        event: &str,
        data: &Value,
        peer: &SocketPeer,
    ) -> usize {
        let function = event_function_name(event);
        let mut fired = 0;
        for route in &self.routes {
            if !route.matcher.matches(event) {
                continue;
            }
            if !route.script.exports(&function) {
                tracing::trace!(
                    event = %event,
                    script = %route.script.path().display(),
                    "matched descriptor defines no function for event"
                );
                continue;
            }
            if let Err(err) = cache.invoke_socket(&route.script, &function, peer.clone(), data) {
                tracing::warn!(event = %event, error = %err, "socket handler failed");
            }
            fired += 1;
        }
        fired
    }
}

/// Parse one inbound text frame. Frames that are not envelopes are dropped.
pub fn parse_envelope(text: &str) -> Option<Envelope> {
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    #[test]
    fn exact_matcher_compares_whole_event() {
        let matcher = EventMatcher::Exact("chat:join".into());
        assert!(matcher.matches("chat:join"));
        assert!(!matcher.matches("chat:joined"));
    }

    #[test]
    fn regex_matcher_covers_event_families() {
        let matcher = EventMatcher::Regex(Regex::new("^chat:.*").unwrap());
        assert!(matcher.matches("chat:join"));
        assert!(matcher.matches("chat:leave"));
        assert!(!matcher.matches("lobby:join"));
    }

    #[test]
    fn envelope_parsing_tolerates_missing_data() {
        let envelope = parse_envelope(r#"{"event": "ping"}"#).unwrap();
        assert_eq!(envelope.event, "ping");
        assert_eq!(envelope.data, Value::Null);
        assert!(parse_envelope("not json").is_none());
    }

    fn router_with(source: &str, matchers: Vec<EventMatcher>) -> (HandlerCache, SocketRouter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("socket.rhai");
        std::fs::write(&path, source).unwrap();
        let mut cache = HandlerCache::new();
        let script = cache.load(&path).unwrap();
        let routes = matchers
            .into_iter()
            .map(|matcher| SocketRoute {
                matcher,
                script: script.clone(),
            })
            .collect();
        (cache, SocketRouter::new(routes), dir)
    }

    #[test]
    fn all_matching_descriptors_fire_in_order() {
        let (cache, router, _dir) = router_with(
            r#"
            fn chat_join(conn, data) { conn.emit("ack", 1); }
            "#,
            vec![
                EventMatcher::Regex(Regex::new("^chat:.*").unwrap()),
                EventMatcher::Exact("chat:join".into()),
                EventMatcher::Exact("other".into()),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peer = SocketPeer::new(tx);
        let fired = router.dispatch(&cache, "chat:join", &json!({}), &peer);
        assert_eq!(fired, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_without_a_defined_function_are_ignored() {
        let (cache, router, _dir) = router_with(
            r#"fn chat_join(conn, data) { }"#,
            vec![EventMatcher::Regex(Regex::new("^chat:.*").unwrap())],
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer = SocketPeer::new(tx);
        assert_eq!(router.dispatch(&cache, "chat:leave", &json!({}), &peer), 0);
    }
}
