//! WebSocket event routing, end to end.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

mod common;
use common::{start_server, Fixture};

#[tokio::test]
async fn regex_descriptor_routes_event_family_to_handler() {
    let fixture = Fixture::new();
    fixture.write(
        "chat.rhai",
        r#"
        fn chat_join(conn, data) {
            conn.emit("chat:joined", #{ room: data.room });
        }
        fn chat_leave(conn, data) {
            conn.emit("chat:left", #{ room: data.room });
        }
        "#,
    );
    let config = fixture.config(json!({"socket": [
        {"event": "^chat:.*", "matchType": "regex", "direction": "inbound", "handler": "chat.rhai"}
    ]}));
    let (instance, addr) = start_server(&config).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    ws.send(Message::text(
        json!({"event": "chat:join", "data": {"room": "lobby"}}).to_string(),
    ))
    .await
    .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(reply, json!({"event": "chat:joined", "data": {"room": "lobby"}}));

    ws.send(Message::text(
        json!({"event": "chat:leave", "data": {"room": "lobby"}}).to_string(),
    ))
    .await
    .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(reply["event"], "chat:left");

    // An event outside the family is dropped without error.
    ws.send(Message::text(
        json!({"event": "lobby:join", "data": {}}).to_string(),
    ))
    .await
    .unwrap();
    let silence = tokio::time::timeout(Duration::from_millis(500), ws.next()).await;
    assert!(silence.is_err());

    instance.shutdown().await;
}

#[tokio::test]
async fn exact_descriptor_fires_only_on_its_event() {
    let fixture = Fixture::new();
    fixture.write(
        "ping.rhai",
        r#"fn ping(conn, data) { conn.emit("pong", data); }"#,
    );
    let config = fixture.config(json!({"socket": [
        {"event": "ping", "matchType": "exact", "direction": "inbound", "handler": "ping.rhai"}
    ]}));
    let (instance, addr) = start_server(&config).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    ws.send(Message::text(
        json!({"event": "ping", "data": 7}).to_string(),
    ))
    .await
    .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(reply, json!({"event": "pong", "data": 7}));

    ws.send(Message::text(
        json!({"event": "pinging", "data": 7}).to_string(),
    ))
    .await
    .unwrap();
    let silence = tokio::time::timeout(Duration::from_millis(500), ws.next()).await;
    assert!(silence.is_err());

    instance.shutdown().await;
}
