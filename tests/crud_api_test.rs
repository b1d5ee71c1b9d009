//! CRUD semantics of indexed routes, end to end.

use serde_json::{json, Value};

mod common;
use common::{start_server, url, Fixture};

fn elements_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.write("elements.yaml", "- id: 1\n  name: a\n- id: 2\n  name: b\n");
    fixture
}

fn elements_config() -> serde_json::Value {
    json!({"http": [{
        "path": "/elements/:id",
        "matchType": "params",
        "static": "elements.yaml",
        "contentType": "application/json",
        "index": true
    }]})
}

#[tokio::test]
async fn list_and_detail_reads() {
    let fixture = elements_fixture();
    let config = fixture.config(elements_config());
    let (instance, addr) = start_server(&config).await;
    let client = reqwest::Client::new();

    let response = client.get(url(addr, "/elements")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let list: Value = response.json().await.unwrap();
    assert_eq!(list, json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]));

    let item: Value = client
        .get(url(addr, "/elements/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item, json!({"id": 1, "name": "a"}));

    let missing = client.get(url(addr, "/elements/9")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    instance.shutdown().await;
}

#[tokio::test]
async fn create_then_read_then_conflict() {
    let fixture = elements_fixture();
    let config = fixture.config(elements_config());
    let (instance, addr) = start_server(&config).await;
    let client = reqwest::Client::new();

    let created = client
        .post(url(addr, "/elements"))
        .json(&json!({"id": 3, "name": "c"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);

    let item: Value = client
        .get(url(addr, "/elements/3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item, json!({"id": 3, "name": "c"}));

    let duplicate = client
        .post(url(addr, "/elements"))
        .json(&json!({"id": 3, "name": "again"}))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status().as_u16(), 409);

    // The conflicting create left the store unchanged.
    let item: Value = client
        .get(url(addr, "/elements/3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["name"], "c");
    let list: Value = client
        .get(url(addr, "/elements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 3);

    instance.shutdown().await;
}

#[tokio::test]
async fn merge_updates_only_named_fields_in_place() {
    let fixture = elements_fixture();
    let config = fixture.config(elements_config());
    let (instance, addr) = start_server(&config).await;
    let client = reqwest::Client::new();

    let patched = client
        .patch(url(addr, "/elements/1"))
        .json(&json!({"name": "A"}))
        .send()
        .await
        .unwrap();
    assert_eq!(patched.status().as_u16(), 204);

    let list: Value = client
        .get(url(addr, "/elements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Changed in place: same position, id untouched.
    assert_eq!(list[0], json!({"id": 1, "name": "A"}));
    assert_eq!(list[1], json!({"id": 2, "name": "b"}));

    instance.shutdown().await;
}

#[tokio::test]
async fn replace_overwrites_the_whole_item() {
    let fixture = elements_fixture();
    let config = fixture.config(elements_config());
    let (instance, addr) = start_server(&config).await;
    let client = reqwest::Client::new();

    let replaced = client
        .put(url(addr, "/elements/2"))
        .json(&json!({"id": 2, "kind": "noble gas"}))
        .send()
        .await
        .unwrap();
    assert_eq!(replaced.status().as_u16(), 204);

    let item: Value = client
        .get(url(addr, "/elements/2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item, json!({"id": 2, "kind": "noble gas"}));

    let absent = client
        .put(url(addr, "/elements/9"))
        .json(&json!({"id": 9}))
        .send()
        .await
        .unwrap();
    assert_eq!(absent.status().as_u16(), 404);

    instance.shutdown().await;
}

#[tokio::test]
async fn delete_removes_and_keeps_later_offsets_valid() {
    let fixture = Fixture::new();
    fixture.write(
        "elements.yaml",
        "- id: 1\n  name: a\n- id: 2\n  name: b\n- id: 3\n  name: c\n",
    );
    let config = fixture.config(elements_config());
    let (instance, addr) = start_server(&config).await;
    let client = reqwest::Client::new();

    let deleted = client.delete(url(addr, "/elements/2")).send().await.unwrap();
    assert_eq!(deleted.status().as_u16(), 204);
    assert_eq!(
        client
            .get(url(addr, "/elements/2"))
            .send()
            .await
            .unwrap()
            .status()
            .as_u16(),
        404
    );

    // Entries past the removed element must still address the right item.
    let patched = client
        .patch(url(addr, "/elements/3"))
        .json(&json!({"name": "C"}))
        .send()
        .await
        .unwrap();
    assert_eq!(patched.status().as_u16(), 204);

    let list: Value = client
        .get(url(addr, "/elements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list, json!([{"id": 1, "name": "a"}, {"id": 3, "name": "C"}]));

    instance.shutdown().await;
}

#[tokio::test]
async fn indexed_inline_collection_works_too() {
    let fixture = Fixture::new();
    let config = fixture.config(json!({"http": [{
        "path": "/users/:login",
        "matchType": "params",
        "inline": [{"login": "ada", "admin": true}],
        "contentType": "application/json",
        "index": true
    }]}));
    let (instance, addr) = start_server(&config).await;
    let client = reqwest::Client::new();

    let item: Value = client
        .get(url(addr, "/users/ada"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item, json!({"login": "ada", "admin": true}));

    instance.shutdown().await;
}
