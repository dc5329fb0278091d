//! End-to-end tests for the distribution engine.
//!
//! Each test builds a hub over a temporary project root with artifacts
//! written to the default output directory, then drives it through
//! sessions exactly as a transport would.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use livequery_core::{
    DEFAULT_OUTPUT_DIR, DeliveryMode, Hub, HubError, ManifestIndex, ResultEntry, ServerMessage,
    Session, SharedMetadata, TransportHandle,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn write_artifact(root: &Path, id: &str, value: &Value) {
    let dir = root.join(DEFAULT_OUTPUT_DIR);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{id}.json")), value.to_string()).unwrap();
}

fn about_index() -> ManifestIndex {
    let mut index = ManifestIndex::new();
    index.insert_page("/about", "abc123");
    index.insert_page("/blog", "blog1");
    index.insert_page("/broken", "does-not-exist");
    index
}

async fn start(index: ManifestIndex, delivery: DeliveryMode) -> (TempDir, Hub, TransportHandle) {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "abc123", &json!({"data": {"title": "About"}}));
    write_artifact(dir.path(), "blog1", &json!({"data": {"posts": []}}));
    let hub = Hub::new(Arc::new(index), delivery);
    let transport = hub.initialize(dir.path(), DEFAULT_OUTPUT_DIR).await.unwrap();
    (dir, hub, transport)
}

async fn next(session: &mut Session) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), session.recv())
        .await
        .unwrap()
        .unwrap()
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn page(id: &str, result: Value) -> ServerMessage {
    ServerMessage::PageQueryResult(ResultEntry::new(id, result))
}

fn shared(id: &str, result: Value) -> ServerMessage {
    ServerMessage::StaticQueryResult(ResultEntry::new(id, result))
}

#[tokio::test]
async fn register_loads_page_artifact_once() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut client = transport.connect().await.unwrap();
    assert!(client.try_recv().is_none());
    assert!(hub.page_result("/about").await.is_none());

    client.register_path("/about").await;

    let expected = json!({"data": {"title": "About"}});
    assert_eq!(next(&mut client).await, page("/about", expected.clone()));
    settle().await;
    assert!(client.try_recv().is_none());

    let stored = hub.page_result("/about").await.unwrap();
    assert_eq!(stored, ResultEntry::new("/about", expected));
}

#[tokio::test]
async fn repeated_registration_reads_artifact_once() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut client = transport.connect().await.unwrap();

    client.register_path("/about").await;
    client.register_path("/about").await;

    let first = next(&mut client).await;
    let second = next(&mut client).await;
    assert_eq!(first, second);
    assert_eq!(hub.stats().await.artifact_reads, 1);
}

#[tokio::test]
async fn concurrent_registrations_share_one_read() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut a = transport.connect().await.unwrap();
    let mut b = transport.connect().await.unwrap();

    tokio::join!(a.register_path("/blog"), b.register_path("/blog"));

    let expected = page("/blog", json!({"data": {"posts": []}}));
    assert_eq!(next(&mut a).await, expected);
    assert_eq!(next(&mut b).await, expected);
    assert_eq!(hub.stats().await.artifact_reads, 1);

    // A later registration is served from the store.
    let mut c = transport.connect().await.unwrap();
    assert_eq!(next(&mut c).await, expected);
    c.register_path("/blog").await;
    assert_eq!(next(&mut c).await, expected);
    assert_eq!(hub.stats().await.artifact_reads, 1);
}

#[tokio::test]
async fn publish_page_result_overwrites_and_broadcasts() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut viewer = transport.connect().await.unwrap();
    let mut bystander = transport.connect().await.unwrap();

    viewer.register_path("/about").await;
    next(&mut viewer).await;

    let fresh = ResultEntry::new("/about", json!({"data": {"title": "About us"}}));
    let reached = hub.publish_page_result(fresh.clone()).await;

    assert_eq!(reached, 2);
    assert_eq!(hub.page_result("/about").await.unwrap(), fresh);
    assert_eq!(next(&mut viewer).await, ServerMessage::PageQueryResult(fresh.clone()));
    assert_eq!(next(&mut bystander).await, ServerMessage::PageQueryResult(fresh));
}

async fn wait_for_reads(hub: &Hub, reads: u64) {
    for _ in 0..200 {
        if hub.stats().await.artifact_reads >= reads {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(hub.stats().await.artifact_reads >= reads);
}

#[tokio::test]
async fn publish_during_in_flight_load_answers_waiter_once() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut client = transport.connect().await.unwrap();

    // The artifact read is spawned but has not run yet.
    client.register_path("/about").await;
    let fresh = ResultEntry::new("/about", json!({"data": {"title": "Fresh"}}));
    assert_eq!(hub.publish_page_result(fresh.clone()).await, 1);
    assert_eq!(hub.stats().await.pending_loads, 0);

    assert_eq!(next(&mut client).await, ServerMessage::PageQueryResult(fresh.clone()));
    wait_for_reads(&hub, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    settle().await;
    assert!(client.try_recv().is_none());
    assert_eq!(hub.page_result("/about").await.unwrap(), fresh);
}

#[tokio::test]
async fn room_publish_during_in_flight_load_answers_waiter_once() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Room).await;
    let mut client = transport.connect().await.unwrap();
    let mut bystander = transport.connect().await.unwrap();

    client.register_path("/about").await;
    let fresh = ResultEntry::new("/about", json!(3));
    assert_eq!(hub.publish_page_result(fresh.clone()).await, 1);

    assert_eq!(next(&mut client).await, ServerMessage::PageQueryResult(fresh));
    wait_for_reads(&hub, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    settle().await;
    assert!(client.try_recv().is_none());
    assert!(bystander.try_recv().is_none());
}

#[tokio::test]
async fn room_delivery_reaches_only_registered_connections() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Room).await;
    let mut viewer = transport.connect().await.unwrap();
    let mut bystander = transport.connect().await.unwrap();

    viewer.register_path("/about").await;
    next(&mut viewer).await;

    let fresh = ResultEntry::new("/about", json!(2));
    assert_eq!(hub.publish_page_result(fresh.clone()).await, 1);
    assert_eq!(next(&mut viewer).await, ServerMessage::PageQueryResult(fresh));
    settle().await;
    assert!(bystander.try_recv().is_none());

    // Shared results still go to everyone.
    assert_eq!(hub.publish_shared_result(ResultEntry::new("h", json!(1))).await, 2);
    assert_eq!(next(&mut bystander).await, shared("h", json!(1)));
}

#[tokio::test]
async fn shared_result_reaches_connected_clients_and_replays_once() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut first = transport.connect().await.unwrap();
    let mut second = transport.connect().await.unwrap();

    let result = json!({"data": {"site": {"title": "X"}}});
    let reached = hub
        .publish_shared_result(ResultEntry::new("hash1", result.clone()))
        .await;

    assert_eq!(reached, 2);
    assert_eq!(next(&mut first).await, shared("hash1", result.clone()));
    assert_eq!(next(&mut second).await, shared("hash1", result.clone()));

    let mut third = transport.connect().await.unwrap();
    assert_eq!(next(&mut third).await, shared("hash1", result));
    third.unregister_path("/unrelated").await;
    settle().await;
    assert!(third.try_recv().is_none());

    // The replay went to the new connection only.
    assert!(first.try_recv().is_none());
    assert!(second.try_recv().is_none());
}

#[tokio::test]
async fn replay_sends_shared_then_page_results() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    hub.publish_page_result(ResultEntry::new("/x", json!("page"))).await;
    hub.publish_shared_result(ResultEntry::new("h", json!("shared"))).await;

    let mut client = transport.connect().await.unwrap();
    assert_eq!(next(&mut client).await, shared("h", json!("shared")));
    assert_eq!(next(&mut client).await, page("/x", json!("page")));
    assert!(client.try_recv().is_none());
}

#[tokio::test]
async fn unregister_deactivates_path_only_when_room_empties() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let a = transport.connect().await.unwrap();
    let b = transport.connect().await.unwrap();

    a.register_path("/about").await;
    b.register_path("/about").await;
    assert_eq!(hub.active_paths().await, vec![String::from("/about")]);
    assert_eq!(hub.stats().await.rooms.get("/about"), Some(&2));

    a.unregister_path("/about").await;
    assert_eq!(hub.active_paths().await, vec![String::from("/about")]);
    assert_eq!(hub.stats().await.rooms.get("/about"), Some(&1));

    b.unregister_path("/about").await;
    assert!(hub.active_paths().await.is_empty());
    assert!(hub.stats().await.rooms.is_empty());
}

#[tokio::test]
async fn missing_metadata_answers_empty_result() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut client = transport.connect().await.unwrap();

    client.register_path("/nowhere").await;
    assert_eq!(next(&mut client).await, page("/nowhere", Value::Null));
    assert!(hub.page_result("/nowhere").await.is_none());

    // The connection keeps working.
    client.register_path("/about").await;
    assert_eq!(
        next(&mut client).await,
        page("/about", json!({"data": {"title": "About"}}))
    );
}

#[tokio::test]
async fn missing_artifact_answers_empty_result_without_caching() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let mut client = transport.connect().await.unwrap();

    client.register_path("/broken").await;
    assert_eq!(next(&mut client).await, page("/broken", Value::Null));
    assert!(hub.page_result("/broken").await.is_none());
    assert_eq!(hub.stats().await.pending_loads, 0);
}

#[tokio::test]
async fn disconnect_leaves_every_registered_room() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let client = transport.connect().await.unwrap();
    let other = transport.connect().await.unwrap();

    client.register_path("/about").await;
    client.register_path("/blog").await;
    other.register_path("/blog").await;

    client.disconnect().await;
    assert_eq!(hub.active_paths().await, vec![String::from("/blog")]);

    other.disconnect().await;
    assert!(hub.active_paths().await.is_empty());
    assert_eq!(hub.stats().await.connections, 0);
}

#[tokio::test]
async fn dropped_session_is_cleaned_up() {
    let (_dir, hub, transport) = start(about_index(), DeliveryMode::Broadcast).await;
    let client = transport.connect().await.unwrap();
    client.register_path("/about").await;
    drop(client);

    for _ in 0..100 {
        if hub.stats().await.connections == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = hub.stats().await;
    assert_eq!(stats.connections, 0);
    assert!(stats.active_paths.is_empty());
}

#[tokio::test]
async fn transport_handle_follows_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let hub = Hub::new(Arc::new(ManifestIndex::new()), DeliveryMode::default());
    assert!(hub.transport().is_none());

    // Published before initialization: stored, delivered to nobody.
    assert_eq!(hub.publish_shared_result(ResultEntry::new("h", json!(1))).await, 0);

    let transport = hub.initialize(dir.path(), DEFAULT_OUTPUT_DIR).await.unwrap();
    assert!(hub.transport().is_some());
    assert!(matches!(
        hub.initialize(dir.path(), DEFAULT_OUTPUT_DIR).await,
        Err(HubError::AlreadyInitialized)
    ));

    let mut client = transport.connect().await.unwrap();
    assert_eq!(next(&mut client).await, shared("h", json!(1)));

    hub.shutdown().await;
    assert!(hub.transport().is_none());
    assert!(client.recv().await.is_none());
    assert!(matches!(
        transport.connect().await,
        Err(HubError::NotInitialized)
    ));
    assert!(hub.shared_result("h").await.is_some());
}

#[tokio::test]
async fn initialize_merges_persisted_shared_results() {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "s1", &json!({"data": "from disk"}));
    write_artifact(dir.path(), "s2", &json!({"data": "stale"}));

    let mut index = ManifestIndex::new();
    for (hash, artifact) in [("h1", "s1"), ("h2", "s2"), ("h3", "never-ran")] {
        index.insert_shared(
            hash,
            SharedMetadata {
                artifact_id: artifact.to_owned(),
                source_path: Some(String::from("src/components/seo.js")),
            },
        );
    }

    let hub = Hub::new(Arc::new(index), DeliveryMode::Broadcast);
    hub.publish_shared_result(ResultEntry::new("h2", json!({"data": "fresh"})))
        .await;
    hub.initialize(dir.path(), DEFAULT_OUTPUT_DIR).await.unwrap();

    assert_eq!(
        hub.shared_result("h1").await.unwrap().result,
        json!({"data": "from disk"})
    );
    assert_eq!(
        hub.shared_result("h2").await.unwrap().result,
        json!({"data": "fresh"})
    );
    assert!(hub.shared_result("h3").await.is_none());

    let stats = hub.stats().await;
    assert_eq!(stats.shared_results, 2);
    // h2 was already present, so only h1 and h3 were read.
    assert_eq!(stats.artifact_reads, 2);
}

#[cfg(unix)]
#[tokio::test]
async fn initialize_reads_shared_artifacts_without_holding_the_hub() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join(DEFAULT_OUTPUT_DIR);
    std::fs::create_dir_all(&artifacts).unwrap();
    // A fifo keeps the read pending until the test writes to it.
    let fifo = artifacts.join("slow.json");
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .unwrap();
    assert!(status.success());

    let mut index = ManifestIndex::new();
    index.insert_shared(
        "h1",
        SharedMetadata {
            artifact_id: String::from("slow"),
            source_path: None,
        },
    );
    let hub = Hub::new(Arc::new(index), DeliveryMode::Broadcast);

    let init = tokio::spawn({
        let hub = hub.clone();
        let root = dir.path().to_path_buf();
        async move { hub.initialize(&root, DEFAULT_OUTPUT_DIR).await }
    });

    // Stats and publishing go through the hub lock while the read is pending.
    tokio::time::timeout(Duration::from_secs(5), wait_for_reads(&hub, 1))
        .await
        .unwrap();
    let fresh = ResultEntry::new("h1", json!({"data": "fresh"}));
    tokio::time::timeout(Duration::from_secs(5), hub.publish_shared_result(fresh.clone()))
        .await
        .unwrap();

    tokio::fs::write(&fifo, json!({"data": "from disk"}).to_string())
        .await
        .unwrap();
    init.await.unwrap().unwrap();

    assert!(hub.is_initialized());
    assert_eq!(hub.shared_result("h1").await.unwrap(), fresh);
}
