//! Session teardown from both sides.

use crate::common::{connect_body, envelope, next, ton_addr_item, CollectingFrame, Harness};
use tonnect::KitConfig;
use tonnect_test_utils::{sample_manifest, ManifestServer};

#[tokio::test]
async fn dapp_disconnects_are_acked_before_the_session_dies() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    let session = harness.connect(&server).await;

    harness.page_sends(envelope(31, "disconnect", vec![]));

    let event = next(&mut harness.events.disconnects).await;
    assert_eq!(event.session.id, session.id);
    assert!(harness.kit.sessions().await.unwrap().is_empty());

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "31");
    assert_eq!(posted[1]["result"], serde_json::json!({}));
}

#[tokio::test]
async fn wallet_disconnects_push_the_event_to_the_page() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    let session = harness.connect(&server).await;

    let ended = harness.kit.disconnect(&session.id).await.unwrap();
    assert_eq!(ended.id, session.id);
    assert!(harness.kit.sessions().await.unwrap().is_empty());

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["event"], "disconnect");
    assert_eq!(posted[1]["payload"], serde_json::json!({}));
    // event ids keep counting past the connect event
    assert!(posted[1]["id"].as_u64().unwrap() > posted[0]["id"].as_u64().unwrap());

    let event = next(&mut harness.events.disconnects).await;
    assert_eq!(event.session.id, session.id);
}

#[tokio::test]
async fn disconnect_all_ends_every_session() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    // a second page connects through its own frame
    let other = CollectingFrame::new("frame-2");
    harness.bus.register(other.clone());
    let body = connect_body(&server, vec![ton_addr_item()]);
    assert!(harness.bus.receive("frame-2", "f2-connect", body));
    let event = next(&mut harness.events.connects).await;
    harness.kit.approve_connect(event.id).await.unwrap();
    assert_eq!(harness.kit.sessions().await.unwrap().len(), 2);

    let ended = harness.kit.disconnect_all().await.unwrap();
    assert_eq!(ended.len(), 2);
    assert!(harness.kit.sessions().await.unwrap().is_empty());
}
