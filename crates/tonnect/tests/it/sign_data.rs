//! Arbitrary-data signing: the three payload kinds and the intake checks.

use crate::common::{assert_signed, next, sign_data_body, wallet_address, Harness};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tonnect::{protocol::SignDataPayload, sign_data_digest, KitConfig, KitError, SignDataMeta};
use tonnect_test_utils::{sample_manifest, ManifestServer};

#[tokio::test]
async fn text_payloads_sign_and_answer() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    harness.page_sends(sign_data_body(21, &serde_json::json!({ "type": "text", "text": "hello" })));

    let event = next(&mut harness.events.sign_data).await;
    assert!(matches!(&event.payload, SignDataPayload::Text { text } if text == "hello"));

    let result = harness.kit.approve_sign_data(event.id).await.unwrap();
    // injected sessions have no proven origin; the domain falls back to the
    // manifest's dApp url
    assert_eq!(result.domain, "app.example");
    assert_eq!(result.address, wallet_address());

    let meta = SignDataMeta { domain: result.domain.clone(), timestamp: result.timestamp };
    let digest = sign_data_digest(&wallet_address(), &event.payload, &meta).unwrap();
    let signature = STANDARD.decode(&result.signature).unwrap();
    assert_signed(&harness.wallet, &digest, &signature);

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "21");
    assert_eq!(posted[1]["result"]["signature"], result.signature);
    assert_eq!(posted[1]["result"]["payload"]["text"], "hello");
    assert_eq!(posted[1]["result"]["timestamp"], result.timestamp);
}

#[tokio::test]
async fn binary_payloads_bind_address_and_domain() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    let payload = serde_json::json!({ "type": "binary", "bytes": "AQID" });
    harness.page_sends(sign_data_body(22, &payload));

    let event = next(&mut harness.events.sign_data).await;
    let result = harness.kit.approve_sign_data(event.id).await.unwrap();

    let meta = SignDataMeta { domain: result.domain.clone(), timestamp: result.timestamp };
    let digest = sign_data_digest(&wallet_address(), &event.payload, &meta).unwrap();
    let signature = STANDARD.decode(&result.signature).unwrap();
    assert_signed(&harness.wallet, &digest, &signature);
}

#[tokio::test]
async fn cell_payloads_sign_the_representation_hash() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    let payload = serde_json::json!({
        "type": "cell",
        "schema": "comment#0 text:Snakedata = Payload;",
        "cell": "te6ccgEBAQEAAgAAAA==",
    });
    harness.page_sends(sign_data_body(23, &payload));

    let event = next(&mut harness.events.sign_data).await;
    let result = harness.kit.approve_sign_data(event.id).await.unwrap();

    // for cells the digest is the representation hash, domain or not
    let SignDataPayload::Cell { cell, .. } = &event.payload else {
        panic!("expected a cell payload");
    };
    let digest = cell.parse_root().unwrap().repr_hash();
    let signature = STANDARD.decode(&result.signature).unwrap();
    assert_signed(&harness.wallet, &digest, &signature);
}

#[tokio::test]
async fn undecodable_binary_payloads_are_refused_at_intake() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    let payload = serde_json::json!({ "type": "binary", "bytes": "%%%" });
    harness.page_sends(sign_data_body(24, &payload));

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "24");
    assert_eq!(posted[1]["error"]["code"], 1);
    assert!(harness.events.sign_data.try_recv().is_err());
}

#[tokio::test]
async fn resolving_with_the_wrong_call_leaves_the_request_pending() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    harness.page_sends(sign_data_body(25, &serde_json::json!({ "type": "text", "text": "hi" })));
    let event = next(&mut harness.events.sign_data).await;

    let err = harness.kit.approve_transaction(event.id).await.unwrap_err();
    assert!(matches!(err, KitError::WrongKind { .. }));

    // the request survived the bad call and still resolves
    assert_eq!(harness.kit.pending_count(), 1);
    harness.kit.approve_sign_data(event.id).await.unwrap();
    assert_eq!(harness.kit.pending_count(), 0);
}
