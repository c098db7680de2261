//! Connect handshakes over the injected and relay transports.

use crate::common::{
    assert_signed, connect_body, connect_link, next, recipient, send_transaction_body,
    ton_addr_item, ton_proof_item, transfer, wait_for_inbox, Harness, FRAME_ID,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tonnect::{
    protocol::ErrorCode,
    sessions::SessionTransport,
    transports::{SessionCrypto, TransportKind},
    ton_proof_digest, KitConfig, KitError, ProofChallenge,
};
use tonnect_test_utils::{sample_manifest, ManifestServer, TestRelay};

#[tokio::test]
async fn injected_connects_establish_a_session() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());

    harness
        .page_sends(connect_body(&server, vec![ton_addr_item(), ton_proof_item("challenge-123")]));

    let event = next(&mut harness.events.connects).await;
    assert_eq!(event.transport, TransportKind::Injected);
    assert_eq!(event.manifest.name, "Example dApp");
    assert_eq!(event.items.len(), 2);

    let session = harness.kit.approve_connect(event.id).await.unwrap();
    assert_eq!(session.id.as_str(), FRAME_ID);
    assert_eq!(session.dapp.name, "Example dApp");
    // injected pages have no proven origin, so no domain is recorded
    assert!(session.domain.is_none());
    assert_eq!(harness.kit.sessions().await.unwrap().len(), 1);

    let posted = harness.frame.posted_json(1).await;
    let connect = &posted[0];
    assert_eq!(connect["event"], "connect");
    assert_eq!(connect["payload"]["device"]["appName"], "tonnect");

    let items = connect["payload"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "ton_addr");
    assert_eq!(items[0]["address"], harness.wallet.keys.address().to_raw());
    assert_eq!(items[0]["network"], "-239");
    assert_eq!(items[0]["publicKey"], hex::encode(harness.wallet.keys.public_key()));
    assert_eq!(items[0]["walletStateInit"], harness.wallet.keys.state_init().to_base64());

    // the proof must verify against the manifest's domain and our key
    let proof = &items[1]["proof"];
    assert_eq!(items[1]["name"], "ton_proof");
    assert_eq!(proof["payload"], "challenge-123");
    assert_eq!(proof["domain"]["value"], "app.example");
    assert_eq!(proof["domain"]["lengthBytes"], 11);
    let challenge = ProofChallenge {
        payload: "challenge-123".to_string(),
        domain: "app.example".to_string(),
        timestamp: proof["timestamp"].as_u64().unwrap(),
    };
    let signature = STANDARD.decode(proof["signature"].as_str().unwrap()).unwrap();
    let digest = ton_proof_digest(&harness.wallet.keys.address(), &challenge);
    assert_signed(&harness.wallet, &digest, &signature);
}

#[tokio::test]
async fn unknown_connect_items_are_left_out_of_the_reply() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());

    let exotic = serde_json::json!({ "name": "sol_addr" });
    harness.page_sends(connect_body(&server, vec![ton_addr_item(), exotic]));

    let event = next(&mut harness.events.connects).await;
    // the host still sees everything that was asked for
    assert_eq!(event.items.len(), 2);

    harness.kit.approve_connect(event.id).await.unwrap();
    let posted = harness.frame.posted_json(1).await;
    let items = posted[0]["payload"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "ton_addr");
}

#[tokio::test]
async fn rejected_connects_answer_with_a_decline() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());

    harness.page_sends(connect_body(&server, vec![ton_addr_item()]));
    let event = next(&mut harness.events.connects).await;
    harness.kit.reject_connect(event.id, None).await.unwrap();

    let posted = harness.frame.posted_json(1).await;
    assert_eq!(posted[0]["event"], "connect_error");
    assert_eq!(posted[0]["payload"]["code"], 300);
    assert!(harness.kit.sessions().await.unwrap().is_empty());

    // the request is spent
    let err = harness.kit.approve_connect(event.id).await.unwrap_err();
    assert!(matches!(err, KitError::UnknownRequest(_)));
}

#[tokio::test]
async fn unfetchable_manifests_fail_the_connect() {
    let server = ManifestServer::with_response(reqwest::StatusCode::NOT_FOUND, "gone").await;
    let mut harness = Harness::spawn(KitConfig::new());

    harness.page_sends(connect_body(&server, vec![ton_addr_item()]));

    let error = next(&mut harness.events.errors).await;
    assert_eq!(error.error.code, ErrorCode::ManifestNotFound);

    let posted = harness.frame.posted_json(1).await;
    assert_eq!(posted[0]["event"], "connect_error");
    assert_eq!(posted[0]["payload"]["code"], 2);
    assert!(harness.events.connects.try_recv().is_err());
}

#[tokio::test]
async fn relay_links_connect_and_carry_requests() {
    let bridge = TestRelay::spawn().await;
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new().with_bridge_url(bridge.url()));

    let dapp = SessionCrypto::generate();
    harness.kit.handle_connection_url(&connect_link(&server, &dapp.client_id())).await.unwrap();

    let event = next(&mut harness.events.connects).await;
    assert_eq!(event.transport, TransportKind::Relay);
    let session = harness.kit.approve_connect(event.id).await.unwrap();
    assert_eq!(session.id.as_str(), dapp.client_id());
    assert_eq!(session.domain.as_deref(), Some("app.example"));
    let SessionTransport::Relay { wallet_keys, .. } = &session.transport else {
        panic!("expected a relay binding, got {:?}", session.transport);
    };

    // the connect event reaches the dApp sealed for its key
    let inbox = wait_for_inbox(&bridge, &dapp.client_id(), 1).await;
    let (from, sealed) = &inbox[0];
    assert_eq!(from, &wallet_keys.public);
    let plaintext = dapp.open(from, &STANDARD.decode(sealed).unwrap()).unwrap();
    let connect: serde_json::Value = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(connect["event"], "connect");
    assert_eq!(connect["payload"]["items"][0]["name"], "ton_addr");

    // a request sealed by the dApp comes back answered over the same pair
    let body = send_transaction_body(7, &transfer(recipient(), 250_000_000));
    let sealed = dapp.seal(&wallet_keys.public, body.as_bytes()).unwrap();
    bridge.push(&wallet_keys.public, &dapp.client_id(), STANDARD.encode(sealed));

    let presented = next(&mut harness.events.transactions).await;
    assert_eq!(presented.session.as_ref().unwrap().id, session.id);
    harness.kit.approve_transaction(presented.id).await.unwrap();

    let inbox = wait_for_inbox(&bridge, &dapp.client_id(), 2).await;
    let (from, sealed) = &inbox[1];
    let plaintext = dapp.open(from, &STANDARD.decode(sealed).unwrap()).unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(reply["id"], "7");
    assert!(reply["result"].is_string());
}

#[tokio::test]
async fn reconnecting_replaces_the_older_session_for_a_domain() {
    let bridge = TestRelay::spawn().await;
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new().with_bridge_url(bridge.url()));

    let first = SessionCrypto::generate();
    harness.kit.handle_connection_url(&connect_link(&server, &first.client_id())).await.unwrap();
    let event = next(&mut harness.events.connects).await;
    harness.kit.approve_connect(event.id).await.unwrap();

    let second = SessionCrypto::generate();
    harness.kit.handle_connection_url(&connect_link(&server, &second.client_id())).await.unwrap();
    let event = next(&mut harness.events.connects).await;
    harness.kit.approve_connect(event.id).await.unwrap();

    let sessions = harness.kit.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id.as_str(), second.client_id());
}
