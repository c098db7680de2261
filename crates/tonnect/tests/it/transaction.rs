//! Transaction requests: previews, resolution and the error answers.

use crate::common::{
    envelope, next, recipient, send_transaction_body, transfer, wallet_address, Harness,
};
use tonnect::{
    primitives::{Coins, Network},
    validator::{FlowMismatch, UnverifiedReason, Verdict},
    KitConfig, KitError, MismatchPolicy,
};
use tonnect_test_utils::{
    sample_manifest, single_transfer_trace, FailingEmulation, FixedEmulation, ManifestServer,
};

#[tokio::test]
async fn matching_emulation_yields_a_valid_verdict() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let trace = single_transfer_trace(wallet_address(), recipient(), 250_000_000, 3_000_000);
    let mut harness = Harness::spawn_with_emulation(KitConfig::new(), FixedEmulation::new(trace));
    let session = harness.connect(&server).await;

    harness.page_sends(send_transaction_body(1, &transfer(recipient(), 250_000_000)));

    let event = next(&mut harness.events.transactions).await;
    assert!(event.preview.verdict.is_valid());
    assert_eq!(event.preview.expected.ton_out(), Coins::from_nano(250_000_000));
    let emulated = event.preview.emulated.as_ref().unwrap();
    assert_eq!(emulated.ton_out(), Coins::from_nano(250_000_000));
    assert!(event.preview.trace.is_some());
    assert_eq!(event.session.as_ref().unwrap().id, session.id);

    let boc = harness.kit.approve_transaction(event.id).await.unwrap();
    assert_eq!(harness.kit.pending_count(), 0);

    // the reply carries the bag the adapter signed
    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "1");
    assert_eq!(posted[1]["result"], boc.to_base64());
    let root = boc.parse_root().unwrap();
    assert_eq!(root.bit_len(), 512);
    assert_eq!(root.data(), harness.wallet.expected_signature(&event.request));
}

#[tokio::test]
async fn diverging_emulation_is_flagged_to_the_host() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let trace = single_transfer_trace(wallet_address(), recipient(), 2_000_000_000, 3_000_000);
    let mut harness = Harness::spawn_with_emulation(KitConfig::new(), FixedEmulation::new(trace));
    harness.connect(&server).await;

    harness.page_sends(send_transaction_body(2, &transfer(recipient(), 1_000_000_000)));

    let event = next(&mut harness.events.transactions).await;
    let Verdict::Mismatch(mismatches) = &event.preview.verdict else {
        panic!("expected a mismatch, got {:?}", event.preview.verdict);
    };
    assert!(mismatches.iter().any(|m| matches!(
        m,
        FlowMismatch::TonOutput { expected, emulated }
            if *expected == Coins::from_nano(1_000_000_000)
                && *emulated == Coins::from_nano(2_000_000_000)
    )));

    // under the default policy the decision stays with the host
    harness.kit.reject_transaction(event.id, None).await.unwrap();
    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "2");
    assert_eq!(posted[1]["error"]["code"], 300);
}

#[tokio::test]
async fn auto_reject_declines_mismatches_unprompted() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let trace = single_transfer_trace(wallet_address(), recipient(), 2_000_000_000, 3_000_000);
    let mut harness = Harness::spawn_with_emulation(
        KitConfig::new().with_mismatch_policy(MismatchPolicy::AutoReject),
        FixedEmulation::new(trace),
    );
    harness.connect(&server).await;

    harness.page_sends(send_transaction_body(3, &transfer(recipient(), 1_000_000_000)));

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "3");
    assert_eq!(posted[1]["error"]["code"], 300);
    // the request was never presented, and nothing is left pending
    assert!(harness.events.transactions.try_recv().is_err());
    assert_eq!(harness.kit.pending_count(), 0);
    let error = next(&mut harness.events.errors).await;
    assert!(error.error.message.contains("diverges"));
}

#[tokio::test]
async fn undeployed_accounts_preview_unverified() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness =
        Harness::spawn_with_emulation(KitConfig::new(), FailingEmulation::account_not_found());
    harness.connect(&server).await;

    harness.page_sends(send_transaction_body(4, &transfer(recipient(), 10)));

    let event = next(&mut harness.events.transactions).await;
    assert_eq!(event.preview.verdict, Verdict::Unverified(UnverifiedReason::AccountNotFound));
    assert!(event.preview.emulated.is_none());
    // still approvable; unverified is a presentation state, not a block
    harness.kit.approve_transaction(event.id).await.unwrap();
}

#[tokio::test]
async fn previews_without_an_emulation_client_are_unverified() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    harness.page_sends(send_transaction_body(5, &transfer(recipient(), 10)));

    let event = next(&mut harness.events.transactions).await;
    assert!(matches!(
        event.preview.verdict,
        Verdict::Unverified(UnverifiedReason::EmulationFailed(_))
    ));
    assert_eq!(event.preview.expected.ton_out(), Coins::from_nano(10));
}

#[tokio::test]
async fn expired_requests_cannot_be_approved() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    let mut request = transfer(recipient(), 10);
    request.valid_until = Some(1_600_000_000);
    harness.page_sends(send_transaction_body(6, &request));

    let event = next(&mut harness.events.transactions).await;
    let err = harness.kit.approve_transaction(event.id).await.unwrap_err();
    assert!(matches!(err, KitError::Expired));

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "6");
    assert_eq!(posted[1]["error"]["code"], 1);

    // the request is spent either way
    let err = harness.kit.approve_transaction(event.id).await.unwrap_err();
    assert!(matches!(err, KitError::UnknownRequest(_)));
}

#[tokio::test]
async fn network_and_sender_mismatches_are_answered_without_presenting() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    let mut request = transfer(recipient(), 10);
    request.network = Some(Network::Testnet);
    harness.page_sends(send_transaction_body(7, &request));
    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "7");
    assert_eq!(posted[1]["error"]["code"], 1);

    let mut request = transfer(recipient(), 10);
    request.from = Some(recipient());
    harness.page_sends(send_transaction_body(8, &request));
    let posted = harness.frame.posted_json(3).await;
    assert_eq!(posted[2]["id"], "8");
    assert_eq!(posted[2]["error"]["code"], 1);

    assert!(harness.events.transactions.try_recv().is_err());
}

#[tokio::test]
async fn requests_without_a_session_get_the_unknown_app_code() {
    let harness = Harness::spawn(KitConfig::new());

    harness.page_sends(send_transaction_body(1, &transfer(recipient(), 10)));

    let posted = harness.frame.posted_json(1).await;
    assert_eq!(posted[0]["id"], "1");
    assert_eq!(posted[0]["error"]["code"], 100);
}

#[tokio::test]
async fn unknown_methods_are_answered_not_supported() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    harness.page_sends(envelope(9, "mintRainbows", vec![]));

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "9");
    assert_eq!(posted[1]["error"]["code"], 400);
}

#[tokio::test]
async fn undecodable_params_are_answered_bad_request() {
    let server = ManifestServer::serve(&sample_manifest()).await;
    let mut harness = Harness::spawn(KitConfig::new());
    harness.connect(&server).await;

    harness.page_sends(envelope(11, "sendTransaction", vec!["not json".to_string()]));

    let posted = harness.frame.posted_json(2).await;
    assert_eq!(posted[1]["id"], "11");
    assert_eq!(posted[1]["error"]["code"], 1);
}

#[tokio::test]
async fn transfer_links_present_without_a_session() {
    let mut harness = Harness::spawn(KitConfig::new());

    let link = format!("ton://transfer/{}?amount=500000000&text=thanks", recipient().to_raw());
    harness.kit.handle_connection_url(&link).await.unwrap();

    let event = next(&mut harness.events.transactions).await;
    assert!(event.session.is_none());
    assert_eq!(event.request.messages[0].amount, Coins::from_nano(500_000_000));
    assert_eq!(event.preview.expected.ton_out(), Coins::from_nano(500_000_000));

    // approval signs; there is no dApp to answer
    harness.kit.approve_transaction(event.id).await.unwrap();
    assert_eq!(harness.kit.pending_count(), 0);
    assert!(harness.frame.posted().is_empty());
}
