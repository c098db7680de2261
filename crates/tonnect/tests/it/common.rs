//! Shared fixtures: a signing wallet adapter, a collecting frame and a kit
//! harness wired for injected traffic.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tonnect::{
    emulation::EmulationClient,
    primitives::{Boc, CellBuilder, Coins, Network, TonAddress},
    protocol::{SignDataPayload, TransactionMessage, TransactionRequest},
    sessions::{MemorySessionStore, Session},
    sign_data_digest, ton_proof_digest,
    transports::{Frame, FrameBus, TransportError},
    ConnectRequestEvent, DisconnectEvent, KitConfig, ProofChallenge, RequestErrorEvent,
    SignDataMeta, SignDataRequestEvent, SignOptions, TransactionRequestEvent, WalletAdapter,
    WalletKit,
};
use tonnect_test_utils::{init_tracing, ManifestServer, TestRelay, TestWallet};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The frame id the harness registers its page under.
pub const FRAME_ID: &str = "frame-1";

/// A wallet adapter signing with a deterministic [`TestWallet`] key.
pub struct LocalWallet {
    pub keys: TestWallet,
}

impl LocalWallet {
    pub fn deterministic() -> Self {
        Self { keys: TestWallet::deterministic() }
    }

    /// The signature `signed_send_transaction` embeds for `request`.
    pub fn expected_signature(&self, request: &TransactionRequest) -> [u8; 64] {
        self.keys.sign(&serde_json::to_vec(request).unwrap())
    }
}

#[async_trait]
impl WalletAdapter for LocalWallet {
    fn public_key(&self) -> [u8; 32] {
        self.keys.public_key()
    }

    fn network(&self) -> Network {
        Network::Mainnet
    }

    fn address(&self) -> TonAddress {
        self.keys.address()
    }

    async fn state_init(&self) -> eyre::Result<Boc> {
        Ok(self.keys.state_init())
    }

    /// Builds a stand-in external message: one cell holding the signature
    /// over the JSON encoding of the request.
    async fn signed_send_transaction(
        &self,
        request: &TransactionRequest,
        options: &SignOptions,
    ) -> eyre::Result<Boc> {
        let signature = if options.fake_signature {
            [0u8; 64]
        } else {
            self.keys.sign(&serde_json::to_vec(request)?)
        };
        let mut builder = CellBuilder::new();
        builder.store_raw(&signature, 512)?;
        Ok(Boc::from_root(&Arc::new(builder.build()))?)
    }

    async fn signed_sign_data(
        &self,
        payload: &SignDataPayload,
        meta: &SignDataMeta,
    ) -> eyre::Result<[u8; 64]> {
        let digest = sign_data_digest(&self.address(), payload, meta)?;
        Ok(self.keys.sign(&digest))
    }

    async fn signed_ton_proof(&self, challenge: &ProofChallenge) -> eyre::Result<[u8; 64]> {
        Ok(self.keys.sign(&ton_proof_digest(&self.address(), challenge)))
    }
}

/// The address every harness wallet signs from.
pub fn wallet_address() -> TonAddress {
    TestWallet::deterministic().address()
}

/// A frame recording everything the wallet posts into its page.
pub struct CollectingFrame {
    id: String,
    posted: Mutex<Vec<String>>,
}

impl CollectingFrame {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string(), posted: Mutex::new(Vec::new()) })
    }

    pub fn posted(&self) -> Vec<String> {
        self.posted.lock().clone()
    }

    /// Waits until the wallet has posted at least `count` payloads and
    /// returns them decoded.
    pub async fn posted_json(&self, count: usize) -> Vec<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let posted = self.posted();
            if posted.len() >= count {
                return posted
                    .iter()
                    .map(|raw| serde_json::from_str(raw).expect("frame payloads are JSON"))
                    .collect();
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "frame saw {} of {count} expected payloads",
                posted.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Frame for CollectingFrame {
    fn id(&self) -> &str {
        &self.id
    }

    fn post(&self, body: &str) -> Result<(), TransportError> {
        self.posted.lock().push(body.to_string());
        Ok(())
    }
}

/// Kit events forwarded into channels the test can await.
pub struct EventStream {
    pub connects: mpsc::UnboundedReceiver<ConnectRequestEvent>,
    pub transactions: mpsc::UnboundedReceiver<TransactionRequestEvent>,
    pub sign_data: mpsc::UnboundedReceiver<SignDataRequestEvent>,
    pub disconnects: mpsc::UnboundedReceiver<DisconnectEvent>,
    pub errors: mpsc::UnboundedReceiver<RequestErrorEvent>,
}

/// A kit over one injected frame, with a real signing wallet behind it.
pub struct Harness {
    pub kit: WalletKit,
    pub wallet: Arc<LocalWallet>,
    pub bus: Arc<FrameBus>,
    pub frame: Arc<CollectingFrame>,
    pub events: EventStream,
    next_message: AtomicU64,
}

impl Harness {
    pub fn spawn(config: KitConfig) -> Self {
        Self::assemble(config, None)
    }

    pub fn spawn_with_emulation(config: KitConfig, client: impl EmulationClient + 'static) -> Self {
        Self::assemble(config, Some(Arc::new(client)))
    }

    fn assemble(config: KitConfig, emulation: Option<Arc<dyn EmulationClient>>) -> Self {
        init_tracing();
        let wallet = Arc::new(LocalWallet::deterministic());
        let store = Arc::new(MemorySessionStore::new());
        let kit = match emulation {
            Some(client) => WalletKit::spawn_with_emulation(config, wallet.clone(), store, client),
            None => WalletKit::spawn(config, wallet.clone(), store),
        }
        .expect("kit spawns");

        let (connect_tx, connects) = mpsc::unbounded_channel();
        kit.on_connect_request(move |event| {
            let _ = connect_tx.send(event);
        });
        let (transaction_tx, transactions) = mpsc::unbounded_channel();
        kit.on_transaction_request(move |event| {
            let _ = transaction_tx.send(event);
        });
        let (sign_data_tx, sign_data) = mpsc::unbounded_channel();
        kit.on_sign_data_request(move |event| {
            let _ = sign_data_tx.send(event);
        });
        let (disconnect_tx, disconnects) = mpsc::unbounded_channel();
        kit.on_disconnect(move |event| {
            let _ = disconnect_tx.send(event);
        });
        let (error_tx, errors) = mpsc::unbounded_channel();
        kit.on_request_error(move |event| {
            let _ = error_tx.send(event);
        });
        let events = EventStream { connects, transactions, sign_data, disconnects, errors };

        let bus = Arc::new(FrameBus::new());
        kit.attach_injected(bus.clone());
        let frame = CollectingFrame::new(FRAME_ID);
        bus.register(frame.clone());

        Self { kit, wallet, bus, frame, events, next_message: AtomicU64::new(0) }
    }

    /// Pushes a payload into the bus as if the page posted it.
    pub fn page_sends(&self, body: impl Into<String>) {
        let n = self.next_message.fetch_add(1, Ordering::Relaxed);
        assert!(self.bus.receive(FRAME_ID, &format!("m-{n}"), body), "message was deduplicated");
    }

    /// Runs the connect handshake against `server`'s manifest and approves
    /// it, returning the session.
    pub async fn connect(&mut self, server: &ManifestServer) -> Session {
        self.page_sends(connect_body(server, vec![ton_addr_item()]));
        let event = next(&mut self.events.connects).await;
        self.kit.approve_connect(event.id).await.expect("connect approves")
    }
}

/// The next event off a channel, within the test timeout.
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Checks an ed25519 signature against the harness wallet's key.
pub fn assert_signed(wallet: &LocalWallet, message: &[u8], signature: &[u8]) {
    let signature = ed25519_dalek::Signature::from_slice(signature).expect("a 64-byte signature");
    wallet.keys.verifying_key().verify_strict(message, &signature).expect("signature verifies");
}

/// The wire form of a connect request for `server`'s manifest.
pub fn connect_body(server: &ManifestServer, items: Vec<serde_json::Value>) -> String {
    serde_json::json!({ "manifestUrl": server.manifest_url(), "items": items }).to_string()
}

pub fn ton_addr_item() -> serde_json::Value {
    serde_json::json!({ "name": "ton_addr" })
}

pub fn ton_proof_item(payload: &str) -> serde_json::Value {
    serde_json::json!({ "name": "ton_proof", "payload": payload })
}

/// A `tc://` connect link for `server`'s manifest from dApp `dapp_id`.
pub fn connect_link(server: &ManifestServer, dapp_id: &str) -> String {
    let request =
        serde_json::json!({ "manifestUrl": server.manifest_url(), "items": [ton_addr_item()] });
    let mut link = url::Url::parse("tc://connect").expect("static url");
    link.query_pairs_mut()
        .append_pair("v", "2")
        .append_pair("id", dapp_id)
        .append_pair("r", &request.to_string());
    link.to_string()
}

/// The wire envelope of an app request; params are doubly encoded JSON.
pub fn envelope(id: u64, method: &str, params: Vec<String>) -> String {
    serde_json::json!({ "id": id.to_string(), "method": method, "params": params }).to_string()
}

pub fn send_transaction_body(id: u64, request: &TransactionRequest) -> String {
    envelope(id, "sendTransaction", vec![serde_json::to_string(request).expect("encodes")])
}

pub fn sign_data_body(id: u64, payload: &serde_json::Value) -> String {
    envelope(id, "signData", vec![payload.to_string()])
}

/// A plain transfer of `nano` toncoin.
pub fn transfer(to: TonAddress, nano: u128) -> TransactionRequest {
    TransactionRequest {
        valid_until: None,
        network: None,
        from: None,
        messages: vec![TransactionMessage {
            address: to,
            amount: Coins::from_nano(nano),
            payload: None,
            state_init: None,
            mode: None,
            extra_currency: None,
        }],
    }
}

pub fn recipient() -> TonAddress {
    TonAddress::new(0, [3u8; 32])
}

/// Polls the bridge until `client_id` has at least `count` messages.
pub async fn wait_for_inbox(
    bridge: &TestRelay,
    client_id: &str,
    count: usize,
) -> Vec<(String, String)> {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let inbox = bridge.inbox(client_id);
        if inbox.len() >= count {
            return inbox;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "bridge delivered {} of {count} expected messages",
            inbox.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
