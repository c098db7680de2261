//! Calls into the host application and traffic proxied through it.
//!
//! The kit is a library inside a wallet app; some things only the host can
//! do, such as producing signatures or showing UI. Those travel as reverse
//! RPC: the kit delivers a request payload through the [`HostBridge`],
//! remembers the call in a correlation table and waits for the host to
//! answer with a [`WalletResponse`] carrying the same id. Ids are scoped to
//! the client instance, never global, so two kits in one process cannot
//! steal each other's answers. Each pending call resolves at most once;
//! late or repeated answers are dropped.

use crate::{
    InboundMessage, Origin, Transport, TransportError, TransportKind, INBOUND_CHANNEL_CAPACITY,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::sync::{broadcast, oneshot};
use tonnect_protocol::{AppRequest, RequestId, RequestMethod, ResponseResult, WalletResponse};
use tonnect_sessions::SessionTransport;

/// How long a reverse call waits for the host by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Host side of the reverse channel. Implementations deliver one JSON
/// payload to the application; answers come back asynchronously through
/// [`ReverseRpcClient::resolve_response`].
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn deliver(&self, payload: String) -> Result<(), TransportError>;
}

/// Pending reverse calls of one client instance.
#[derive(Debug)]
pub struct CorrelationTable {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<ResponseResult>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), pending: Mutex::new(HashMap::new()) }
    }

    fn register(&self) -> (u64, oneshot::Receiver<ResponseResult>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    fn forget(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    /// Hands an answer to the waiting call. Returns false when no call with
    /// this id is pending, which covers late answers, repeated answers and
    /// ids this instance never issued.
    pub fn resolve(&self, id: u64, result: ResponseResult) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                tracing::debug!(target: "tonnect::reverse_rpc", id, "dropping unmatched answer");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Issues reverse calls over a [`HostBridge`].
#[derive(Debug)]
pub struct ReverseRpcClient<B> {
    bridge: B,
    table: CorrelationTable,
    timeout: Duration,
}

impl<B: HostBridge> ReverseRpcClient<B> {
    pub fn new(bridge: B) -> Self {
        Self::with_timeout(bridge, DEFAULT_CALL_TIMEOUT)
    }

    /// Overrides [`DEFAULT_CALL_TIMEOUT`]. Hosts are expected to stay
    /// within the 30-60s window the bridge protocol sanctions.
    pub fn with_timeout(bridge: B, timeout: Duration) -> Self {
        Self { bridge, table: CorrelationTable::new(), timeout }
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Calls `method` on the host and waits for its answer. The payload is
    /// an [`AppRequest`] envelope, so hosts decode one wire shape for both
    /// directions.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<String>,
    ) -> Result<serde_json::Value, TransportError> {
        let (id, rx) = self.table.register();
        let request = AppRequest {
            id: RequestId(id),
            method: RequestMethod::from(method),
            params,
        };
        let payload = match serde_json::to_string(&request) {
            Ok(payload) => payload,
            Err(err) => {
                self.table.forget(id);
                return Err(TransportError::Bridge(err.to_string()));
            }
        };
        tracing::debug!(target: "tonnect::reverse_rpc", id, method, "calling into the host");
        if let Err(err) = self.bridge.deliver(payload).await {
            self.table.forget(id);
            return Err(err);
        }
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(ResponseResult::Success(value))) => Ok(value),
            Ok(Ok(ResponseResult::Error(error))) => Err(TransportError::Call(error)),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.table.forget(id);
                Err(TransportError::Timeout(self.timeout))
            }
        }
    }

    /// Feeds a host answer to the matching pending call.
    pub fn resolve_response(&self, response: WalletResponse) -> bool {
        self.table.resolve(response.id.0, response.result)
    }
}

/// Envelope for dApp traffic proxied through the host, addressed by peer
/// name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEnvelope {
    pub peer: String,
    pub payload: String,
}

/// [`Transport`] for sessions the host proxies itself.
pub struct ReverseRpcTransport<B> {
    client: std::sync::Arc<ReverseRpcClient<B>>,
    inbound: broadcast::Sender<InboundMessage>,
}

impl<B: HostBridge> ReverseRpcTransport<B> {
    pub fn new(client: std::sync::Arc<ReverseRpcClient<B>>) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Self { client, inbound }
    }

    pub fn client(&self) -> &std::sync::Arc<ReverseRpcClient<B>> {
        &self.client
    }

    /// Host glue feeds dApp payloads that arrived through the host here.
    pub fn receive(&self, peer: &str, body: impl Into<String>) {
        let message = InboundMessage {
            origin: Origin::ReverseRpc { peer: peer.to_string() },
            body: body.into(),
        };
        let _ = self.inbound.send(message);
    }
}

#[async_trait]
impl<B: HostBridge + 'static> Transport for ReverseRpcTransport<B> {
    fn kind(&self) -> TransportKind {
        TransportKind::ReverseRpc
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    async fn send(&self, binding: &SessionTransport, body: &str) -> Result<(), TransportError> {
        let SessionTransport::ReverseRpc { peer } = binding else {
            return Err(TransportError::WrongTransport { expected: TransportKind::ReverseRpc });
        };
        let envelope = PeerEnvelope { peer: peer.clone(), payload: body.to_string() };
        let payload = serde_json::to_string(&envelope)
            .map_err(|err| TransportError::Bridge(err.to_string()))?;
        self.client.bridge.deliver(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tonnect_protocol::WalletError;

    struct ChannelBridge {
        delivered: mpsc::UnboundedSender<String>,
    }

    impl ChannelBridge {
        fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { delivered: tx }, rx)
        }
    }

    #[async_trait]
    impl HostBridge for ChannelBridge {
        async fn deliver(&self, payload: String) -> Result<(), TransportError> {
            self.delivered
                .send(payload)
                .map_err(|_| TransportError::Bridge("host went away".into()))
        }
    }

    struct FailingBridge;

    #[async_trait]
    impl HostBridge for FailingBridge {
        async fn deliver(&self, _payload: String) -> Result<(), TransportError> {
            Err(TransportError::Bridge("no host attached".into()))
        }
    }

    fn sent_request(payload: &str) -> AppRequest {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn call_resolves_with_the_host_answer() {
        let (bridge, mut delivered) = ChannelBridge::new();
        let client = Arc::new(ReverseRpcClient::new(bridge));

        let call = {
            let client = client.clone();
            tokio::spawn(async move {
                client.call("getPublicKey", vec![]).await
            })
        };

        let request = sent_request(&delivered.recv().await.unwrap());
        assert_eq!(request.method.as_str(), "getPublicKey");
        assert!(client.resolve_response(WalletResponse::success(
            request.id,
            json!({"publicKey": "aa".repeat(32)}),
        )));

        let value = call.await.unwrap().unwrap();
        assert_eq!(value["publicKey"], json!("aa".repeat(32)));
        assert_eq!(client.table().pending_count(), 0);
    }

    #[tokio::test]
    async fn host_errors_surface_as_call_errors() {
        let (bridge, mut delivered) = ChannelBridge::new();
        let client = Arc::new(ReverseRpcClient::new(bridge));

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getSignedSendTransaction", vec![]).await })
        };

        let request = sent_request(&delivered.recv().await.unwrap());
        client.resolve_response(WalletResponse::error(request.id, WalletError::user_declined()));

        match call.await.unwrap() {
            Err(TransportError::Call(err)) => {
                assert_eq!(err.code, tonnect_protocol::ErrorCode::UserDeclined)
            }
            other => panic!("expected a declined call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn calls_time_out_and_clean_up() {
        let (bridge, _delivered) = ChannelBridge::new();
        let client = ReverseRpcClient::with_timeout(bridge, Duration::from_millis(30));
        let err = client.call("getNetwork", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(client.table().pending_count(), 0);
    }

    #[tokio::test]
    async fn failed_delivery_cleans_up() {
        let client = ReverseRpcClient::new(FailingBridge);
        let err = client.call("getAddress", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Bridge(_)));
        assert_eq!(client.table().pending_count(), 0);
    }

    #[tokio::test]
    async fn answers_resolve_exactly_once() {
        let (bridge, mut delivered) = ChannelBridge::new();
        let client = Arc::new(ReverseRpcClient::new(bridge));

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getWalletId", vec![]).await })
        };

        let request = sent_request(&delivered.recv().await.unwrap());
        assert!(client.resolve_response(WalletResponse::success(request.id, json!("w5:0:00"))));
        assert!(!client.resolve_response(WalletResponse::success(request.id, json!("again"))));
        assert!(!client.table().resolve(9_999, ResponseResult::Success(json!(null))));

        assert_eq!(call.await.unwrap().unwrap(), json!("w5:0:00"));
    }

    #[tokio::test]
    async fn concurrent_calls_get_distinct_ids() {
        let (bridge, mut delivered) = ChannelBridge::new();
        let client = Arc::new(ReverseRpcClient::new(bridge));

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getPublicKey", vec![]).await })
        };
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getNetwork", vec![]).await })
        };

        let a = sent_request(&delivered.recv().await.unwrap());
        let b = sent_request(&delivered.recv().await.unwrap());
        assert_ne!(a.id, b.id);

        for request in [a, b] {
            client.resolve_response(WalletResponse::success(request.id, json!(null)));
        }
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn proxied_sessions_travel_in_peer_envelopes() {
        let (bridge, mut delivered) = ChannelBridge::new();
        let client = Arc::new(ReverseRpcClient::new(bridge));
        let transport = ReverseRpcTransport::new(client);

        let mut rx = transport.subscribe();
        transport.receive("game-frame", "{\"method\":\"disconnect\"}");
        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.origin, Origin::ReverseRpc { peer: "game-frame".into() });

        let binding = SessionTransport::ReverseRpc { peer: "game-frame".into() };
        transport.send(&binding, "{\"event\":\"disconnect\"}").await.unwrap();
        let envelope: PeerEnvelope =
            serde_json::from_str(&delivered.recv().await.unwrap()).unwrap();
        assert_eq!(envelope.peer, "game-frame");
        assert_eq!(envelope.payload, "{\"event\":\"disconnect\"}");
    }
}
