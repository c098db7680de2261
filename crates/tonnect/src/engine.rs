//! The request lifecycle engine.
//!
//! One engine serves one wallet account. Attached transports publish
//! decrypted inbound payloads; the engine decodes them, correlates them
//! with stored sessions, queues anything that needs a human decision in
//! the pending table and emits an event for the host UI. Approvals and
//! rejections resolve pending entries exactly once and answer the dApp
//! over the transport its session is bound to.

use crate::{
    config::{KitConfig, MismatchPolicy},
    error::KitError,
    events::{
        ConnectRequestEvent, DisconnectEvent, EventRegistry, RequestErrorEvent,
        SignDataRequestEvent, TransactionRequestEvent,
    },
    intents::{self, ConnectIntent, Intent, TransferIntent},
    manifest::ManifestClient,
    preview,
    requests::{unix_now, ActionKind, PendingAction, PendingId, PendingRequests, RequestState},
    wallet::{ProofChallenge, SignDataMeta, SignOptions, WalletAdapter},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tonnect_emulation::EmulationClient;
use tonnect_primitives::Boc;
use tonnect_protocol::{
    AppRequest, ConnectEventPayload, ConnectItem, ConnectItemReply, ConnectRequest,
    DisconnectPayload, EventBody, ProofDomain, RequestId, RequestPayload, SignDataPayload,
    SignDataResult, TonAddrItem, TonProof, TonProofItem, TransactionRequest, WalletError,
    WalletEvent, WalletResponse,
};
use tonnect_sessions::{DappInfo, Session, SessionId, SessionStore, SessionTransport};
use tonnect_transports::{
    relay::generate_session_keys, InboundMessage, Origin, RelayTransport, Transport, TransportKind,
};
use url::Url;

const TARGET: &str = "tonnect::engine";

/// `valid_until` values past the year 2286 can only be milliseconds, which
/// some SDKs send where the protocol wants seconds.
const MS_THRESHOLD: u64 = 10_000_000_000;

pub(crate) struct Engine {
    pub(crate) config: KitConfig,
    pub(crate) wallet: Arc<dyn WalletAdapter>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) emulation: Option<Arc<dyn EmulationClient>>,
    pub(crate) relay: Option<Arc<RelayTransport>>,
    transports: Mutex<Vec<Arc<dyn Transport>>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) pending: PendingRequests,
    pub(crate) events: EventRegistry,
    manifests: ManifestClient,
}

impl Engine {
    pub(crate) fn new(
        config: KitConfig,
        wallet: Arc<dyn WalletAdapter>,
        store: Arc<dyn SessionStore>,
        emulation: Option<Arc<dyn EmulationClient>>,
        relay: Option<Arc<RelayTransport>>,
    ) -> eyre::Result<Arc<Self>> {
        let manifests = ManifestClient::new()?;
        Ok(Arc::new(Self {
            config,
            wallet,
            store,
            emulation,
            relay,
            transports: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            pending: PendingRequests::new(),
            events: EventRegistry::new(),
            manifests,
        }))
    }

    /// Registers a transport and spawns its inbound pump. The pump holds a
    /// weak engine handle, so dropping the kit lets the tasks wind down.
    pub(crate) fn attach_transport(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        let kind = transport.kind();
        let mut rx = transport.subscribe();
        self.transports.lock().push(transport);
        let engine = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        let Some(engine) = engine.upgrade() else { break };
                        engine.handle_inbound(message).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(target: TARGET, %kind, missed, "inbound pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.listeners.lock().push(handle);
        tracing::debug!(target: TARGET, %kind, "transport attached");
    }

    /// Restarts bridge polling for every persisted relay session, so dApps
    /// connected before a restart can reach the wallet again.
    pub(crate) async fn resume_relay_sessions(&self) -> Result<usize, KitError> {
        let Some(relay) = &self.relay else { return Ok(0) };
        let mut resumed = 0;
        for session in self.store.list().await? {
            if let SessionTransport::Relay { bridge_url, wallet_keys, .. } = &session.transport {
                match relay.listen(bridge_url, wallet_keys) {
                    Ok(()) => resumed += 1,
                    Err(err) => {
                        tracing::warn!(target: TARGET, session = %session.id, %err, "resume failed")
                    }
                }
            }
        }
        if resumed > 0 {
            tracing::info!(target: TARGET, resumed, "resumed relay sessions");
        }
        Ok(resumed)
    }

    /// Decodes one inbound payload and dispatches it. Requests carry a
    /// `method`; connect handshakes carry a `manifestUrl`. Anything the
    /// engine cannot decode is answered with a bad-request error where a
    /// reply path exists.
    async fn handle_inbound(&self, message: InboundMessage) {
        let origin = message.origin;
        tracing::trace!(target: TARGET, session = %origin.session_id(), "inbound payload");
        let value: serde_json::Value = match serde_json::from_str(&message.body) {
            Ok(value) => value,
            Err(err) => {
                let error = WalletError::bad_request(format!("malformed request: {err}"));
                self.reply_error(&origin, RequestId::default(), error).await;
                return;
            }
        };
        if value.get("method").is_some() {
            // Pull the id out before the strict decode so even a malformed
            // envelope gets answered under the id the dApp sent.
            let id = value
                .get("id")
                .cloned()
                .and_then(|raw| serde_json::from_value(raw).ok())
                .unwrap_or_default();
            match serde_json::from_value::<AppRequest>(value) {
                Ok(request) => self.handle_app_request(origin, request).await,
                Err(err) => {
                    let error = WalletError::bad_request(format!("malformed request: {err}"));
                    self.reply_error(&origin, id, error).await;
                }
            }
        } else if value.get("manifestUrl").is_some() {
            match serde_json::from_value::<ConnectRequest>(value) {
                Ok(request) => self.handle_wire_connect(origin, request).await,
                Err(err) => {
                    let error =
                        WalletError::bad_request(format!("malformed connect request: {err}"));
                    self.events.emit_error(RequestErrorEvent {
                        session_id: Some(origin.session_id()),
                        error: error.clone(),
                    });
                    if let Some(binding) = self.reply_binding(&origin).await {
                        self.push_connect_error(&binding, error).await;
                    }
                }
            }
        } else {
            tracing::debug!(target: TARGET, "ignoring payload with neither method nor manifestUrl");
        }
    }

    async fn handle_app_request(&self, origin: Origin, request: AppRequest) {
        let session_id = origin.session_id();
        let session = match self.store.get(&session_id).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(target: TARGET, %err, "session lookup failed");
                let error = WalletError::internal("session store unavailable");
                self.reply_error(&origin, request.id, error).await;
                return;
            }
        };
        let Some(mut session) = session else {
            tracing::debug!(
                target: TARGET,
                session = %session_id,
                method = request.method.as_str(),
                "request from unknown session"
            );
            self.reply_error(&origin, request.id, WalletError::unknown_app()).await;
            return;
        };

        let payload = match request.parse_payload() {
            Ok(payload) => payload,
            Err(error) => {
                self.reply_error(&origin, request.id, error).await;
                return;
            }
        };

        session.touch(unix_now());
        match payload {
            RequestPayload::Disconnect => {
                self.handle_disconnect_request(origin, request.id, session).await
            }
            RequestPayload::SendTransaction(tx) => {
                self.handle_transaction_request(origin, request.id, session, tx).await
            }
            RequestPayload::SignData(payload) => {
                self.handle_sign_data_request(origin, request.id, session, payload).await
            }
        }
    }

    /// A `disconnect` request: acknowledge, then forget. The ack goes out
    /// first because a removed relay session has no listener to answer on.
    async fn handle_disconnect_request(&self, origin: Origin, id: RequestId, session: Session) {
        if let Some(binding) = self.reply_binding(&origin).await {
            let ack = WalletResponse::success(id, serde_json::json!({}));
            if let Err(err) = self.send_json(&binding, &ack).await {
                tracing::debug!(target: TARGET, %err, "disconnect ack failed to send");
            }
        }
        if let Err(err) = self.store.remove(&session.id).await {
            tracing::warn!(target: TARGET, %err, "removing disconnected session failed");
        }
        self.stop_relay_listener(&session.transport);
        tracing::info!(target: TARGET, session = %session.id, dapp = %session.dapp.name, "dApp disconnected");
        self.events.emit_disconnect(DisconnectEvent { session });
    }

    async fn handle_transaction_request(
        &self,
        origin: Origin,
        id: RequestId,
        session: Session,
        request: TransactionRequest,
    ) {
        if let Err(error) = self.check_transaction(&request) {
            self.reply_error(&origin, id, error).await;
            return;
        }

        let binding = session.transport.clone();
        let pending_id = self.pending.insert(
            Some(id),
            Some(session.id.clone()),
            Some(binding.clone()),
            PendingAction::Transaction { request: request.clone() },
        );
        self.pending.set_state(pending_id, RequestState::Previewing);
        let preview =
            preview::build(self.wallet.address(), &request, self.emulation.as_deref()).await;
        self.pending.set_state(pending_id, RequestState::Presented);

        if self.config.mismatch_policy == MismatchPolicy::AutoReject
            && preview.verdict.is_mismatch()
        {
            tracing::warn!(target: TARGET, request = %pending_id, "money flow diverges, auto-rejecting");
            let _ = self.pending.take(pending_id, ActionKind::Transaction);
            let error =
                WalletError::declined("emulated money flow diverges from the request");
            self.events.emit_error(RequestErrorEvent {
                session_id: Some(session.id),
                error: error.clone(),
            });
            self.answer(Some(id), Some(&binding), Err(error)).await;
            return;
        }

        if let Err(err) = self.store.put(session.clone()).await {
            tracing::warn!(target: TARGET, %err, "persisting session activity failed");
        }
        let presented = self.events.emit_transaction(TransactionRequestEvent {
            id: pending_id,
            session: Some(session),
            request,
            preview,
        });
        if !presented {
            tracing::warn!(target: TARGET, request = %pending_id, "transaction request has no listener");
        }
    }

    async fn handle_sign_data_request(
        &self,
        origin: Origin,
        id: RequestId,
        session: Session,
        payload: SignDataPayload,
    ) {
        if let Err(error) = check_sign_data(&payload) {
            self.reply_error(&origin, id, error).await;
            return;
        }
        let pending_id = self.pending.insert(
            Some(id),
            Some(session.id.clone()),
            Some(session.transport.clone()),
            PendingAction::SignData { payload: payload.clone() },
        );
        self.pending.set_state(pending_id, RequestState::Presented);
        if let Err(err) = self.store.put(session.clone()).await {
            tracing::warn!(target: TARGET, %err, "persisting session activity failed");
        }
        let presented = self.events.emit_sign_data(SignDataRequestEvent {
            id: pending_id,
            session: Some(session),
            payload,
        });
        if !presented {
            tracing::warn!(target: TARGET, request = %pending_id, "sign data request has no listener");
        }
    }

    /// A connect handshake arriving over an attached transport. Injected
    /// pages and reverse-RPC peers connect this way. Relay connects arrive
    /// as links instead; a wire connect over relay has no wallet keypair
    /// bound to it and cannot be answered, so it is dropped.
    async fn handle_wire_connect(&self, origin: Origin, request: ConnectRequest) {
        let binding = match &origin {
            Origin::Injected { frame_id } => {
                SessionTransport::Injected { frame_id: frame_id.clone() }
            }
            Origin::ReverseRpc { peer } => SessionTransport::ReverseRpc { peer: peer.clone() },
            Origin::Relay { .. } => {
                tracing::debug!(target: TARGET, "dropping connect request arriving over relay");
                self.events.emit_error(RequestErrorEvent {
                    session_id: Some(origin.session_id()),
                    error: WalletError::bad_request("relay connections start from a connect link"),
                });
                return;
            }
        };
        let kind = origin.kind();
        if let Err(err) = self.start_connect(binding, request, kind).await {
            tracing::debug!(target: TARGET, %err, "wire connect not presented");
        }
    }

    /// Fetches the manifest and presents the connect request. A manifest
    /// failure is pushed to the dApp as a `connect_error` event and fails
    /// the call.
    async fn start_connect(
        &self,
        binding: SessionTransport,
        request: ConnectRequest,
        transport: TransportKind,
    ) -> Result<PendingId, KitError> {
        let manifest = match self.manifests.fetch(&request.manifest_url).await {
            Ok(manifest) => manifest,
            Err(error) => {
                tracing::info!(
                    target: TARGET,
                    url = %request.manifest_url,
                    code = ?error.code,
                    "manifest fetch failed"
                );
                self.events.emit_error(RequestErrorEvent {
                    session_id: Some(binding.session_id()),
                    error: error.clone(),
                });
                self.push_connect_error(&binding, error.clone()).await;
                self.stop_relay_listener(&binding);
                return Err(KitError::Protocol(error));
            }
        };

        let items = request.items.clone();
        let pending_id = self.pending.insert(
            None,
            None,
            Some(binding),
            PendingAction::Connect { request, manifest: manifest.clone() },
        );
        self.pending.set_state(pending_id, RequestState::Presented);
        tracing::info!(target: TARGET, request = %pending_id, dapp = %manifest.name, "connect request presented");
        let presented = self.events.emit_connect(ConnectRequestEvent {
            id: pending_id,
            manifest,
            items,
            transport,
        });
        if !presented {
            tracing::warn!(target: TARGET, request = %pending_id, "connect request has no listener");
        }
        Ok(pending_id)
    }

    /// Parses a connection or transfer link and starts the matching flow.
    pub(crate) async fn handle_connection_url(&self, raw: &str) -> Result<PendingId, KitError> {
        match intents::parse_url(raw)? {
            Intent::Connect(intent) => self.start_link_connect(intent).await,
            Intent::Transfer(intent) => self.start_transfer(intent).await,
        }
    }

    async fn start_link_connect(&self, intent: ConnectIntent) -> Result<PendingId, KitError> {
        let Some(relay) = &self.relay else { return Err(KitError::BridgeNotConfigured) };
        let Some(bridge_url) = &self.config.bridge_url else {
            return Err(KitError::BridgeNotConfigured);
        };
        // The keypair must be polling before the connect event goes out, or
        // the dApp's first request can fall into the gap.
        let wallet_keys = generate_session_keys();
        relay.listen(bridge_url, &wallet_keys)?;
        let binding = SessionTransport::Relay {
            bridge_url: bridge_url.clone(),
            dapp_client_id: intent.dapp_client_id,
            wallet_keys,
        };
        self.start_connect(binding, intent.request, TransportKind::Relay).await
    }

    /// A transfer link is a locally initiated transaction: no session, no
    /// wire id, nobody to answer. The mismatch policy does not apply; it
    /// exists to guard against hostile dApps, and this request came from
    /// the user's own hand.
    async fn start_transfer(&self, intent: TransferIntent) -> Result<PendingId, KitError> {
        let request = intent.to_request();
        let action = PendingAction::Transaction { request: request.clone() };
        let pending_id = self.pending.insert(None, None, None, action);
        self.pending.set_state(pending_id, RequestState::Previewing);
        let preview =
            preview::build(self.wallet.address(), &request, self.emulation.as_deref()).await;
        self.pending.set_state(pending_id, RequestState::Presented);
        let presented = self.events.emit_transaction(TransactionRequestEvent {
            id: pending_id,
            session: None,
            request,
            preview,
        });
        if !presented {
            tracing::warn!(target: TARGET, request = %pending_id, "transfer intent has no listener");
        }
        Ok(pending_id)
    }

    /// Approves a pending connect request: builds the requested items,
    /// pushes the `connect` event and persists the session.
    ///
    /// At most one session per (wallet, dApp domain) is kept for relay and
    /// reverse-RPC connections; an older session for the same domain is
    /// replaced. Injected sessions have no trustworthy origin and are keyed
    /// by frame alone.
    pub(crate) async fn approve_connect(&self, id: PendingId) -> Result<Session, KitError> {
        let pending = self
            .pending
            .take(id, ActionKind::Connect)
            .map_err(KitError::from_take(id, ActionKind::Connect))?;
        let PendingAction::Connect { request, manifest } = pending.action else {
            return Err(KitError::UnknownRequest(id));
        };
        let binding = pending.binding.ok_or(KitError::NoReplyPath(id))?;

        let now = unix_now();
        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            match item {
                ConnectItem::TonAddr => {
                    let state_init =
                        self.wallet.state_init().await.map_err(KitError::adapter)?;
                    items.push(ConnectItemReply::TonAddr(TonAddrItem {
                        address: self.wallet.address(),
                        network: self.wallet.network(),
                        public_key: hex::encode(self.wallet.public_key()),
                        wallet_state_init: state_init,
                    }));
                }
                ConnectItem::TonProof { payload } => {
                    let challenge = ProofChallenge {
                        payload: payload.clone(),
                        domain: manifest.host().unwrap_or_default(),
                        timestamp: now,
                    };
                    let signature =
                        self.wallet.signed_ton_proof(&challenge).await.map_err(KitError::adapter)?;
                    items.push(ConnectItemReply::TonProof(TonProofItem {
                        proof: TonProof {
                            timestamp: challenge.timestamp,
                            domain: ProofDomain::new(challenge.domain),
                            signature: STANDARD.encode(signature),
                            payload: challenge.payload,
                        },
                    }));
                }
                ConnectItem::Unknown(value) => {
                    tracing::debug!(target: TARGET, item = %value, "skipping unknown connect item");
                }
            }
        }

        let domain = match &binding {
            SessionTransport::Injected { .. } => None,
            _ => manifest.host(),
        };
        let mut session = Session {
            id: binding.session_id(),
            wallet: self.wallet.wallet_id(),
            dapp: DappInfo::from(&manifest),
            domain,
            transport: binding,
            created_at: now,
            last_activity_at: now,
            // Seeded with the clock so ids stay above those of any earlier
            // session with the same dApp, even after a wiped store.
            next_event_id: now,
        };

        if let Some(domain) = session.domain.clone() {
            let stale: Vec<Session> = self
                .store
                .for_wallet(&session.wallet)
                .await?
                .into_iter()
                .filter(|s| s.id != session.id && s.domain.as_deref() == Some(domain.as_str()))
                .collect();
            for old in stale {
                tracing::info!(target: TARGET, session = %old.id, %domain, "replacing older session");
                self.store.remove(&old.id).await?;
                self.stop_relay_listener(&old.transport);
            }
        }

        let event = WalletEvent {
            id: session.issue_event_id(),
            body: EventBody::Connect(ConnectEventPayload {
                items,
                device: self.config.device.clone(),
            }),
        };
        self.send_json(&session.transport, &event).await?;
        self.store.put(session.clone()).await?;
        tracing::info!(target: TARGET, session = %session.id, dapp = %session.dapp.name, "dApp connected");
        Ok(session)
    }

    /// Rejects a pending connect request with `connect_error`. No session
    /// comes into being; the relay keypair opened for the link is closed.
    pub(crate) async fn reject_connect(
        &self,
        id: PendingId,
        error: Option<WalletError>,
    ) -> Result<(), KitError> {
        let pending = self
            .pending
            .take(id, ActionKind::Connect)
            .map_err(KitError::from_take(id, ActionKind::Connect))?;
        let binding = pending.binding.ok_or(KitError::NoReplyPath(id))?;
        let error = error.unwrap_or_else(WalletError::user_declined);
        self.push_connect_error(&binding, error).await;
        self.stop_relay_listener(&binding);
        Ok(())
    }

    /// Signs a pending transaction request and answers the dApp with the
    /// signed BOC. A request past its `valid_until` is answered with an
    /// error instead and the call fails.
    pub(crate) async fn approve_transaction(&self, id: PendingId) -> Result<Boc, KitError> {
        let pending = self
            .pending
            .take(id, ActionKind::Transaction)
            .map_err(KitError::from_take(id, ActionKind::Transaction))?;
        let PendingAction::Transaction { request } = pending.action else {
            return Err(KitError::UnknownRequest(id));
        };

        if let Some(deadline) = normalized_valid_until(&request) {
            if deadline <= unix_now() {
                tracing::info!(target: TARGET, request = %id, deadline, "transaction expired before approval");
                let error = WalletError::bad_request("transaction request expired");
                self.answer(pending.wire_id, pending.binding.as_ref(), Err(error)).await;
                return Err(KitError::Expired);
            }
        }

        match self.wallet.signed_send_transaction(&request, &SignOptions::default()).await {
            Ok(boc) => {
                let encoded = serde_json::Value::String(boc.to_base64());
                self.answer(pending.wire_id, pending.binding.as_ref(), Ok(encoded)).await;
                tracing::info!(target: TARGET, request = %id, "transaction signed");
                Ok(boc)
            }
            Err(err) => {
                let error = WalletError::internal("signing failed");
                self.answer(pending.wire_id, pending.binding.as_ref(), Err(error)).await;
                Err(KitError::adapter(err))
            }
        }
    }

    pub(crate) async fn reject_transaction(
        &self,
        id: PendingId,
        error: Option<WalletError>,
    ) -> Result<(), KitError> {
        let pending = self
            .pending
            .take(id, ActionKind::Transaction)
            .map_err(KitError::from_take(id, ActionKind::Transaction))?;
        let error = error.unwrap_or_else(WalletError::user_declined);
        self.answer(pending.wire_id, pending.binding.as_ref(), Err(error)).await;
        Ok(())
    }

    /// Signs a pending sign-data request, bound to the session's domain.
    pub(crate) async fn approve_sign_data(
        &self,
        id: PendingId,
    ) -> Result<SignDataResult, KitError> {
        let pending = self
            .pending
            .take(id, ActionKind::SignData)
            .map_err(KitError::from_take(id, ActionKind::SignData))?;
        let PendingAction::SignData { payload } = pending.action else {
            return Err(KitError::UnknownRequest(id));
        };

        let domain = match &pending.session_id {
            Some(session_id) => match self.store.get(session_id).await? {
                Some(session) => {
                    session.domain.or_else(|| host_of(&session.dapp.url)).unwrap_or_default()
                }
                None => String::new(),
            },
            None => String::new(),
        };
        let meta = SignDataMeta { domain: domain.clone(), timestamp: unix_now() };
        let signature = match self.wallet.signed_sign_data(&payload, &meta).await {
            Ok(signature) => signature,
            Err(err) => {
                let error = WalletError::internal("signing failed");
                self.answer(pending.wire_id, pending.binding.as_ref(), Err(error)).await;
                return Err(KitError::adapter(err));
            }
        };

        let result = SignDataResult {
            signature: STANDARD.encode(signature),
            address: self.wallet.address(),
            timestamp: meta.timestamp,
            domain,
            payload,
        };
        self.answer(pending.wire_id, pending.binding.as_ref(), Ok(serde_json::to_value(&result)?))
            .await;
        tracing::info!(target: TARGET, request = %id, "data signed");
        Ok(result)
    }

    pub(crate) async fn reject_sign_data(
        &self,
        id: PendingId,
        error: Option<WalletError>,
    ) -> Result<(), KitError> {
        let pending = self
            .pending
            .take(id, ActionKind::SignData)
            .map_err(KitError::from_take(id, ActionKind::SignData))?;
        let error = error.unwrap_or_else(WalletError::user_declined);
        self.answer(pending.wire_id, pending.binding.as_ref(), Err(error)).await;
        Ok(())
    }

    /// Disconnects one session wallet-side: pushes a `disconnect` event to
    /// the dApp, stops its relay listener and forgets it.
    pub(crate) async fn disconnect(&self, id: &SessionId) -> Result<Session, KitError> {
        let session = self
            .store
            .remove(id)
            .await?
            .ok_or_else(|| KitError::UnknownSession(id.clone()))?;
        Ok(self.push_disconnect(session).await)
    }

    pub(crate) async fn disconnect_all(&self) -> Result<Vec<Session>, KitError> {
        let sessions = self.store.remove_for_wallet(&self.wallet.wallet_id()).await?;
        let mut disconnected = Vec::with_capacity(sessions.len());
        for session in sessions {
            disconnected.push(self.push_disconnect(session).await);
        }
        Ok(disconnected)
    }

    pub(crate) async fn list_sessions(&self) -> Result<Vec<Session>, KitError> {
        Ok(self.store.list().await?)
    }

    async fn push_disconnect(&self, mut session: Session) -> Session {
        let event = WalletEvent {
            id: session.issue_event_id(),
            body: EventBody::Disconnect(DisconnectPayload::default()),
        };
        if let Err(err) = self.send_json(&session.transport, &event).await {
            tracing::debug!(target: TARGET, session = %session.id, %err, "disconnect event not delivered");
        }
        self.stop_relay_listener(&session.transport);
        tracing::info!(target: TARGET, session = %session.id, dapp = %session.dapp.name, "session disconnected");
        self.events.emit_disconnect(DisconnectEvent { session: session.clone() });
        session
    }

    /// Structural and wallet-side checks before a transaction request is
    /// queued: message limits, declared network and sender must match the
    /// wallet this engine serves.
    fn check_transaction(&self, request: &TransactionRequest) -> Result<(), WalletError> {
        request.validate()?;
        if let Some(network) = request.network {
            if network != self.wallet.network() {
                return Err(WalletError::bad_request(format!(
                    "request targets network {network}, the wallet is on {}",
                    self.wallet.network()
                )));
            }
        }
        if let Some(from) = request.from {
            if from != self.wallet.address() {
                return Err(WalletError::bad_request(
                    "request `from` does not match the wallet address",
                ));
            }
        }
        Ok(())
    }

    /// A transport binding for answering `origin`, if one can be built.
    ///
    /// Injected and reverse-RPC origins carry everything a reply needs.
    /// Relay replies are sealed with the session keys, so they need the
    /// stored session.
    async fn reply_binding(&self, origin: &Origin) -> Option<SessionTransport> {
        match origin {
            Origin::Injected { frame_id } => {
                Some(SessionTransport::Injected { frame_id: frame_id.clone() })
            }
            Origin::ReverseRpc { peer } => {
                Some(SessionTransport::ReverseRpc { peer: peer.clone() })
            }
            Origin::Relay { .. } => {
                let session = self.store.get(&origin.session_id()).await.ok().flatten()?;
                Some(session.transport)
            }
        }
    }

    /// Answers `origin` with an error response and tells the host about it.
    async fn reply_error(&self, origin: &Origin, id: RequestId, error: WalletError) {
        tracing::debug!(target: TARGET, session = %origin.session_id(), code = ?error.code, %error, "answering with error");
        self.events.emit_error(RequestErrorEvent {
            session_id: Some(origin.session_id()),
            error: error.clone(),
        });
        let Some(binding) = self.reply_binding(origin).await else {
            tracing::debug!(target: TARGET, session = %origin.session_id(), "no reply path for error");
            return;
        };
        if let Err(err) = self.send_json(&binding, &WalletResponse::error(id, error)).await {
            tracing::debug!(target: TARGET, %err, "error reply failed to send");
        }
    }

    /// Sends a response for a resolved pending request. Locally initiated
    /// requests have no wire id and nobody to answer, which is fine.
    async fn answer(
        &self,
        wire_id: Option<RequestId>,
        binding: Option<&SessionTransport>,
        outcome: Result<serde_json::Value, WalletError>,
    ) {
        let (Some(wire_id), Some(binding)) = (wire_id, binding) else { return };
        let response = match outcome {
            Ok(value) => WalletResponse::success(wire_id, value),
            Err(error) => WalletResponse::error(wire_id, error),
        };
        if let Err(err) = self.send_json(binding, &response).await {
            tracing::debug!(target: TARGET, %err, "reply failed to send");
        }
    }

    async fn push_connect_error(&self, binding: &SessionTransport, error: WalletError) {
        let event = WalletEvent { id: 0, body: EventBody::ConnectError(error) };
        if let Err(err) = self.send_json(binding, &event).await {
            tracing::debug!(target: TARGET, %err, "connect error event failed to send");
        }
    }

    /// Serializes and delivers a payload over the transport that carries
    /// `binding`.
    async fn send_json<T: Serialize>(
        &self,
        binding: &SessionTransport,
        payload: &T,
    ) -> Result<(), KitError> {
        let body = serde_json::to_string(payload)?;
        let kind = TransportKind::of(binding);
        let transport = {
            let transports = self.transports.lock();
            transports.iter().find(|t| t.kind() == kind).cloned()
        };
        let transport = transport.ok_or(KitError::NoTransport(kind))?;
        transport.send(binding, &body).await?;
        Ok(())
    }

    fn stop_relay_listener(&self, transport: &SessionTransport) {
        if let (Some(relay), SessionTransport::Relay { wallet_keys, .. }) = (&self.relay, transport)
        {
            relay.stop(&wallet_keys.public);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for handle in self.listeners.lock().drain(..) {
            handle.abort();
        }
        if let Some(relay) = &self.relay {
            relay.stop_all();
        }
    }
}

/// Rejects sign-data payloads that could never be signed before they are
/// presented: undecodable base64 and unparsable cells.
fn check_sign_data(payload: &SignDataPayload) -> Result<(), WalletError> {
    match payload {
        SignDataPayload::Text { .. } => Ok(()),
        SignDataPayload::Binary { bytes } => match STANDARD.decode(bytes) {
            Ok(_) => Ok(()),
            Err(err) => Err(WalletError::bad_request(format!("sign data bytes: {err}"))),
        },
        SignDataPayload::Cell { cell, .. } => match cell.parse_root() {
            Ok(_) => Ok(()),
            Err(err) => Err(WalletError::bad_request(format!("sign data cell: {err}"))),
        },
    }
}

/// `valid_until` in unix seconds, scaling down values that arrived in
/// milliseconds.
fn normalized_valid_until(request: &TransactionRequest) -> Option<u64> {
    request.valid_until.map(|v| if v > MS_THRESHOLD { v / 1000 } else { v })
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonnect_protocol::ErrorCode;

    #[test]
    fn valid_until_accepts_both_units() {
        let mut request = TransactionRequest { valid_until: None, ..Default::default() };
        assert_eq!(normalized_valid_until(&request), None);

        request.valid_until = Some(1_700_000_000);
        assert_eq!(normalized_valid_until(&request), Some(1_700_000_000));

        request.valid_until = Some(1_700_000_000_000);
        assert_eq!(normalized_valid_until(&request), Some(1_700_000_000));
    }

    #[test]
    fn sign_data_prechecks_catch_undecodable_payloads() {
        check_sign_data(&SignDataPayload::Text { text: "hi".into() }).unwrap();
        check_sign_data(&SignDataPayload::Binary { bytes: "AQID".into() }).unwrap();

        let err =
            check_sign_data(&SignDataPayload::Binary { bytes: "not base64!!".into() }).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);

        let err = check_sign_data(&SignDataPayload::Cell {
            schema: "anything".into(),
            cell: Boc::from_bytes(vec![1, 2, 3]),
        })
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[test]
    fn hosts_come_from_full_urls() {
        assert_eq!(host_of("https://app.example/page"), Some("app.example".to_string()));
        assert_eq!(host_of("not a url"), None);
    }
}
