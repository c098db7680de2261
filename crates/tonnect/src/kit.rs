//! The embedder-facing kit handle.

use crate::{
    config::KitConfig,
    engine::Engine,
    error::KitError,
    events::{
        ConnectRequestEvent, DisconnectEvent, RequestErrorEvent, SignDataRequestEvent,
        Subscription, TransactionRequestEvent,
    },
    requests::{PendingId, PendingRequest},
    wallet::WalletAdapter,
};
use std::sync::Arc;
use tonnect_emulation::{EmulationClient, HttpEmulationClient};
use tonnect_primitives::Boc;
use tonnect_protocol::{SignDataResult, WalletError};
use tonnect_sessions::{Session, SessionId, SessionStore};
use tonnect_transports::{
    FrameBus, HostBridge, InjectedTransport, RelayTransport, ReverseRpcTransport, Transport,
};

/// One wallet account's connection kit.
///
/// Owns the engine and its background tasks; dropping the kit disconnects
/// nothing but stops listening. Construction needs a running Tokio runtime
/// because the relay poller and inbound pumps are spawned tasks.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tonnect::{KitConfig, WalletKit};
/// # use tonnect_sessions::MemorySessionStore;
/// # fn wallet() -> Arc<dyn tonnect::WalletAdapter> { unimplemented!() }
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> eyre::Result<()> {
/// let config = KitConfig::new().with_bridge_url("https://bridge.example".parse()?);
/// let kit = WalletKit::spawn(config, wallet(), Arc::new(MemorySessionStore::new()))?;
/// kit.on_connect_request(|event| println!("{} wants to connect", event.manifest.name));
/// # Ok(())
/// # }
/// ```
pub struct WalletKit {
    engine: Arc<Engine>,
}

impl WalletKit {
    /// Builds the kit. When the config names a bridge url the relay
    /// transport is attached and persisted relay sessions resume polling;
    /// when it names an emulation endpoint, previews emulate over HTTP.
    pub fn spawn(
        config: KitConfig,
        wallet: Arc<dyn WalletAdapter>,
        store: Arc<dyn SessionStore>,
    ) -> eyre::Result<Self> {
        Self::assemble(config, wallet, store, None)
    }

    /// [`WalletKit::spawn`] with an explicit emulation client in place of
    /// the HTTP one the config would build.
    pub fn spawn_with_emulation(
        config: KitConfig,
        wallet: Arc<dyn WalletAdapter>,
        store: Arc<dyn SessionStore>,
        emulation: Arc<dyn EmulationClient>,
    ) -> eyre::Result<Self> {
        Self::assemble(config, wallet, store, Some(emulation))
    }

    fn assemble(
        config: KitConfig,
        wallet: Arc<dyn WalletAdapter>,
        store: Arc<dyn SessionStore>,
        emulation: Option<Arc<dyn EmulationClient>>,
    ) -> eyre::Result<Self> {
        let relay = match &config.bridge_url {
            Some(_) => Some(Arc::new(RelayTransport::new()?)),
            None => None,
        };
        let emulation = match emulation {
            Some(client) => Some(client),
            None => match &config.emulation_endpoint {
                Some(endpoint) => {
                    let mut builder = HttpEmulationClient::builder(endpoint.clone());
                    if let Some(key) = &config.emulation_api_key {
                        builder = builder.api_key(key.clone());
                    }
                    Some(Arc::new(builder.build()?) as Arc<dyn EmulationClient>)
                }
                None => None,
            },
        };

        let engine = Engine::new(config, wallet, store, emulation, relay.clone())?;
        if let Some(relay) = relay {
            engine.attach_transport(relay);
            let resuming = Arc::clone(&engine);
            tokio::spawn(async move {
                if let Err(err) = resuming.resume_relay_sessions().await {
                    tracing::warn!(target: "tonnect::kit", %err, "resuming relay sessions failed");
                }
            });
        }
        Ok(Self { engine })
    }

    /// Attaches the frame bus carrying injected dApp pages.
    pub fn attach_injected(&self, bus: Arc<FrameBus>) {
        self.engine.attach_transport(Arc::new(InjectedTransport::new(bus)));
    }

    /// Attaches a reverse-RPC transport over the host's bridge.
    pub fn attach_reverse_rpc<B: HostBridge + 'static>(
        &self,
        transport: Arc<ReverseRpcTransport<B>>,
    ) {
        self.engine.attach_transport(transport);
    }

    /// Attaches any transport implementation.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        self.engine.attach_transport(transport);
    }

    /// Registers the connect-request listener. One listener per event type:
    /// registering again replaces the previous one and invalidates its
    /// subscription.
    pub fn on_connect_request(
        &self,
        listener: impl Fn(ConnectRequestEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.engine.events.subscribe_connect(listener)
    }

    pub fn on_transaction_request(
        &self,
        listener: impl Fn(TransactionRequestEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.engine.events.subscribe_transaction(listener)
    }

    pub fn on_sign_data_request(
        &self,
        listener: impl Fn(SignDataRequestEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.engine.events.subscribe_sign_data(listener)
    }

    pub fn on_disconnect(
        &self,
        listener: impl Fn(DisconnectEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.engine.events.subscribe_disconnect(listener)
    }

    pub fn on_request_error(
        &self,
        listener: impl Fn(RequestErrorEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.engine.events.subscribe_error(listener)
    }

    /// Hands the kit a link the user opened or scanned: a connect link or
    /// a `transfer` deep link. The request surfaces through the matching
    /// event once it is ready to present.
    pub async fn handle_connection_url(&self, url: &str) -> Result<PendingId, KitError> {
        self.engine.handle_connection_url(url).await
    }

    /// Approves a pending connect request and returns the session it
    /// established.
    pub async fn approve_connect(&self, id: PendingId) -> Result<Session, KitError> {
        self.engine.approve_connect(id).await
    }

    /// Rejects a pending connect request, answering the dApp with the given
    /// error or a plain user decline.
    pub async fn reject_connect(
        &self,
        id: PendingId,
        error: Option<WalletError>,
    ) -> Result<(), KitError> {
        self.engine.reject_connect(id, error).await
    }

    /// Approves a pending transaction request. The signed external message
    /// is sent to the dApp and returned for the host to broadcast.
    pub async fn approve_transaction(&self, id: PendingId) -> Result<Boc, KitError> {
        self.engine.approve_transaction(id).await
    }

    pub async fn reject_transaction(
        &self,
        id: PendingId,
        error: Option<WalletError>,
    ) -> Result<(), KitError> {
        self.engine.reject_transaction(id, error).await
    }

    /// Approves a pending sign-data request and returns the signed result
    /// that was sent to the dApp.
    pub async fn approve_sign_data(&self, id: PendingId) -> Result<SignDataResult, KitError> {
        self.engine.approve_sign_data(id).await
    }

    pub async fn reject_sign_data(
        &self,
        id: PendingId,
        error: Option<WalletError>,
    ) -> Result<(), KitError> {
        self.engine.reject_sign_data(id, error).await
    }

    /// Every stored session, in no particular order.
    pub async fn sessions(&self) -> Result<Vec<Session>, KitError> {
        self.engine.list_sessions().await
    }

    /// Ends one session from the wallet side, notifying the dApp.
    pub async fn disconnect(&self, id: &SessionId) -> Result<Session, KitError> {
        self.engine.disconnect(id).await
    }

    /// Ends every session of this wallet, notifying each dApp.
    pub async fn disconnect_all(&self) -> Result<Vec<Session>, KitError> {
        self.engine.disconnect_all().await
    }

    /// A copy of one pending request, if it is still unresolved.
    pub fn pending_request(&self, id: PendingId) -> Option<PendingRequest> {
        self.engine.pending.snapshot(id)
    }

    pub fn pending_count(&self) -> usize {
        self.engine.pending.len()
    }

    pub fn config(&self) -> &KitConfig {
        &self.engine.config
    }
}
