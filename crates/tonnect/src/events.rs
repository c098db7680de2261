//! Host-facing event dispatch.
//!
//! Exactly one listener per event type: registering a new one replaces the
//! old and invalidates its [`Subscription`], so a host rebuilding its UI
//! cannot end up presenting the same request twice. Handlers run on the
//! engine task; hosts that need to do real work forward into a channel.

use crate::{
    preview::Preview,
    requests::PendingId,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tonnect_protocol::{AppManifest, ConnectItem, SignDataPayload, TransactionRequest, WalletError};
use tonnect_sessions::{Session, SessionId};
use tonnect_transports::TransportKind;

/// A dApp wants to connect.
#[derive(Clone, Debug)]
pub struct ConnectRequestEvent {
    pub id: PendingId,
    /// The fetched manifest, already validated.
    pub manifest: AppManifest,
    /// The items the dApp asked for, unknown ones included.
    pub items: Vec<ConnectItem>,
    pub transport: TransportKind,
}

/// A transaction request is ready to present, preview attached.
#[derive(Clone, Debug)]
pub struct TransactionRequestEvent {
    pub id: PendingId,
    /// `None` for transfer links, which arrive outside any session.
    pub session: Option<Session>,
    pub request: TransactionRequest,
    pub preview: Preview,
}

/// A dApp asks for a signature over arbitrary data.
#[derive(Clone, Debug)]
pub struct SignDataRequestEvent {
    pub id: PendingId,
    pub session: Option<Session>,
    pub payload: SignDataPayload,
}

/// A session ended, by either side.
#[derive(Clone, Debug)]
pub struct DisconnectEvent {
    pub session: Session,
}

/// A request failed before it could be presented. The dApp has already
/// been answered where a reply path existed; this is for host-side logging
/// and diagnostics.
#[derive(Clone, Debug)]
pub struct RequestErrorEvent {
    pub session_id: Option<SessionId>,
    pub error: WalletError,
}

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// One listener slot. The token tells a stale subscription from the live
/// one after a replacement.
struct Slot<T> {
    entry: Mutex<Option<(u64, Handler<T>)>>,
}

impl<T> Slot<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self { entry: Mutex::new(None) })
    }

    fn set(&self, token: u64, handler: Handler<T>) {
        *self.entry.lock() = Some((token, handler));
    }

    /// Clones the handler out of the lock so emission never runs user code
    /// while holding it.
    fn get(&self) -> Option<Handler<T>> {
        self.entry.lock().as_ref().map(|(_, handler)| Arc::clone(handler))
    }
}

/// Type-erased view of a slot, for subscriptions.
trait AnySlot: Send + Sync {
    /// Clears the slot if `token` is still the registered listener.
    fn clear(&self, token: u64) -> bool;

    fn is_active(&self, token: u64) -> bool;
}

impl<T: 'static> AnySlot for Slot<T> {
    fn clear(&self, token: u64) -> bool {
        let mut entry = self.entry.lock();
        match &*entry {
            Some((current, _)) if *current == token => {
                *entry = None;
                true
            }
            _ => false,
        }
    }

    fn is_active(&self, token: u64) -> bool {
        matches!(&*self.entry.lock(), Some((current, _)) if *current == token)
    }
}

/// Handle for one registered listener.
///
/// Dropping it does nothing; the listener stays until it is replaced or
/// explicitly unsubscribed.
pub struct Subscription {
    token: u64,
    slot: Weak<dyn AnySlot>,
}

impl Subscription {
    /// Removes the listener. Returns false when it was already replaced or
    /// the registry is gone.
    pub fn unsubscribe(&self) -> bool {
        self.slot.upgrade().is_some_and(|slot| slot.clear(self.token))
    }

    /// Whether this subscription is still the registered listener.
    pub fn is_active(&self) -> bool {
        self.slot.upgrade().is_some_and(|slot| slot.is_active(self.token))
    }
}

/// The five listener slots of an engine.
pub(crate) struct EventRegistry {
    next_token: AtomicU64,
    connect: Arc<Slot<ConnectRequestEvent>>,
    transaction: Arc<Slot<TransactionRequestEvent>>,
    sign_data: Arc<Slot<SignDataRequestEvent>>,
    disconnect: Arc<Slot<DisconnectEvent>>,
    error: Arc<Slot<RequestErrorEvent>>,
}

macro_rules! slot_accessors {
    ($subscribe:ident, $emit:ident, $field:ident, $event:ty) => {
        pub(crate) fn $subscribe(
            &self,
            listener: impl Fn($event) + Send + Sync + 'static,
        ) -> Subscription {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
            self.$field.set(token, Arc::new(listener));
            let slot: Weak<dyn AnySlot> = Arc::<Slot<$event>>::downgrade(&self.$field);
            Subscription { token, slot }
        }

        /// Returns whether a listener was there to take the event.
        pub(crate) fn $emit(&self, event: $event) -> bool {
            match self.$field.get() {
                Some(handler) => {
                    handler(event);
                    true
                }
                None => false,
            }
        }
    };
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_token: AtomicU64::new(0),
            connect: Slot::new(),
            transaction: Slot::new(),
            sign_data: Slot::new(),
            disconnect: Slot::new(),
            error: Slot::new(),
        }
    }

    slot_accessors!(subscribe_connect, emit_connect, connect, ConnectRequestEvent);
    slot_accessors!(subscribe_transaction, emit_transaction, transaction, TransactionRequestEvent);
    slot_accessors!(subscribe_sign_data, emit_sign_data, sign_data, SignDataRequestEvent);
    slot_accessors!(subscribe_disconnect, emit_disconnect, disconnect, DisconnectEvent);
    slot_accessors!(subscribe_error, emit_error, error, RequestErrorEvent);
}
