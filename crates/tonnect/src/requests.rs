//! The table of requests awaiting a host decision.
//!
//! Every inbound request and parsed link becomes one entry here, keyed by
//! a [`PendingId`] the engine hands to the host. Resolution goes through
//! [`PendingRequests::take`], which removes the entry under the lock, so a
//! request can be approved or rejected exactly once no matter how many
//! tasks race for it.

use parking_lot::Mutex;
use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use tonnect_protocol::{AppManifest, ConnectRequest, RequestId, SignDataPayload, TransactionRequest};
use tonnect_sessions::{SessionId, SessionTransport};

/// Engine-local identifier of a pending request. Distinct from the wire
/// [`RequestId`], which the dApp assigns and which local intents lack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingId(pub u64);

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Decoded and accepted, nothing shown yet.
    Received,
    /// The preview pipeline is running.
    Previewing,
    /// In front of the host, waiting for a decision.
    Presented,
}

/// What the host is being asked to decide.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingAction {
    Connect { request: ConnectRequest, manifest: AppManifest },
    Transaction { request: TransactionRequest },
    SignData { payload: SignDataPayload },
}

impl PendingAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Connect { .. } => ActionKind::Connect,
            Self::Transaction { .. } => ActionKind::Transaction,
            Self::SignData { .. } => ActionKind::SignData,
        }
    }
}

/// The kind of a pending action, for mismatched-call errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Connect,
    Transaction,
    SignData,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Transaction => "transaction",
            Self::SignData => "sign-data",
        })
    }
}

/// One request waiting for the host.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRequest {
    pub id: PendingId,
    /// The dApp's request id; `None` for locally parsed links.
    pub wire_id: Option<RequestId>,
    /// The session the request arrived on, if one exists yet.
    pub session_id: Option<SessionId>,
    /// Where replies go. `None` for transfer links, which have no peer.
    pub binding: Option<SessionTransport>,
    /// Unix seconds.
    pub received_at: u64,
    pub state: RequestState,
    pub action: PendingAction,
}

/// Why [`PendingRequests::take`] refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TakeError {
    /// No entry under that id, either never inserted or already resolved.
    Unknown,
    /// The entry exists but is a different kind of request; it stays put.
    WrongKind(ActionKind),
}

#[derive(Default)]
pub struct PendingRequests {
    next: AtomicU64,
    entries: Mutex<HashMap<PendingId, PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        wire_id: Option<RequestId>,
        session_id: Option<SessionId>,
        binding: Option<SessionTransport>,
        action: PendingAction,
    ) -> PendingId {
        let id = PendingId(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        let request = PendingRequest {
            id,
            wire_id,
            session_id,
            binding,
            received_at: unix_now(),
            state: RequestState::Received,
            action,
        };
        self.entries.lock().insert(id, request);
        id
    }

    /// Returns false when the entry is gone.
    pub fn set_state(&self, id: PendingId, state: RequestState) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Removes and returns the entry, checking the kind first. A wrong-kind
    /// call leaves the entry pending so the right call can still resolve it.
    pub fn take(&self, id: PendingId, kind: ActionKind) -> Result<PendingRequest, TakeError> {
        match self.entries.lock().entry(id) {
            Entry::Occupied(entry) if entry.get().action.kind() == kind => Ok(entry.remove()),
            Entry::Occupied(entry) => Err(TakeError::WrongKind(entry.get().action.kind())),
            Entry::Vacant(_) => Err(TakeError::Unknown),
        }
    }

    /// A copy of the entry, for inspection without resolving it.
    pub fn snapshot(&self, id: PendingId) -> Option<PendingRequest> {
        self.entries.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Seconds since the epoch, clamped to zero on a clock before 1970.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
