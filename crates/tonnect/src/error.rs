//! Kit-level errors.

use crate::{
    intents::IntentError,
    requests::{ActionKind, PendingId, TakeError},
};
use tonnect_protocol::WalletError;
use tonnect_sessions::{SessionId, StoreError};
use tonnect_transports::{TransportError, TransportKind};

/// Everything a kit operation can fail with.
///
/// Wire-level declines travel the other way: when an inbound request is
/// answered with a protocol error, the kit call itself succeeds. `KitError`
/// is for the host's own calls going wrong.
#[derive(Debug, thiserror::Error)]
pub enum KitError {
    #[error("request {0} is unknown or already resolved")]
    UnknownRequest(PendingId),
    #[error("request {id} is a {actual} request, not {expected}")]
    WrongKind { id: PendingId, actual: ActionKind, expected: ActionKind },
    #[error("transaction request expired before approval")]
    Expired,
    #[error("request {0} has no transport to answer on")]
    NoReplyPath(PendingId),
    #[error("no session {0}")]
    UnknownSession(SessionId),
    #[error("no bridge url configured, relay connections are unavailable")]
    BridgeNotConfigured,
    #[error("the {0} transport is not attached")]
    NoTransport(TransportKind),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error(transparent)]
    Protocol(#[from] WalletError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error("wallet adapter failed: {0}")]
    Adapter(String),
}

impl KitError {
    /// Adapters report through eyre; the report text is all that crosses
    /// the boundary.
    pub(crate) fn adapter(err: eyre::Report) -> Self {
        Self::Adapter(format!("{err:#}"))
    }

    pub(crate) fn from_take(id: PendingId, expected: ActionKind) -> impl FnOnce(TakeError) -> Self {
        move |err| match err {
            TakeError::Unknown => Self::UnknownRequest(id),
            TakeError::WrongKind(actual) => Self::WrongKind { id, actual, expected },
        }
    }
}
