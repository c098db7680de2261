//! Links the host hands to the kit.
//!
//! Two shapes reach a wallet from QR codes and deep links: connect links
//! carrying `v`, `id` and `r` query parameters under any scheme, and
//! `transfer` links naming a destination with optional amount, comment,
//! binary body and state init. Everything else is not for this kit.

use std::sync::Arc;
use tonnect_primitives::{AddressError, Boc, BocError, Cell, Coins, TonAddress};
use tonnect_protocol::{ConnectRequest, TransactionMessage, TransactionRequest};
use url::Url;

/// Longest comment that fits one cell body after the 32-bit text opcode.
const MAX_COMMENT_BYTES: usize = 123;

/// A parsed link.
#[derive(Clone, Debug)]
pub enum Intent {
    Connect(ConnectIntent),
    Transfer(TransferIntent),
}

/// A dApp asking to connect through the relay bridge.
#[derive(Clone, Debug)]
pub struct ConnectIntent {
    /// The dApp's client id on the bridge, which doubles as its session
    /// public key.
    pub dapp_client_id: String,
    pub request: ConnectRequest,
    /// The dApp's return strategy, passed through for the host to act on.
    pub ret: Option<String>,
}

/// A `transfer` deep link.
#[derive(Clone, Debug)]
pub struct TransferIntent {
    pub address: TonAddress,
    pub amount: Option<Coins>,
    /// The text comment, kept for display; `payload` carries its cell.
    pub comment: Option<String>,
    pub payload: Option<Boc>,
    pub state_init: Option<Boc>,
}

impl TransferIntent {
    /// The transaction request this link previews as. Amountless links
    /// become zero-value transfers the host can still inspect.
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest {
            valid_until: None,
            network: None,
            from: None,
            messages: vec![TransactionMessage {
                address: self.address,
                amount: self.amount.unwrap_or(Coins::ZERO),
                payload: self.payload.clone(),
                state_init: self.state_init.clone(),
                mode: None,
                extra_currency: None,
            }],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("not a connection or transfer url")]
    Unrecognized,
    #[error("malformed url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported connect protocol version {0:?}")]
    UnsupportedVersion(String),
    #[error("connect url is missing the {0} parameter")]
    MissingParameter(&'static str),
    #[error("malformed connect request payload: {0}")]
    Request(#[from] serde_json::Error),
    #[error("bad destination address: {0}")]
    Address(#[from] AddressError),
    #[error("bad {name} parameter: {reason}")]
    Parameter { name: &'static str, reason: String },
    #[error("comment cell build failed: {0}")]
    Cell(#[from] BocError),
    #[error("transfer comment is {0} bytes, at most {MAX_COMMENT_BYTES} fit a single cell")]
    CommentTooLong(usize),
    #[error("transfer link carries both a text comment and a binary body")]
    ConflictingBody,
}

/// Classifies a link. Connect parameters are checked before transfer paths
/// so a malformed connect link errors instead of being misread.
pub fn parse_url(raw: &str) -> Result<Intent, IntentError> {
    let url = Url::parse(raw.trim())?;
    if let Some(connect) = try_connect(&url)? {
        return Ok(Intent::Connect(connect));
    }
    if let Some(transfer) = try_transfer(&url)? {
        return Ok(Intent::Transfer(transfer));
    }
    Err(IntentError::Unrecognized)
}

fn try_connect(url: &Url) -> Result<Option<ConnectIntent>, IntentError> {
    let mut version = None;
    let mut id = None;
    let mut request = None;
    let mut ret = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "v" => version = Some(value.into_owned()),
            "id" => id = Some(value.into_owned()),
            "r" => request = Some(value.into_owned()),
            "ret" => ret = Some(value.into_owned()),
            _ => {}
        }
    }
    if version.is_none() && id.is_none() && request.is_none() {
        return Ok(None);
    }

    let version = version.ok_or(IntentError::MissingParameter("v"))?;
    if version != "2" {
        return Err(IntentError::UnsupportedVersion(version));
    }
    let dapp_client_id = id.ok_or(IntentError::MissingParameter("id"))?;
    match hex::decode(&dapp_client_id) {
        Ok(bytes) if bytes.len() == 32 => {}
        _ => {
            return Err(IntentError::Parameter {
                name: "id",
                reason: "expected a 32-byte hex client id".to_string(),
            })
        }
    }
    let request: ConnectRequest =
        serde_json::from_str(&request.ok_or(IntentError::MissingParameter("r"))?)?;
    Ok(Some(ConnectIntent { dapp_client_id, request, ret }))
}

fn try_transfer(url: &Url) -> Result<Option<TransferIntent>, IntentError> {
    let Some(target) = transfer_target(url) else {
        return Ok(None);
    };
    let address: TonAddress = target.parse()?;

    let mut amount = None;
    let mut comment = None;
    let mut bin = None;
    let mut state_init = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "amount" => {
                let nano = value.parse::<u128>().map_err(|e| IntentError::Parameter {
                    name: "amount",
                    reason: e.to_string(),
                })?;
                amount = Some(Coins::from_nano(nano));
            }
            "text" => comment = Some(value.into_owned()),
            "bin" => {
                bin = Some(Boc::from_base64(&value).map_err(|e| IntentError::Parameter {
                    name: "bin",
                    reason: e.to_string(),
                })?);
            }
            "init" => {
                state_init =
                    Some(Boc::from_base64(&value).map_err(|e| IntentError::Parameter {
                        name: "init",
                        reason: e.to_string(),
                    })?);
            }
            _ => {}
        }
    }

    if comment.is_some() && bin.is_some() {
        return Err(IntentError::ConflictingBody);
    }
    let payload = match (&comment, bin) {
        (Some(text), _) => Some(comment_cell(text)?),
        (None, Some(boc)) => Some(boc),
        (None, None) => None,
    };
    Ok(Some(TransferIntent { address, amount, comment, payload, state_init }))
}

/// The address segment of a transfer link, or `None` when the url is not
/// one. Covers `ton://transfer/<addr>` and `<scheme>://<host>/transfer/<addr>`.
fn transfer_target(url: &Url) -> Option<String> {
    let segments: Vec<&str> =
        url.path_segments().map(|s| s.filter(|p| !p.is_empty()).collect()).unwrap_or_default();
    if url.host_str() == Some("transfer") {
        return segments.first().map(|s| (*s).to_string());
    }
    match segments.as_slice() {
        ["transfer", address] => Some((*address).to_string()),
        _ => None,
    }
}

/// A standard text comment cell: a zero opcode followed by the UTF-8 bytes.
fn comment_cell(text: &str) -> Result<Boc, IntentError> {
    if text.len() > MAX_COMMENT_BYTES {
        return Err(IntentError::CommentTooLong(text.len()));
    }
    let mut builder = Cell::builder();
    builder.store_u32(0)?;
    builder.store_raw(text.as_bytes(), text.len() * 8)?;
    Ok(Boc::from_root(&Arc::new(builder.build()))?)
}
