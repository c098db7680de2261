//! Events a wallet pushes to the dApp outside the request/response cycle.

use crate::{connect::ConnectItemReply, error::WalletError};
use serde::{Deserialize, Serialize};

/// The event envelope: a wallet-scoped monotonic id plus the tagged body.
///
/// Event ids increase across the lifetime of a wallet so a dApp can drop
/// events it has already seen after a reconnect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletEvent {
    pub id: u64,
    #[serde(flatten)]
    pub body: EventBody,
}

/// Event bodies, tagged by the `event` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    Connect(ConnectEventPayload),
    ConnectError(WalletError),
    Disconnect(DisconnectPayload),
}

/// Payload of a successful `connect` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectEventPayload {
    pub items: Vec<ConnectItemReply>,
    pub device: DeviceInfo,
}

/// The disconnect payload is an empty object on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPayload {}

/// Describes the wallet to the dApp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: String,
    pub app_name: String,
    pub app_version: String,
    pub max_protocol_version: u32,
    pub features: Vec<Feature>,
}

/// A wallet capability. Early SDK versions announced bare strings, current
/// ones objects with limits, and dApps in the wild still expect both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    Legacy(String),
    Described {
        name: String,
        #[serde(default, rename = "maxMessages", skip_serializing_if = "Option::is_none")]
        max_messages: Option<u32>,
    },
}
