//! Kit configuration.

use tonnect_protocol::{DeviceInfo, Feature, MAX_MESSAGES};
use url::Url;

/// Everything the engine needs to know about its host wallet.
///
/// The default is a usable local-only kit: injected and reverse-RPC
/// connections work, relay connections need [`KitConfig::with_bridge_url`]
/// and transaction previews need [`KitConfig::with_emulation_endpoint`].
#[derive(Clone, Debug)]
pub struct KitConfig {
    /// Announced to every dApp in the `connect` event.
    pub device: DeviceInfo,
    /// The HTTP bridge for relay connections.
    pub bridge_url: Option<Url>,
    /// The trace emulation endpoint for transaction previews.
    pub emulation_endpoint: Option<Url>,
    pub emulation_api_key: Option<String>,
    /// What to do with a transaction request whose emulated money flow
    /// diverges from what it claims.
    pub mismatch_policy: MismatchPolicy,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            bridge_url: None,
            emulation_endpoint: None,
            emulation_api_key: None,
            mismatch_policy: MismatchPolicy::default(),
        }
    }
}

impl KitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    pub fn with_bridge_url(mut self, url: Url) -> Self {
        self.bridge_url = Some(url);
        self
    }

    pub fn with_emulation_endpoint(mut self, url: Url) -> Self {
        self.emulation_endpoint = Some(url);
        self
    }

    pub fn with_emulation_api_key(mut self, key: impl Into<String>) -> Self {
        self.emulation_api_key = Some(key.into());
        self
    }

    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }
}

/// How the engine treats a presented request whose preview verdict is a
/// mismatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Present the request with the mismatch attached and let the host
    /// decide. The default.
    #[default]
    Flag,
    /// Answer the dApp with a decline without presenting the request.
    AutoReject,
}

/// The capabilities this kit version implements, in both the legacy string
/// form and the described object form, since dApps in the wild check both.
fn default_device() -> DeviceInfo {
    DeviceInfo {
        platform: std::env::consts::OS.to_string(),
        app_name: "tonnect".to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        max_protocol_version: 2,
        features: vec![
            Feature::Legacy("SendTransaction".to_string()),
            Feature::Described {
                name: "SendTransaction".to_string(),
                max_messages: Some(MAX_MESSAGES as u32),
            },
            Feature::Legacy("SignData".to_string()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_device_announces_send_transaction_both_ways() {
        let config = KitConfig::default();
        assert_eq!(config.device.max_protocol_version, 2);
        assert!(config
            .device
            .features
            .iter()
            .any(|f| matches!(f, Feature::Legacy(name) if name == "SendTransaction")));
        assert!(config.device.features.iter().any(|f| matches!(
            f,
            Feature::Described { name, max_messages: Some(4) } if name == "SendTransaction"
        )));
    }

    #[test]
    fn builders_fill_the_optional_parts() {
        let config = KitConfig::new()
            .with_bridge_url("https://bridge.example".parse().unwrap())
            .with_emulation_endpoint("https://emulate.example".parse().unwrap())
            .with_emulation_api_key("key")
            .with_mismatch_policy(MismatchPolicy::AutoReject);
        assert!(config.bridge_url.is_some());
        assert!(config.emulation_endpoint.is_some());
        assert_eq!(config.mismatch_policy, MismatchPolicy::AutoReject);
    }
}
