//! The dApp manifest, fetched from `manifestUrl` during connection.

use serde::{Deserialize, Serialize};

/// Self-description a dApp hosts at a public URL. Name and icon are what the
/// wallet shows in the connection prompt, so a manifest missing either must
/// be treated as a content error, not silently defaulted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub url: String,
    pub name: String,
    pub icon_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_use_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
}

impl AppManifest {
    /// Host part of the dApp url, used for the proof domain and for
    /// at-a-glance display next to the name.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url).ok().and_then(|u| u.host_str().map(str::to_string))
    }
}
