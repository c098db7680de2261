//! # tonnect-test-utils
//!
//! Fixtures shared by the integration tests: an in-process relay bridge
//! speaking the same HTTP contract as a production bridge, a manifest host,
//! a deterministic ed25519 wallet, and canned emulation clients.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod emulation;
pub mod manifest;
pub mod relay;
pub mod wallet;

pub use emulation::{single_transfer_trace, FailingEmulation, FixedEmulation, RecordingEmulation};
pub use manifest::{sample_manifest, ManifestServer};
pub use relay::TestRelay;
pub use wallet::TestWallet;

/// Initializes tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
