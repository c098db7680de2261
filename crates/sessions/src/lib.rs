//! # tonnect-sessions
//!
//! The session model for established dApp connections and its persistence:
//! a host-pluggable key-value [`storage`] adapter and the [`store`] built on
//! top of it. A session is everything the wallet must remember to keep
//! serving a dApp across restarts, including the transport binding and, for
//! relay connections, the session keys.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod session;
pub mod storage;
pub mod store;

pub use session::{DappInfo, Session, SessionId, SessionKeys, SessionTransport};
pub use storage::{KvStorage, MemoryStorage};
pub use store::{MemorySessionStore, SessionStore, StorageSessionStore, StoreError};
