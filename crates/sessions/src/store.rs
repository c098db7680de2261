//! The session store.
//!
//! Two implementations of the same contract: [`MemorySessionStore`] for
//! tests and ephemeral wallets, [`StorageSessionStore`] persisting every
//! session as one JSON record under a fixed key prefix of the host's
//! [`KvStorage`].

use crate::{
    session::{Session, SessionId},
    storage::KvStorage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};
use tonnect_primitives::WalletId;

const KEY_PREFIX: &str = "tonnect/session/";

/// Errors from session persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage adapter: {0}")]
    Adapter(String),
    #[error("corrupt session record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    fn adapter(err: impl fmt::Display) -> Self {
        Self::Adapter(err.to_string())
    }
}

/// Keeps established sessions, keyed by [`SessionId`].
///
/// `put` overwrites; `remove` returns what was removed so callers can emit
/// a disconnect for it.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn put(&self, session: Session) -> Result<(), StoreError>;
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;
    async fn remove(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;
    async fn list(&self) -> Result<Vec<Session>, StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;

    /// The session bound to a dApp domain. Connect approval keeps at most
    /// one non-injected session per (wallet, domain), so the first match
    /// is the only one.
    async fn get_by_domain(&self, domain: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.list().await?.into_iter().find(|s| s.domain.as_deref() == Some(domain)))
    }

    async fn for_wallet(&self, wallet: &WalletId) -> Result<Vec<Session>, StoreError> {
        Ok(self.list().await?.into_iter().filter(|s| &s.wallet == wallet).collect())
    }

    /// Drops every session of the wallet and returns them so callers can
    /// emit a disconnect for each.
    async fn remove_for_wallet(&self, wallet: &WalletId) -> Result<Vec<Session>, StoreError> {
        let sessions = self.for_wallet(wallet).await?;
        for session in &sessions {
            self.remove(&session.id).await?;
        }
        Ok(sessions)
    }
}

/// Sessions in a map behind a mutex, gone when the process is.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: Session) -> Result<(), StoreError> {
        self.sessions.lock().insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.lock().get(id).cloned())
    }

    async fn remove(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.lock().remove(id))
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.lock().values().cloned().collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.sessions.lock().clear();
        Ok(())
    }
}

/// Sessions serialized through the host's storage adapter, one record per
/// session. Reads go to the adapter every time; the store itself holds no
/// state, so two stores over the same adapter see the same sessions.
pub struct StorageSessionStore<S> {
    storage: Arc<S>,
}

impl<S: KvStorage> StorageSessionStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn key(id: &SessionId) -> String {
        format!("{KEY_PREFIX}{id}")
    }
}

#[async_trait]
impl<S: KvStorage> SessionStore for StorageSessionStore<S> {
    async fn put(&self, session: Session) -> Result<(), StoreError> {
        let value = serde_json::to_string(&session)?;
        self.storage
            .set(&Self::key(&session.id), value)
            .await
            .map_err(StoreError::adapter)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        match self.storage.get(&Self::key(id)).await.map_err(StoreError::adapter)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let existing = self.get(id).await?;
        if existing.is_some() {
            self.storage.remove(&Self::key(id)).await.map_err(StoreError::adapter)?;
        }
        Ok(existing)
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let keys = self.storage.keys(KEY_PREFIX).await.map_err(StoreError::adapter)?;
        let mut sessions = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.storage.get(&key).await.map_err(StoreError::adapter)? {
                sessions.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(sessions)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        for key in self.storage.keys(KEY_PREFIX).await.map_err(StoreError::adapter)? {
            self.storage.remove(&key).await.map_err(StoreError::adapter)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{session::tests::sample_session, storage::MemoryStorage};
    use tonnect_primitives::{Network, TonAddress};

    async fn exercise_store(store: &dyn SessionStore) {
        store.put(sample_session("one")).await.unwrap();
        store.put(sample_session("two")).await.unwrap();

        let got = store.get(&SessionId::from("one")).await.unwrap();
        assert_eq!(got, Some(sample_session("one")));
        assert_eq!(store.get(&SessionId::from("missing")).await.unwrap(), None);

        let mut ids: Vec<_> =
            store.list().await.unwrap().into_iter().map(|s| s.id.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["one".to_string(), "two".to_string()]);

        let removed = store.remove(&SessionId::from("one")).await.unwrap();
        assert_eq!(removed, Some(sample_session("one")));
        assert_eq!(store.remove(&SessionId::from("one")).await.unwrap(), None);

        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_contract() {
        exercise_store(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn storage_store_contract() {
        let store = StorageSessionStore::new(Arc::new(MemoryStorage::new()));
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn storage_stores_share_the_adapter() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = StorageSessionStore::new(Arc::clone(&storage));
        writer.put(sample_session("shared")).await.unwrap();

        let reader = StorageSessionStore::new(storage);
        let got = reader.get(&SessionId::from("shared")).await.unwrap();
        assert_eq!(got, Some(sample_session("shared")));
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = MemorySessionStore::new();
        let mut session = sample_session("s");
        store.put(session.clone()).await.unwrap();
        session.issue_event_id();
        store.put(session.clone()).await.unwrap();
        assert_eq!(store.get(&session.id).await.unwrap().unwrap().next_event_id, 1);
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(&format!("{KEY_PREFIX}bad"), "not json".into()).await.unwrap();
        let store = StorageSessionStore::new(storage);
        assert!(matches!(
            store.get(&SessionId::from("bad")).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    fn session_for(id: &str, wallet: WalletId, domain: &str) -> Session {
        Session { wallet, domain: Some(domain.into()), ..sample_session(id) }
    }

    fn other_wallet() -> WalletId {
        WalletId::new(Network::Testnet, TonAddress::ZERO)
    }

    #[tokio::test]
    async fn domain_lookup_finds_the_unique_session() {
        let store = MemorySessionStore::new();
        let wallet = sample_session("x").wallet;
        store.put(session_for("a", wallet.clone(), "app.example")).await.unwrap();
        store.put(session_for("b", wallet, "other.example")).await.unwrap();

        let found = store.get_by_domain("app.example").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(SessionId::from("a")));
        assert_eq!(store.get_by_domain("unknown.example").await.unwrap(), None);
    }

    #[tokio::test]
    async fn wallet_lookup_filters_other_wallets() {
        let store = MemorySessionStore::new();
        let mine = sample_session("x").wallet;
        store.put(session_for("a", mine.clone(), "app.example")).await.unwrap();
        store.put(session_for("b", mine.clone(), "other.example")).await.unwrap();
        store.put(session_for("c", other_wallet(), "third.example")).await.unwrap();

        let mut ids: Vec<_> =
            store.for_wallet(&mine).await.unwrap().into_iter().map(|s| s.id.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn removing_for_a_wallet_returns_the_removed_sessions() {
        let store = StorageSessionStore::new(Arc::new(MemoryStorage::new()));
        let mine = sample_session("x").wallet;
        store.put(session_for("a", mine.clone(), "app.example")).await.unwrap();
        store.put(session_for("c", other_wallet(), "third.example")).await.unwrap();

        let removed = store.remove_for_wallet(&mine).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, SessionId::from("a"));
        assert!(store.for_wallet(&mine).await.unwrap().is_empty());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_leaves_every_wallet_without_sessions() {
        let store = MemorySessionStore::new();
        let mine = sample_session("x").wallet;
        store.put(session_for("a", mine.clone(), "app.example")).await.unwrap();
        store.put(session_for("c", other_wallet(), "third.example")).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.for_wallet(&mine).await.unwrap().is_empty());
        assert!(store.for_wallet(&other_wallet()).await.unwrap().is_empty());
    }
}
