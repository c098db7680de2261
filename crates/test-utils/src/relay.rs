//! An in-process relay bridge.
//!
//! Speaks the same contract the relay transport expects: `GET /messages`
//! long-polls for sealed messages by client id, `POST /message` stores one.
//! Messages are kept until the server drops; delivery cursors are the
//! caller's `after` parameter, as on a production bridge.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Notify, task::JoinHandle, time::Instant};
use url::Url;

const MAX_POLL_WAIT: u64 = 30;

#[derive(Clone, Debug, Serialize)]
struct StoredMessage {
    event_id: u64,
    from: String,
    message: String,
}

#[derive(Serialize)]
struct Batch {
    messages: Vec<StoredMessage>,
}

#[derive(Deserialize)]
struct PollQuery {
    client_id: String,
    #[serde(default)]
    after: u64,
    #[serde(default)]
    wait: u64,
}

#[derive(Deserialize)]
struct StoreQuery {
    client_id: String,
    to: String,
    #[serde(default)]
    #[allow(dead_code)]
    ttl: u64,
}

#[derive(Default)]
struct RelayState {
    next_event_id: AtomicU64,
    inboxes: Mutex<HashMap<String, Vec<StoredMessage>>>,
    notify: Notify,
}

impl RelayState {
    fn push(&self, to: &str, from: &str, message: String) -> u64 {
        let event_id = self.next_event_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inboxes
            .lock()
            .entry(to.to_string())
            .or_default()
            .push(StoredMessage { event_id, from: from.to_string(), message });
        self.notify.notify_waiters();
        event_id
    }

    fn after(&self, client_id: &str, cursor: u64) -> Vec<StoredMessage> {
        self.inboxes
            .lock()
            .get(client_id)
            .map(|inbox| inbox.iter().filter(|m| m.event_id > cursor).cloned().collect())
            .unwrap_or_default()
    }
}

async fn poll(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<PollQuery>,
) -> Json<Batch> {
    let deadline =
        Instant::now() + Duration::from_secs(query.wait.min(MAX_POLL_WAIT));
    loop {
        let messages = state.after(&query.client_id, query.after);
        if !messages.is_empty() {
            return Json(Batch { messages });
        }
        let now = Instant::now();
        if now >= deadline {
            return Json(Batch { messages: Vec::new() });
        }
        tokio::select! {
            _ = state.notify.notified() => {}
            _ = tokio::time::sleep_until(deadline) => {
                return Json(Batch { messages: Vec::new() });
            }
        }
    }
}

async fn store(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<StoreQuery>,
    body: String,
) -> StatusCode {
    state.push(&query.to, &query.client_id, body);
    StatusCode::OK
}

/// A relay bridge bound to an ephemeral local port.
pub struct TestRelay {
    addr: SocketAddr,
    state: Arc<RelayState>,
    server: JoinHandle<()>,
}

impl TestRelay {
    pub async fn spawn() -> Self {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test relay");
        let addr = listener.local_addr().expect("test relay local addr");
        let state = Arc::new(RelayState::default());
        let app = Router::new()
            .route("/messages", get(poll))
            .route("/message", post(store))
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state, server }
    }

    pub fn url(&self) -> Url {
        format!("http://{}", self.addr).parse().expect("test relay url")
    }

    /// Stores a message without going through HTTP.
    pub fn push(&self, to: &str, from: &str, message: String) -> u64 {
        self.state.push(to, from, message)
    }

    /// How many messages sit in a client's inbox, delivered or not.
    pub fn inbox_len(&self, client_id: &str) -> usize {
        self.state.inboxes.lock().get(client_id).map_or(0, Vec::len)
    }

    /// Everything in a client's inbox as `(from, message)` pairs.
    pub fn inbox(&self, client_id: &str) -> Vec<(String, String)> {
        self.state
            .inboxes
            .lock()
            .get(client_id)
            .map(|inbox| inbox.iter().map(|m| (m.from.clone(), m.message.clone())).collect())
            .unwrap_or_default()
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.server.abort();
    }
}
