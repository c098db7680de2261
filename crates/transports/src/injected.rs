//! The injected transport for pages embedded in the wallet.
//!
//! The host registers a [`Frame`] per embedded page. Inbound messages are
//! fed through [`FrameBus::receive`] by the host's webview glue; outbound
//! payloads are broadcast to every live frame, because a reloaded page
//! reappears under a new frame id and would otherwise miss its reply. The
//! dApp side drops messages whose id it does not recognize. Pages reload
//! and repost, so inbound messages are deduplicated by id within a
//! bounded window.

use crate::{
    InboundMessage, Origin, Transport, TransportError, TransportKind, INBOUND_CHANNEL_CAPACITY,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};
use tokio::sync::broadcast;
use tonnect_sessions::SessionTransport;

/// How many inbound message ids the dedup window remembers.
const RECENT_IDS_CAPACITY: usize = 256;

/// One embedded page the host can push payloads into.
pub trait Frame: Send + Sync {
    fn id(&self) -> &str;

    /// Pushes a JSON payload into the page. An error means the page is gone
    /// and the frame will be dropped from the registry.
    fn post(&self, body: &str) -> Result<(), TransportError>;
}

/// Registry of live frames plus the inbound fanout.
pub struct FrameBus {
    frames: Mutex<HashMap<String, Arc<dyn Frame>>>,
    seen: Mutex<RecentIds>,
    inbound: broadcast::Sender<InboundMessage>,
}

impl FrameBus {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            frames: Mutex::new(HashMap::new()),
            seen: Mutex::new(RecentIds::new(RECENT_IDS_CAPACITY)),
            inbound,
        }
    }

    pub fn register(&self, frame: Arc<dyn Frame>) {
        self.frames.lock().insert(frame.id().to_string(), frame);
    }

    /// Returns false when no such frame was registered.
    pub fn unregister(&self, frame_id: &str) -> bool {
        self.frames.lock().remove(frame_id).is_some()
    }

    pub fn frame_ids(&self) -> Vec<String> {
        self.frames.lock().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    /// Feeds one message a page posted. Returns false when the message id
    /// was already seen and the message was dropped.
    pub fn receive(&self, frame_id: &str, message_id: &str, body: impl Into<String>) -> bool {
        if !self.seen.lock().insert(format!("{frame_id}/{message_id}")) {
            tracing::debug!(
                target: "tonnect::injected",
                frame = %frame_id,
                id = %message_id,
                "dropping duplicate frame message"
            );
            return false;
        }
        let message = InboundMessage {
            origin: Origin::Injected { frame_id: frame_id.to_string() },
            body: body.into(),
        };
        let _ = self.inbound.send(message);
        true
    }

    /// Delivers a payload to one frame.
    pub fn post_to(&self, frame_id: &str, body: &str) -> Result<(), TransportError> {
        let frame = self
            .frames
            .lock()
            .get(frame_id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownFrame(frame_id.to_string()))?;
        frame.post(body)
    }

    /// Delivers a payload to every registered frame, dropping frames whose
    /// pages are gone.
    pub fn broadcast(&self, body: &str) {
        let frames: Vec<Arc<dyn Frame>> = self.frames.lock().values().cloned().collect();
        for frame in frames {
            if let Err(err) = frame.post(body) {
                tracing::debug!(
                    target: "tonnect::injected",
                    frame = %frame.id(),
                    %err,
                    "dropping dead frame"
                );
                self.unregister(frame.id());
            }
        }
    }
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-ordered set with a fixed capacity; the oldest id falls out.
struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::with_capacity(capacity), set: HashSet::new() }
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: String) -> bool {
        if self.set.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        self.set.insert(id);
        true
    }
}

/// [`Transport`] over the frame bus.
pub struct InjectedTransport {
    bus: Arc<FrameBus>,
}

impl InjectedTransport {
    pub fn new(bus: Arc<FrameBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<FrameBus> {
        &self.bus
    }
}

#[async_trait]
impl Transport for InjectedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Injected
    }

    fn is_available(&self) -> bool {
        !self.bus.is_empty()
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.bus.subscribe()
    }

    async fn send(&self, binding: &SessionTransport, body: &str) -> Result<(), TransportError> {
        let SessionTransport::Injected { frame_id } = binding else {
            return Err(TransportError::WrongTransport { expected: TransportKind::Injected });
        };
        // The bound frame may have reloaded under a new id, so the reply
        // goes to every frame and the page matches it by message id.
        if self.bus.is_empty() {
            return Err(TransportError::UnknownFrame(frame_id.clone()));
        }
        self.bus.broadcast(body);
        Ok(())
    }
}
