//! Per-peer duplex byte channels (§4.1). `Transport` is the seam the
//! connection manager drives; production nodes back it with WebRTC data
//! channels, tests back it with an in-memory relay.

use crate::error::TransportError;
use crate::types::DeviceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Events a transport reports back to whoever drives it. Delivered
/// in-order per peer; there is no cross-peer ordering guarantee (§5).
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Open(DeviceId),
    Close(DeviceId),
    Message(DeviceId, Vec<u8>),
}

/// A message-oriented duplex stream per peer, reliable and in-order.
pub trait Transport: Send {
    fn send(&self, peer: &DeviceId, bytes: Vec<u8>) -> Result<(), TransportError>;
    fn close(&self, peer: &DeviceId);
}

/// A deterministic, in-process transport used for tests: every registered
/// peer can reach every other registered peer, messages are delivered
/// via an mpsc queue drained by the caller.
pub struct InMemoryTransport {
    self_id: DeviceId,
    peers: Arc<Mutex<HashMap<DeviceId, mpsc::UnboundedSender<TransportEvent>>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl InMemoryTransport {
    pub fn new(
        self_id: DeviceId,
        peers: Arc<Mutex<HashMap<DeviceId, mpsc::UnboundedSender<TransportEvent>>>>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        peers.lock().unwrap().insert(self_id.clone(), tx.clone());
        (
            Self {
                self_id,
                peers,
                events: tx,
            },
            rx,
        )
    }

    /// Simulates the peer connection opening from both ends.
    pub fn open_with(&self, peer: &DeviceId) {
        let _ = self.events.send(TransportEvent::Open(peer.clone()));
        if let Some(tx) = self.peers.lock().unwrap().get(peer) {
            let _ = tx.send(TransportEvent::Open(self.self_id.clone()));
        }
    }

    pub fn disconnect(&self, peer: &DeviceId) {
        let _ = self.events.send(TransportEvent::Close(peer.clone()));
        if let Some(tx) = self.peers.lock().unwrap().get(peer) {
            let _ = tx.send(TransportEvent::Close(self.self_id.clone()));
        }
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, peer: &DeviceId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let peers = self.peers.lock().unwrap();
        let tx = peers
            .get(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;
        tx.send(TransportEvent::Message(self.self_id.clone(), bytes))
            .map_err(|e| TransportError::SendFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }

    fn close(&self, peer: &DeviceId) {
        self.disconnect(peer);
    }
}
