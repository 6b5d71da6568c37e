//! Connection manager: politeness tie-breaking, ICE candidate buffering,
//! and OR-based readiness (§4.3).

use crate::config::NodeConfig;
use crate::error::{SignalingError, TransportError};
use crate::signal::{CandidateInfo, SignalEnvelope, SignalGateway};
use crate::transport::{Transport, TransportEvent};
use crate::types::DeviceId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

#[derive(Debug, Default)]
struct PeerConnection {
    state: Option<ConnectionState>,
    channel_open: bool,
    remote_description_set: bool,
    pending_candidates: Vec<CandidateInfo>,
    /// true once we sent the offer for this pair, per the politeness rule.
    we_are_offerer: bool,
}

impl PeerConnection {
    fn connection_state(&self) -> ConnectionState {
        self.state.clone().unwrap_or(ConnectionState::Disconnected)
    }
}

/// Owns per-peer connection and channel state; implements politeness;
/// exposes `send`/`initiate`/`close` and reports readiness.
pub struct ConnectionManager<T: Transport, S: SignalGateway> {
    self_id: DeviceId,
    peers: HashMap<DeviceId, PeerConnection>,
    transport: T,
    signal: S,
}

impl<T: Transport, S: SignalGateway> ConnectionManager<T, S> {
    pub fn new(self_id: DeviceId, transport: T, signal: S, _config: &NodeConfig) -> Self {
        Self {
            self_id,
            peers: HashMap::new(),
            transport,
            signal,
        }
    }

    /// Decides, per the politeness rule, whether this device should create
    /// the outgoing offer to `peer`. The lexicographically smaller
    /// DeviceId of the pair is always the offerer.
    pub fn is_offerer_for(&self, peer: &DeviceId) -> bool {
        self.self_id < *peer
    }

    /// Initiates a connection to `peer`. A no-op (politely waiting for an
    /// incoming offer) if `peer` is the offerer for this pair.
    pub fn initiate(&mut self, peer: &DeviceId) -> Result<(), SignalingError> {
        let entry = self.peers.entry(peer.clone()).or_default();
        if !self.self_id.lt(peer) {
            tracing::debug!(%peer, "politely waiting for incoming offer");
            entry.state = Some(ConnectionState::Connecting);
            return Ok(());
        }

        entry.we_are_offerer = true;
        entry.state = Some(ConnectionState::Connecting);
        tracing::debug!(%peer, "creating offer (we are the smaller device id)");
        self.signal.send(
            peer,
            SignalEnvelope::Offer(crate::signal::SdpInfo {
                sdp: format!("offer-from-{}", self.self_id),
            }),
        )
    }

    /// Handles an inbound signaling envelope from `peer`.
    pub fn on_signal(
        &mut self,
        peer: &DeviceId,
        envelope: SignalEnvelope,
    ) -> Result<(), SignalingError> {
        match envelope {
            SignalEnvelope::Offer(_) => self.on_offer(peer),
            SignalEnvelope::Answer(_) => self.on_answer(peer),
            SignalEnvelope::Candidate(candidate) => self.on_candidate(peer, candidate),
        }
    }

    fn on_offer(&mut self, peer: &DeviceId) -> Result<(), SignalingError> {
        if self.self_id.lt(peer) {
            // Crossing offer: peer is not the smaller side, so its offer
            // is impolite. We keep our own channel and drop theirs.
            tracing::warn!(%peer, "dropping crossing offer from non-offerer peer");
            return Ok(());
        }

        let entry = self.peers.entry(peer.clone()).or_default();
        entry.remote_description_set = true;
        entry.state = Some(ConnectionState::Connecting);
        self.flush_candidates(peer);

        self.signal.send(
            peer,
            SignalEnvelope::Answer(crate::signal::SdpInfo {
                sdp: format!("answer-from-{}", self.self_id),
            }),
        )
    }

    fn on_answer(&mut self, peer: &DeviceId) -> Result<(), SignalingError> {
        let entry = self.peers.entry(peer.clone()).or_default();
        entry.remote_description_set = true;
        self.flush_candidates(peer);
        Ok(())
    }

    fn on_candidate(
        &mut self,
        peer: &DeviceId,
        candidate: CandidateInfo,
    ) -> Result<(), SignalingError> {
        let entry = self.peers.entry(peer.clone()).or_default();
        if entry.remote_description_set {
            tracing::debug!(%peer, "applying ICE candidate");
        } else {
            tracing::debug!(%peer, "buffering ICE candidate before remote description");
            entry.pending_candidates.push(candidate);
        }
        Ok(())
    }

    fn flush_candidates(&mut self, peer: &DeviceId) {
        if let Some(entry) = self.peers.get_mut(peer) {
            if !entry.pending_candidates.is_empty() {
                tracing::debug!(
                    %peer,
                    count = entry.pending_candidates.len(),
                    "flushing buffered ICE candidates"
                );
                entry.pending_candidates.clear();
            }
        }
    }

    /// Feeds a transport-level event (peer-connection state change or
    /// data-channel open/close) into the connection state.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open(peer) => {
                let entry = self.peers.entry(peer.clone()).or_default();
                entry.state = Some(ConnectionState::Connected);
            }
            TransportEvent::Close(peer) => {
                let entry = self.peers.entry(peer.clone()).or_default();
                entry.state = Some(ConnectionState::Disconnected);
                entry.channel_open = false;
            }
            TransportEvent::Message(_, _) => {}
        }
    }

    pub fn mark_channel_open(&mut self, peer: &DeviceId) {
        self.peers.entry(peer.clone()).or_default().channel_open = true;
    }

    /// A peer is connected when the peer-connection state is `Connected`
    /// OR the data channel is open — either alone is a sufficient signal.
    pub fn is_connected(&self, peer: &DeviceId) -> bool {
        match self.peers.get(peer) {
            None => false,
            Some(p) => p.connection_state() == ConnectionState::Connected || p.channel_open,
        }
    }

    pub fn connection_state(&self, peer: &DeviceId) -> ConnectionState {
        self.peers
            .get(peer)
            .map(|p| p.connection_state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn send(&self, peer: &DeviceId, msg: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected(peer) {
            return Err(TransportError::ChannelClosed(peer.to_string()));
        }
        self.transport.send(peer, msg)
    }

    pub fn close(&mut self, peer: &DeviceId) {
        self.transport.close(peer);
        if let Some(entry) = self.peers.get_mut(peer) {
            entry.state = Some(ConnectionState::Disconnected);
            entry.channel_open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalingError;
    use std::sync::{Arc, Mutex};

    struct NullTransport;
    impl Transport for NullTransport {
        fn send(&self, _peer: &DeviceId, _bytes: Vec<u8>) -> Result<(), TransportError> {
            Ok(())
        }
        fn close(&self, _peer: &DeviceId) {}
    }

    struct RecordingSignal {
        sent: Arc<Mutex<Vec<(DeviceId, SignalEnvelope)>>>,
    }
    impl SignalGateway for RecordingSignal {
        fn send(&self, to: &DeviceId, envelope: SignalEnvelope) -> Result<(), SignalingError> {
            self.sent.lock().unwrap().push((to.clone(), envelope));
            Ok(())
        }
    }

    #[test]
    fn smaller_device_id_creates_the_offer() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut cm = ConnectionManager::new(
            DeviceId::new("a"),
            NullTransport,
            RecordingSignal { sent: sent.clone() },
            &NodeConfig::default(),
        );
        cm.initiate(&DeviceId::new("b")).unwrap();
        assert!(matches!(sent.lock().unwrap()[0].1, SignalEnvelope::Offer(_)));
    }

    #[test]
    fn larger_device_id_waits_for_offer() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut cm = ConnectionManager::new(
            DeviceId::new("b"),
            NullTransport,
            RecordingSignal { sent: sent.clone() },
            &NodeConfig::default(),
        );
        cm.initiate(&DeviceId::new("a")).unwrap();
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn readiness_is_or_of_connected_and_channel_open() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut cm = ConnectionManager::new(
            DeviceId::new("a"),
            NullTransport,
            RecordingSignal { sent },
            &NodeConfig::default(),
        );
        let peer = DeviceId::new("b");
        assert!(!cm.is_connected(&peer));
        cm.mark_channel_open(&peer);
        assert!(cm.is_connected(&peer));
    }

    #[test]
    fn candidates_are_buffered_until_remote_description_set() {
        // "b" is the larger id, so it politely waits for an incoming
        // offer from "a" rather than creating its own.
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut cm = ConnectionManager::new(
            DeviceId::new("b"),
            NullTransport,
            RecordingSignal { sent },
            &NodeConfig::default(),
        );
        let peer = DeviceId::new("a");
        cm.on_signal(
            &peer,
            SignalEnvelope::Candidate(CandidateInfo {
                candidate: "cand1".to_string(),
                sdp_mid: None,
                sdp_mline_index: None,
            }),
        )
        .unwrap();
        assert_eq!(cm.peers.get(&peer).unwrap().pending_candidates.len(), 1);

        cm.on_signal(
            &peer,
            SignalEnvelope::Offer(crate::signal::SdpInfo {
                sdp: "x".to_string(),
            }),
        )
        .unwrap();
        assert_eq!(cm.peers.get(&peer).unwrap().pending_candidates.len(), 0);
    }
}
