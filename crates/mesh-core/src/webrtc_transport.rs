//! Production `Transport` backed by real WebRTC data channels. Grounded on
//! a conventional webrtc-rs peer-connection bookkeeping pattern; the
//! politeness/ICE-buffering logic itself lives in `connection::ConnectionManager`
//! and is transport-agnostic, so this module only wires data-channel
//! open/message/close events onto the same `TransportEvent` channel the
//! in-memory test double uses.

use crate::config::{NodeConfig, FROST_CHANNEL_LABEL};
use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use crate::types::DeviceId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

pub struct WebRtcTransport {
    self_id: DeviceId,
    channels: Arc<Mutex<HashMap<DeviceId, Arc<RTCDataChannel>>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl WebRtcTransport {
    pub fn new(self_id: DeviceId) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                self_id,
                channels: Arc::new(Mutex::new(HashMap::new())),
                events: tx,
            },
            rx,
        )
    }

    fn ice_config(config: &NodeConfig) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// Builds a fresh peer connection for `peer` using the API's default
    /// media engine/registry (this workspace only needs data channels).
    pub async fn new_peer_connection(
        &self,
        config: &NodeConfig,
    ) -> Result<Arc<RTCPeerConnection>, TransportError> {
        let api = APIBuilder::new().build();
        let pc = api
            .new_peer_connection(Self::ice_config(config))
            .await
            .map_err(|e| TransportError::SendFailed {
                peer: "peer-connection".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(pc))
    }

    /// Creates the FROST data channel on a locally-initiated connection and
    /// wires its callbacks. Called only by the offerer (§4.3 politeness).
    pub async fn create_data_channel(
        &self,
        peer: DeviceId,
        pc: &RTCPeerConnection,
    ) -> Result<(), TransportError> {
        let channel = pc
            .create_data_channel(FROST_CHANNEL_LABEL, Some(RTCDataChannelInit::default()))
            .await
            .map_err(|e| TransportError::SendFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        self.wire_channel(peer, channel).await;
        Ok(())
    }

    /// Registers an inbound channel the answering side received via
    /// `on_data_channel`. Rejects any channel not opened under the fixed
    /// FROST label (§4.3 "channels with any other label are rejected").
    pub async fn register_inbound_channel(
        &self,
        peer: DeviceId,
        channel: Arc<RTCDataChannel>,
    ) -> Result<(), TransportError> {
        if channel.label() != FROST_CHANNEL_LABEL {
            let label = channel.label().to_string();
            tracing::warn!(%peer, %label, "rejecting inbound channel with unexpected label");
            return Err(TransportError::SendFailed {
                peer: peer.to_string(),
                reason: format!("unexpected channel label {label}"),
            });
        }
        self.wire_channel(peer, channel).await;
        Ok(())
    }

    async fn wire_channel(&self, peer: DeviceId, channel: Arc<RTCDataChannel>) {
        let events_open = self.events.clone();
        let peer_open = peer.clone();
        channel.on_open(Box::new(move || {
            let _ = events_open.send(TransportEvent::Open(peer_open.clone()));
            Box::pin(async {})
        }));

        let events_close = self.events.clone();
        let peer_close = peer.clone();
        channel.on_close(Box::new(move || {
            let _ = events_close.send(TransportEvent::Close(peer_close.clone()));
            Box::pin(async {})
        }));

        let events_message = self.events.clone();
        let peer_message = peer.clone();
        channel.on_message(Box::new(move |msg| {
            let _ = events_message.send(TransportEvent::Message(
                peer_message.clone(),
                msg.data.to_vec(),
            ));
            Box::pin(async {})
        }));

        self.channels.lock().await.insert(peer, channel);
    }
}

impl Transport for WebRtcTransport {
    /// Fire-and-forget: the data channel send future is spawned on the
    /// runtime rather than awaited here, since `Transport::send` is
    /// synchronous (§5, engines never await).
    fn send(&self, peer: &DeviceId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let channels = self.channels.clone();
        let peer = peer.clone();
        let self_id = self.self_id.clone();
        tokio::spawn(async move {
            let guard = channels.lock().await;
            let Some(channel) = guard.get(&peer) else {
                tracing::warn!(%peer, "send to unknown peer dropped");
                return;
            };
            if let Err(e) = channel.send(&bytes.into()).await {
                tracing::warn!(%self_id, %peer, error = %e, "data channel send failed");
            }
        });
        Ok(())
    }

    fn close(&self, peer: &DeviceId) {
        let channels = self.channels.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            if let Some(channel) = channels.lock().await.remove(&peer) {
                let _ = channel.close().await;
            }
        });
    }
}
