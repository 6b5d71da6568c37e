//! Session/mesh/connection lifecycle tests: acceptance, the mesh-ready
//! barrier, and the effect of a mid-DKG disconnect.

use mesh_core::config::NodeConfig;
use mesh_core::connection::ConnectionManager;
use mesh_core::dkg::DkgEngine;
use mesh_core::error::SignalingError;
use mesh_core::mesh::MeshSupervisor;
use mesh_core::session::SessionCoordinator;
use mesh_core::signal::{SignalEnvelope, SignalGateway};
use mesh_core::transport::{InMemoryTransport, Transport, TransportEvent};
use mesh_core::types::{Curve, DeviceId, DkgState, MeshStatus, SessionPurpose};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct NullSignal;
impl SignalGateway for NullSignal {
    fn send(&self, _to: &DeviceId, _envelope: SignalEnvelope) -> Result<(), SignalingError> {
        Ok(())
    }
}

#[test]
fn three_party_session_becomes_fully_accepted() {
    let a = DeviceId::new("a");
    let b = DeviceId::new("b");
    let c = DeviceId::new("c");
    let participants = vec![a.clone(), b.clone(), c.clone()];

    let config = NodeConfig::default();
    let mut proposer = SessionCoordinator::new(a.clone(), &config);
    let proposal = proposer
        .propose("s1", participants.clone(), 2, Curve::Ed25519, SessionPurpose::NewWallet)
        .unwrap();

    let mut coord_b = SessionCoordinator::new(b.clone(), &config);
    let response_b = coord_b.accept_proposal(&proposal).unwrap();
    let mut coord_c = SessionCoordinator::new(c.clone(), &config);
    let response_c = coord_c.accept_proposal(&proposal).unwrap();

    proposer.handle_response(&b, &response_b).unwrap();
    assert!(!proposer.is_fully_accepted());
    proposer.handle_response(&c, &response_c).unwrap();
    assert!(proposer.is_fully_accepted());
}

#[test]
fn mesh_ready_barrier_gates_on_both_acceptance_and_connectivity() {
    let a = DeviceId::new("a");
    let b = DeviceId::new("b");
    let participants = vec![a.clone(), b.clone()];
    let mut mesh = MeshSupervisor::new(a.clone());

    // Not all channels usable yet: no ready emitted despite full acceptance.
    let emitted = mesh.maybe_emit_own_ready("s1", &participants, true, |_| false);
    assert!(emitted.is_none());

    let emitted = mesh.maybe_emit_own_ready("s1", &participants, true, |_| true);
    assert!(emitted.is_some());
    mesh.handle_mesh_ready(b.clone());
    assert!(mesh.is_ready());
}

/// Simulates a peer disconnecting partway through DKG round 1: the mesh
/// barrier drops back to `PartiallyReady` and the affected device's DKG
/// session is explicitly failed by its caller (the engine itself has no
/// transport-liveness signal of its own, per §5) — key material must not
/// be produced.
#[test]
fn peer_disconnect_mid_dkg_drops_mesh_and_fails_dkg() {
    let a = DeviceId::new("a");
    let b = DeviceId::new("b");
    let c = DeviceId::new("c");
    let participants = vec![a.clone(), b.clone(), c.clone()];

    let mut mesh = MeshSupervisor::new(a.clone());
    mesh.maybe_emit_own_ready("s1", &participants, true, |_| true);
    mesh.handle_mesh_ready(b.clone());
    mesh.handle_mesh_ready(c.clone());
    assert!(mesh.is_ready());

    let config = NodeConfig::default();
    let mut dkg = DkgEngine::<frost_primitives::Ed25519Curve>::new(a.clone(), &config);
    dkg.initialize(Curve::Ed25519, participants.clone(), 2).unwrap();
    assert!(matches!(dkg.state(), DkgState::Round1InProgress));

    mesh.handle_disconnect(&c);
    assert!(matches!(mesh.status(), MeshStatus::PartiallyReady { .. }));

    // No hard protocol timeout exists for a stalled round, so the caller
    // (node event loop) observes the disconnect and fails the session.
    assert!(dkg.is_active());
    assert!(dkg.participants().contains(&c));
    dkg.fail(format!("participant {c} disconnected"));
    assert!(matches!(dkg.state(), DkgState::Failed { .. }));
    assert!(dkg.key_material().is_none());
}

#[test]
fn connection_manager_drives_offer_answer_between_two_peers() {
    let peers: Arc<Mutex<HashMap<DeviceId, tokio::sync::mpsc::UnboundedSender<TransportEvent>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let (transport_a, _rx_a) = InMemoryTransport::new(DeviceId::new("a"), peers.clone());
    let (transport_b, _rx_b) = InMemoryTransport::new(DeviceId::new("b"), peers.clone());

    let mut cm_a = ConnectionManager::new(DeviceId::new("a"), transport_a, NullSignal, &NodeConfig::default());
    let mut cm_b = ConnectionManager::new(DeviceId::new("b"), transport_b, NullSignal, &NodeConfig::default());

    assert!(cm_a.is_offerer_for(&DeviceId::new("b")));
    assert!(!cm_b.is_offerer_for(&DeviceId::new("a")));

    cm_a.initiate(&DeviceId::new("b")).unwrap();
    cm_b.on_signal(
        &DeviceId::new("a"),
        SignalEnvelope::Offer(mesh_core::signal::SdpInfo {
            sdp: "offer-from-a".to_string(),
        }),
    )
    .unwrap();

    cm_a.mark_channel_open(&DeviceId::new("b"));
    cm_b.mark_channel_open(&DeviceId::new("a"));
    assert!(cm_a.is_connected(&DeviceId::new("b")));
    assert!(cm_b.is_connected(&DeviceId::new("a")));
}

