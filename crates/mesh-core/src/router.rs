//! Package router: the single entry point for inbound application
//! messages, dispatching by tag to the session/mesh/DKG/signing engines
//! (§6).

use crate::types::DeviceId;
use serde::{Deserialize, Serialize};

/// Every application-level message exchanged over a peer's data channel,
/// once the connection itself is established (§6 "Application messages").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "webrtc_msg_type")]
pub enum ApplicationMessage {
    SessionProposal {
        proposal: crate::session::SessionProposal,
    },
    SessionResponse {
        response: crate::session::SessionResponse,
    },
    MeshReady {
        session_id: String,
        device_id: DeviceId,
    },
    DkgRound1Package {
        package: Vec<u8>,
    },
    DkgRound2Package {
        map: Vec<u8>,
    },
    DkgPackageRequest {
        round: u8,
        requester: DeviceId,
    },
    DkgPackageResend {
        round: u8,
        package: Vec<u8>,
    },
    SigningRequest {
        signing_id: String,
        transaction_data: Vec<u8>,
        required_signers: u16,
    },
    SigningAcceptance {
        signing_id: String,
        accepted: bool,
    },
    SignerSelection {
        signing_id: String,
        selected_signers: Vec<DeviceId>,
    },
    SigningCommitment {
        signing_id: String,
        sender_identifier: DeviceId,
        commitment: Vec<u8>,
    },
    SignatureShare {
        signing_id: String,
        sender_identifier: DeviceId,
        share: Vec<u8>,
    },
    AggregatedSignature {
        signing_id: String,
        signature: String,
    },
    SimpleMessage {
        text: String,
    },
}

/// Dispatch tag extracted from an inbound message, handed to the caller's
/// match on the engine it belongs to. The router itself holds no engine
/// state: callers own `DkgEngine`/`SigningEngine`/etc. and feed the
/// decoded payload in (§5, single-owner-per-engine).
#[derive(Debug)]
pub enum Routed {
    ProposalOnly(crate::session::SessionProposal),
    ResponseOnly(crate::session::SessionResponse),
    Mesh { session_id: String, device_id: DeviceId },
    DkgRound1 { package: Vec<u8> },
    DkgRound2 { map: Vec<u8> },
    DkgRequest { round: u8, requester: DeviceId },
    DkgResend { round: u8, package: Vec<u8> },
    Signing(ApplicationMessage),
    Simple(String),
}

/// Parses raw bytes from the wire and classifies the result. Unrecognized
/// tags (a message this node's version doesn't know) are logged and
/// dropped rather than surfaced as a hard error (§6 "forward compat").
pub fn route(from: &DeviceId, raw: &[u8]) -> Option<Routed> {
    let msg: ApplicationMessage = match serde_json::from_slice(raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%from, error = %e, "dropping unrecognized or malformed message");
            return None;
        }
    };

    Some(match msg {
        ApplicationMessage::SessionProposal { proposal } => Routed::ProposalOnly(proposal),
        ApplicationMessage::SessionResponse { response } => Routed::ResponseOnly(response),
        ApplicationMessage::MeshReady {
            session_id,
            device_id,
        } => Routed::Mesh {
            session_id,
            device_id,
        },
        ApplicationMessage::DkgRound1Package { package } => Routed::DkgRound1 { package },
        ApplicationMessage::DkgRound2Package { map } => Routed::DkgRound2 { map },
        ApplicationMessage::DkgPackageRequest { round, requester } => {
            Routed::DkgRequest { round, requester }
        }
        ApplicationMessage::DkgPackageResend { round, package } => {
            Routed::DkgResend { round, package }
        }
        ApplicationMessage::SimpleMessage { text } => Routed::Simple(text),
        signing_msg @ (ApplicationMessage::SigningRequest { .. }
        | ApplicationMessage::SigningAcceptance { .. }
        | ApplicationMessage::SignerSelection { .. }
        | ApplicationMessage::SigningCommitment { .. }
        | ApplicationMessage::SignatureShare { .. }
        | ApplicationMessage::AggregatedSignature { .. }) => Routed::Signing(signing_msg),
    })
}
