//! Session coordinator: proposal/acceptance lifecycle and snapshots
//! (§4.4).

use crate::config::NodeConfig;
use crate::error::SessionError;
use crate::types::{Curve, DeviceId, Session, SessionPurpose, WalletRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProposal {
    pub session_id: String,
    pub total: u16,
    pub threshold: u16,
    pub participants: Vec<DeviceId>,
    pub curve: Curve,
    pub purpose: SessionPurpose,
    pub proposer_id: DeviceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub accepted: bool,
}

/// Owns the current session and the set of pending invites. Single
/// session per node, matching the DKG/signing engines' single-owner rule.
pub struct SessionCoordinator {
    self_id: DeviceId,
    session: Option<Session>,
    wallet_records: HashMap<String, WalletRecord>,
    accept_timeout: Duration,
    proposed_at: Option<Instant>,
}

impl SessionCoordinator {
    pub fn new(self_id: DeviceId, config: &NodeConfig) -> Self {
        Self {
            self_id,
            session: None,
            wallet_records: HashMap::new(),
            accept_timeout: config.session_accept_timeout,
            proposed_at: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Registers a wallet this device already holds, so a future
    /// `SessionPurpose::UseExistingWallet` proposal naming it can be
    /// validated against its real parameters rather than trusted blindly
    /// from the proposer (§7 "mismatched parameters between proposer and
    /// existing wallet").
    pub fn register_wallet(&mut self, record: WalletRecord) {
        self.wallet_records.insert(record.wallet_id.clone(), record);
    }

    fn validate_against_wallet(
        &self,
        participants: &[DeviceId],
        threshold: u16,
        curve: Curve,
        purpose: &SessionPurpose,
    ) -> Result<(), SessionError> {
        let SessionPurpose::UseExistingWallet { wallet_id } = purpose else {
            return Ok(());
        };
        let record = self.wallet_records.get(wallet_id).ok_or_else(|| {
            SessionError::ParameterMismatch(format!("unknown wallet {wallet_id}"))
        })?;
        if record.matches_proposal(participants, threshold, curve) {
            Ok(())
        } else {
            Err(SessionError::ParameterMismatch(format!(
                "proposal parameters do not match held wallet {wallet_id}"
            )))
        }
    }

    /// Proposes a new session. Returns the proposal to broadcast to every
    /// non-self participant.
    pub fn propose(
        &mut self,
        session_id: impl Into<String>,
        participants: Vec<DeviceId>,
        threshold: u16,
        curve: Curve,
        purpose: SessionPurpose,
    ) -> Result<SessionProposal, SessionError> {
        self.validate_against_wallet(&participants, threshold, curve, &purpose)?;
        let session_id = session_id.into();
        let session = Session::new_proposal(
            session_id.clone(),
            self.self_id.clone(),
            participants.clone(),
            threshold,
            curve,
            purpose.clone(),
        );
        let total = session.total;
        self.session = Some(session);
        self.proposed_at = Some(Instant::now());
        Ok(SessionProposal {
            session_id,
            total,
            threshold,
            participants,
            curve,
            purpose,
            proposer_id: self.self_id.clone(),
        })
    }

    /// Handles receipt of a proposal addressed to this device: joins the
    /// session locally, marking self as accepted, and returns the
    /// response to send back to the proposer.
    pub fn accept_proposal(
        &mut self,
        proposal: &SessionProposal,
    ) -> Result<SessionResponse, SessionError> {
        self.validate_against_wallet(
            &proposal.participants,
            proposal.threshold,
            proposal.curve,
            &proposal.purpose,
        )?;
        let mut session = Session::new_proposal(
            proposal.session_id.clone(),
            proposal.proposer_id.clone(),
            proposal.participants.clone(),
            proposal.threshold,
            proposal.curve,
            proposal.purpose.clone(),
        );
        session.accepted_devices.insert(self.self_id.clone());
        self.session = Some(session);
        self.proposed_at = Some(Instant::now());
        Ok(SessionResponse {
            session_id: proposal.session_id.clone(),
            accepted: true,
        })
    }

    /// Folds in a peer's response. Returns an error if the peer declined,
    /// which fails the session per §4.4/§7.
    pub fn handle_response(
        &mut self,
        from: &DeviceId,
        response: &SessionResponse,
    ) -> Result<(), SessionError> {
        let session = self
            .session
            .as_mut()
            .ok_or(SessionError::NoActiveSession)?;
        if session.session_id != response.session_id {
            return Ok(());
        }
        if !response.accepted {
            return Err(SessionError::Declined(from.to_string()));
        }
        session.accepted_devices.insert(from.clone());
        Ok(())
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.session
            .as_ref()
            .map(Session::is_fully_accepted)
            .unwrap_or(false)
    }

    /// Called periodically by the node loop. Fails the session if it is
    /// still pending acceptance past the configured timeout (§5 mandatory
    /// session acceptance timeout).
    pub fn check_timeout(&mut self) -> Option<SessionError> {
        if self.session.is_none() || self.is_fully_accepted() {
            return None;
        }
        let proposed_at = self.proposed_at?;
        if proposed_at.elapsed() >= self.accept_timeout {
            self.session = None;
            self.proposed_at = None;
            Some(SessionError::AcceptanceTimeout)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.session = None;
        self.proposed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposer_is_accepted_from_creation() {
        let mut coord = SessionCoordinator::new(DeviceId::new("a"), &NodeConfig::default());
        let proposal = coord
            .propose(
                "s1",
                vec![DeviceId::new("a"), DeviceId::new("b")],
                2,
                Curve::Ed25519,
                SessionPurpose::NewWallet,
            )
            .unwrap();
        assert_eq!(proposal.total, 2);
        assert!(!coord.is_fully_accepted());
    }

    #[test]
    fn fully_accepted_once_every_participant_responds() {
        let mut coord = SessionCoordinator::new(DeviceId::new("a"), &NodeConfig::default());
        coord
            .propose(
                "s1",
                vec![DeviceId::new("a"), DeviceId::new("b")],
                2,
                Curve::Ed25519,
                SessionPurpose::NewWallet,
            )
            .unwrap();
        coord
            .handle_response(
                &DeviceId::new("b"),
                &SessionResponse {
                    session_id: "s1".to_string(),
                    accepted: true,
                },
            )
            .unwrap();
        assert!(coord.is_fully_accepted());
    }

    #[test]
    fn decline_surfaces_as_session_error() {
        let mut coord = SessionCoordinator::new(DeviceId::new("a"), &NodeConfig::default());
        coord
            .propose(
                "s1",
                vec![DeviceId::new("a"), DeviceId::new("b")],
                2,
                Curve::Ed25519,
                SessionPurpose::NewWallet,
            )
            .unwrap();
        let err = coord
            .handle_response(
                &DeviceId::new("b"),
                &SessionResponse {
                    session_id: "s1".to_string(),
                    accepted: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::Declined(_)));
    }

    #[test]
    fn mismatched_existing_wallet_parameters_are_rejected() {
        let mut coord = SessionCoordinator::new(DeviceId::new("a"), &NodeConfig::default());
        coord.register_wallet(WalletRecord {
            wallet_id: "w1".to_string(),
            group_public_key: vec![1, 2, 3],
            participants: vec![DeviceId::new("a"), DeviceId::new("b")],
            threshold: 2,
            curve: Curve::Ed25519,
            address: "addr".to_string(),
        });
        let err = coord
            .propose(
                "s1",
                vec![DeviceId::new("a"), DeviceId::new("b")],
                1,
                Curve::Ed25519,
                SessionPurpose::UseExistingWallet {
                    wallet_id: "w1".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::ParameterMismatch(_)));
    }

    #[test]
    fn matching_existing_wallet_parameters_are_accepted() {
        let mut coord = SessionCoordinator::new(DeviceId::new("a"), &NodeConfig::default());
        coord.register_wallet(WalletRecord {
            wallet_id: "w1".to_string(),
            group_public_key: vec![1, 2, 3],
            participants: vec![DeviceId::new("a"), DeviceId::new("b")],
            threshold: 2,
            curve: Curve::Ed25519,
            address: "addr".to_string(),
        });
        let proposal = coord
            .propose(
                "s1",
                vec![DeviceId::new("a"), DeviceId::new("b")],
                2,
                Curve::Ed25519,
                SessionPurpose::UseExistingWallet {
                    wallet_id: "w1".to_string(),
                },
            )
            .unwrap();
        assert_eq!(proposal.total, 2);
    }
}
