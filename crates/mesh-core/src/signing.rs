//! Signing engine: threshold signing over an already-established key,
//! driven through Propose/Accept/Select/Commit/Share phases (§4.7).

use crate::config::NodeConfig;
use crate::error::{ConcurrencyError, CoreError, CryptoError};
use crate::types::{DeviceId, KeyMaterial, SigningSession, SigningState};
use frost_primitives::FrostCurve;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Outbound effects the engine asks its caller to perform. The engine
/// never touches the transport directly (§5).
pub enum SigningOutput {
    BroadcastRequest {
        signing_id: String,
        transaction_bytes: Vec<u8>,
        required_signers: u16,
    },
    SendAcceptance {
        to: DeviceId,
        signing_id: String,
        accepted: bool,
    },
    BroadcastSelection {
        signing_id: String,
        selected_signers: Vec<DeviceId>,
    },
    BroadcastCommitment {
        signing_id: String,
        commitment_json: Vec<u8>,
    },
    BroadcastShare {
        signing_id: String,
        share_json: Vec<u8>,
    },
    BroadcastSignature {
        signing_id: String,
        signature_hex: String,
    },
    Failed(String),
}

/// Drives one signing session for a curve-generic FROST primitive. Single
/// owner per process, same as the DKG engine (§5 "at most one... signing
/// session per node").
pub struct SigningEngine<C: FrostCurve> {
    self_id: DeviceId,
    state: SigningState,
    session: Option<SigningSession>,

    self_identifier: Option<C::Identifier>,
    identifier_of: std::collections::HashMap<DeviceId, C::Identifier>,

    nonces: Option<C::SigningNonces>,
    commitments: BTreeMap<C::Identifier, C::SigningCommitments>,
    shares: BTreeMap<C::Identifier, C::SignatureShare>,
    selected_identifiers: Vec<C::Identifier>,

    accept_timeout: Duration,
    proposed_at: Option<Instant>,
}

impl<C: FrostCurve> SigningEngine<C> {
    pub fn new(self_id: DeviceId, config: &NodeConfig) -> Self {
        Self {
            self_id,
            state: SigningState::Idle,
            session: None,
            self_identifier: None,
            identifier_of: std::collections::HashMap::new(),
            nonces: None,
            commitments: BTreeMap::new(),
            shares: BTreeMap::new(),
            selected_identifiers: Vec::new(),
            accept_timeout: config.signing_accept_timeout,
            proposed_at: None,
        }
    }

    pub fn state(&self) -> &SigningState {
        &self.state
    }

    pub fn session(&self) -> Option<&SigningSession> {
        self.session.as_ref()
    }

    fn build_identifiers(&mut self, key_material: &KeyMaterial) -> Result<(), CoreError> {
        self.identifier_of.clear();
        for (idx, device) in key_material.participants.iter().enumerate() {
            let identifier = C::identifier_from_u16((idx + 1) as u16)
                .map_err(|e| CryptoError::Primitive(e.to_string()))?;
            self.identifier_of.insert(device.clone(), identifier);
        }
        self.self_identifier = self.identifier_of.get(&self.self_id).cloned();
        Ok(())
    }

    /// Propose phase: initiates a signing session over `transaction_bytes`
    /// requiring `key_material.threshold` signers, auto-accepting self.
    pub fn propose(
        &mut self,
        signing_id: impl Into<String>,
        transaction_bytes: Vec<u8>,
        key_material: &KeyMaterial,
    ) -> Result<SigningOutput, CoreError> {
        if !matches!(self.state, SigningState::Idle) {
            return Err(ConcurrencyError::SigningAlreadyActive.into());
        }
        self.build_identifiers(key_material)?;
        let signing_id = signing_id.into();
        let mut session = SigningSession::new(
            signing_id.clone(),
            transaction_bytes.clone(),
            key_material.threshold,
            key_material.participants.clone(),
            self.self_id.clone(),
        );
        session.acceptances.insert(self.self_id.clone(), true);
        self.session = Some(session);
        self.state = SigningState::AwaitingAcceptances;
        self.proposed_at = Some(Instant::now());
        tracing::info!(%signing_id, "signing proposed");

        Ok(SigningOutput::BroadcastRequest {
            signing_id,
            transaction_bytes,
            required_signers: key_material.threshold,
        })
    }

    /// Accept phase: handles an inbound request. Rejects outright if
    /// another signing session is already active (§4.7 invariant).
    pub fn handle_request(
        &mut self,
        signing_id: impl Into<String>,
        initiator: DeviceId,
        transaction_bytes: Vec<u8>,
        threshold: u16,
        key_material: &KeyMaterial,
    ) -> Result<SigningOutput, CoreError> {
        let signing_id = signing_id.into();
        if !matches!(self.state, SigningState::Idle) {
            return Ok(SigningOutput::SendAcceptance {
                to: initiator,
                signing_id,
                accepted: false,
            });
        }
        self.build_identifiers(key_material)?;
        let mut session = SigningSession::new(
            signing_id.clone(),
            transaction_bytes,
            threshold,
            key_material.participants.clone(),
            initiator.clone(),
        );
        session.acceptances.insert(self.self_id.clone(), true);
        self.session = Some(session);
        self.state = SigningState::AwaitingAcceptances;
        self.proposed_at = Some(Instant::now());

        Ok(SigningOutput::SendAcceptance {
            to: initiator,
            signing_id,
            accepted: true,
        })
    }

    /// Folds in a peer's acceptance/decline. Once at least `threshold`
    /// acceptances (including self) are in, the initiator deterministically
    /// selects the first `threshold` accepting participants by
    /// `participants` order and broadcasts the selection (§4.7 Select).
    pub fn handle_acceptance(
        &mut self,
        from: DeviceId,
        signing_id: &str,
        accepted: bool,
    ) -> Result<Option<SigningOutput>, CoreError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if session.signing_id != signing_id || !matches!(self.state, SigningState::AwaitingAcceptances)
        {
            return Ok(None);
        }
        session.acceptances.insert(from, accepted);

        if session.initiator != self.self_id {
            return Ok(None);
        }
        if session.accepted_count() < session.threshold as usize {
            return Ok(None);
        }

        let selected: Vec<DeviceId> = session
            .participants
            .iter()
            .filter(|p| session.acceptances.get(*p).copied().unwrap_or(false))
            .take(session.threshold as usize)
            .cloned()
            .collect();
        session.selected_signers = selected.clone();
        self.state = SigningState::CommitmentPhase;
        tracing::info!(signing_id, signers = ?selected, "signers selected");

        Ok(Some(SigningOutput::BroadcastSelection {
            signing_id: signing_id.to_string(),
            selected_signers: selected,
        }))
    }

    /// Commit phase: applies the selection. If this device was selected,
    /// generates and returns its own commitment to broadcast.
    pub fn handle_selection(
        &mut self,
        signing_id: &str,
        selected_signers: Vec<DeviceId>,
        key_material: &KeyMaterial,
    ) -> Result<Option<SigningOutput>, CoreError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if session.signing_id != signing_id {
            return Ok(None);
        }
        session.selected_signers = selected_signers.clone();
        self.selected_identifiers = selected_signers
            .iter()
            .filter_map(|d| self.identifier_of.get(d).cloned())
            .collect();

        if !selected_signers.contains(&self.self_id) {
            // Not selected to sign this round; stay a spectator.
            return Ok(None);
        }

        let key_package: C::KeyPackage = serde_json::from_slice(key_material.secret_share.as_bytes())
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let (nonces, commitment) = C::generate_signing_commitment(&key_package)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        self.nonces = Some(nonces);

        let self_identifier = self
            .self_identifier
            .clone()
            .ok_or_else(|| CryptoError::Primitive("self identifier unknown".to_string()))?;
        self.commitments.insert(self_identifier, commitment.clone());
        self.state = SigningState::CommitmentPhase;

        let commitment_json =
            serde_json::to_vec(&commitment).map_err(|e| CryptoError::Primitive(e.to_string()))?;
        Ok(Some(SigningOutput::BroadcastCommitment {
            signing_id: signing_id.to_string(),
            commitment_json,
        }))
    }

    /// Adds a peer's commitment. First commitment per sender wins (§4.7
    /// invariant "duplicate commitments... dropped"). Once every selected
    /// signer's commitment is in, builds the signing package and computes
    /// this device's signature share.
    pub fn handle_commitment(
        &mut self,
        from: DeviceId,
        signing_id: &str,
        commitment_bytes: &[u8],
        key_material: &KeyMaterial,
    ) -> Result<Option<SigningOutput>, CoreError> {
        if self.session.as_ref().map(|s| s.signing_id.as_str()) != Some(signing_id) {
            return Ok(None);
        }
        let identifier = self
            .identifier_of
            .get(&from)
            .cloned()
            .ok_or_else(|| CryptoError::Primitive(format!("unknown signer {from}")))?;
        if self.commitments.contains_key(&identifier) {
            return Ok(None);
        }
        let commitment: C::SigningCommitments = serde_json::from_slice(commitment_bytes)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        self.commitments.insert(identifier, commitment);

        if self.commitments.len() != self.selected_identifiers.len() {
            return Ok(None);
        }
        // Not selected to sign ourselves; nothing further to compute.
        let Some(nonces) = self.nonces.clone() else {
            return Ok(None);
        };

        let session = self
            .session
            .as_ref()
            .expect("session present, checked above");
        let signing_package = C::create_signing_package(&self.commitments, &session.transaction_bytes)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let key_package: C::KeyPackage = serde_json::from_slice(key_material.secret_share.as_bytes())
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let share = C::generate_signature_share(&signing_package, &nonces, &key_package)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;

        let self_identifier = self
            .self_identifier
            .clone()
            .ok_or_else(|| CryptoError::Primitive("self identifier unknown".to_string()))?;
        self.shares.insert(self_identifier, share.clone());
        self.state = SigningState::SharePhase;

        let share_json = serde_json::to_vec(&share).map_err(|e| CryptoError::Primitive(e.to_string()))?;
        Ok(Some(SigningOutput::BroadcastShare {
            signing_id: signing_id.to_string(),
            share_json,
        }))
    }

    /// Adds a peer's signature share. First share per sender wins. Once
    /// every selected signer's share is in and this device is the
    /// initiator, aggregates and verifies the signature locally before
    /// broadcasting it (§4.7 Share/verify invariant).
    pub fn handle_share(
        &mut self,
        from: DeviceId,
        signing_id: &str,
        share_bytes: &[u8],
        key_material: &KeyMaterial,
    ) -> Result<Option<SigningOutput>, CoreError> {
        if self.session.as_ref().map(|s| s.signing_id.as_str()) != Some(signing_id) {
            return Ok(None);
        }
        let identifier = self
            .identifier_of
            .get(&from)
            .cloned()
            .ok_or_else(|| CryptoError::Primitive(format!("unknown signer {from}")))?;
        if self.shares.contains_key(&identifier) {
            return Ok(None);
        }
        let share: C::SignatureShare = serde_json::from_slice(share_bytes)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        self.shares.insert(identifier, share);

        if self.shares.len() != self.selected_identifiers.len() {
            return Ok(None);
        }
        let is_initiator = self
            .session
            .as_ref()
            .map(|s| s.initiator == self.self_id)
            .unwrap_or(false);
        if !is_initiator {
            return Ok(None);
        }

        let session = self
            .session
            .as_ref()
            .expect("session present, checked above");
        let signing_package = C::create_signing_package(&self.commitments, &session.transaction_bytes)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let public_key_package: C::PublicKeyPackage =
            serde_json::from_slice(&key_material.public_key_package)
                .map_err(|e| CryptoError::Primitive(e.to_string()))?;

        let signature =
            match C::aggregate_signature(&signing_package, &self.shares, &public_key_package) {
                Ok(sig) => sig,
                Err(e) => {
                    let reason = e.to_string();
                    self.state = SigningState::Failed {
                        reason: reason.clone(),
                    };
                    return Ok(Some(SigningOutput::Failed(reason)));
                }
            };
        let signature_bytes = C::serialize_signature(&signature)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;

        self.state = SigningState::Complete;
        let signing_id = signing_id.to_string();
        tracing::info!(%signing_id, "signing complete");

        Ok(Some(SigningOutput::BroadcastSignature {
            signing_id,
            signature_hex: hex::encode(signature_bytes),
        }))
    }

    /// Marks the session failed, e.g. on timeout or an explicit decline
    /// that drops the acceptance count below threshold.
    pub fn fail(&mut self, reason: impl Into<String>) -> SigningOutput {
        let reason = reason.into();
        self.state = SigningState::Failed {
            reason: reason.clone(),
        };
        SigningOutput::Failed(reason)
    }

    /// Called periodically by the node loop. Fails the session if it is
    /// still waiting on acceptances past the configured timeout (§5
    /// mandatory signing acceptance timeout).
    pub fn check_timeout(&mut self) -> Option<SigningOutput> {
        if !matches!(self.state, SigningState::AwaitingAcceptances) {
            return None;
        }
        let proposed_at = self.proposed_at?;
        if proposed_at.elapsed() >= self.accept_timeout {
            Some(self.fail("signing acceptance timed out"))
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(
            self.self_id.clone(),
            &NodeConfig {
                signing_accept_timeout: self.accept_timeout,
                ..NodeConfig::default()
            },
        );
    }
}
