//! Shared data model: device identity, sessions, mesh status, and the
//! DKG/signing state machines' value types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque, self-chosen, globally-unique-within-a-session device identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    Ed25519,
    Secp256k1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPurpose {
    NewWallet,
    UseExistingWallet { wallet_id: String },
}

/// Immutable after proposal except for `accepted_devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub proposer_id: DeviceId,
    pub participants: Vec<DeviceId>,
    pub total: u16,
    pub threshold: u16,
    pub accepted_devices: BTreeSet<DeviceId>,
    pub curve: Curve,
    pub purpose: SessionPurpose,
}

impl Session {
    /// Builds a freshly-proposed session. Enforces the invariant that the
    /// proposer is a participant and is accepted from creation.
    pub fn new_proposal(
        session_id: impl Into<String>,
        proposer_id: DeviceId,
        participants: Vec<DeviceId>,
        threshold: u16,
        curve: Curve,
        purpose: SessionPurpose,
    ) -> Self {
        let total = participants.len() as u16;
        debug_assert!(participants.contains(&proposer_id));
        debug_assert!(total >= 2);
        debug_assert!(threshold >= 1 && threshold <= total);

        let mut accepted_devices = BTreeSet::new();
        accepted_devices.insert(proposer_id.clone());

        Self {
            session_id: session_id.into(),
            proposer_id,
            participants,
            total,
            threshold,
            accepted_devices,
            curve,
            purpose,
        }
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.accepted_devices.len() == self.total as usize
    }

    /// This device's 1-based FROST participant index, derived from its
    /// position in `participants`.
    pub fn participant_index(&self, device: &DeviceId) -> Option<u16> {
        self.participants
            .iter()
            .position(|d| d == device)
            .map(|idx| (idx + 1) as u16)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshStatus {
    Incomplete,
    PartiallyReady {
        ready: BTreeSet<DeviceId>,
        total: usize,
    },
    Ready,
}

impl Default for MeshStatus {
    fn default() -> Self {
        MeshStatus::Incomplete
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DkgState {
    Idle,
    Initializing,
    Round1InProgress,
    Round2InProgress,
    Finalizing,
    Complete,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningState {
    Idle,
    AwaitingAcceptances,
    CommitmentPhase,
    SharePhase,
    Complete,
    Failed { reason: String },
}

/// Secret byte string that is wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(pub Vec<u8>);

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretBytes").field(&"[REDACTED]").finish()
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Produced by a successful DKG run, owned by the DKG engine and borrowed
/// read-only by the signing engine.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub group_public_key: Vec<u8>,
    /// Serialized `FrostCurve::PublicKeyPackage`, needed by the signing
    /// engine to aggregate shares.
    pub public_key_package: Vec<u8>,
    pub secret_share: SecretBytes,
    pub participants: Vec<DeviceId>,
    pub threshold: u16,
    pub curve: Curve,
    pub address: String,
}

/// Persisted wallet state for an already-completed DKG (§6 "persisted
/// state"), keyed by `wallet_id`. Used to validate a
/// `SessionPurpose::UseExistingWallet` proposal's parameters against the
/// wallet the device actually holds, rather than trusting the proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub wallet_id: String,
    pub group_public_key: Vec<u8>,
    pub participants: Vec<DeviceId>,
    pub threshold: u16,
    pub curve: Curve,
    pub address: String,
}

impl WalletRecord {
    pub fn from_key_material(wallet_id: impl Into<String>, key_material: &KeyMaterial) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            group_public_key: key_material.group_public_key.clone(),
            participants: key_material.participants.clone(),
            threshold: key_material.threshold,
            curve: key_material.curve,
            address: key_material.address.clone(),
        }
    }

    /// Whether a proposed session's parameters agree with this wallet's
    /// actual participants, threshold, and curve (§7 "mismatched
    /// parameters between proposer and existing wallet").
    pub fn matches_proposal(&self, participants: &[DeviceId], threshold: u16, curve: Curve) -> bool {
        self.participants == participants && self.threshold == threshold && self.curve == curve
    }
}

/// A single buffered out-of-order package, keyed on `(from_device, round)`
/// with last-write-wins semantics; the surrounding buffer keeps the
/// position of first arrival so replay order matches §4.6 point 2.
#[derive(Debug, Clone)]
pub struct BufferedPackage {
    pub from_device: DeviceId,
    pub round: u8,
    pub raw_package: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct DkgPackageBuffer {
    entries: Vec<BufferedPackage>,
}

impl DkgPackageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the package for `(from, round)`. Last write
    /// wins, but the slot keeps its original arrival position.
    pub fn insert(&mut self, from: DeviceId, round: u8, raw_package: Vec<u8>) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.from_device == from && e.round == round)
        {
            existing.raw_package = raw_package;
        } else {
            self.entries.push(BufferedPackage {
                from_device: from,
                round,
                raw_package,
            });
        }
    }

    /// Returns every buffered package for `round` in arrival order and
    /// removes them from the buffer. This is a snapshot-then-clear drain:
    /// callers must not reenter `insert` for this round while iterating
    /// the returned vector.
    pub fn drain_round(&mut self, round: u8) -> Vec<BufferedPackage> {
        let (matching, rest): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.round == round);
        self.entries = rest;
        matching
    }

    pub fn senders_for_round(&self, round: u8) -> HashSet<DeviceId> {
        self.entries
            .iter()
            .filter(|e| e.round == round)
            .map(|e| e.from_device.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SigningSession {
    pub signing_id: String,
    pub transaction_bytes: Vec<u8>,
    pub threshold: u16,
    pub participants: Vec<DeviceId>,
    pub acceptances: HashMap<DeviceId, bool>,
    pub selected_signers: Vec<DeviceId>,
    pub commitments: HashMap<DeviceId, Vec<u8>>,
    pub shares: HashMap<DeviceId, Vec<u8>>,
    pub initiator: DeviceId,
    pub final_signature: Option<Vec<u8>>,
}

impl SigningSession {
    pub fn new(
        signing_id: impl Into<String>,
        transaction_bytes: Vec<u8>,
        threshold: u16,
        participants: Vec<DeviceId>,
        initiator: DeviceId,
    ) -> Self {
        Self {
            signing_id: signing_id.into(),
            transaction_bytes,
            threshold,
            participants,
            acceptances: HashMap::new(),
            selected_signers: Vec::new(),
            commitments: HashMap::new(),
            shares: HashMap::new(),
            initiator,
            final_signature: None,
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.acceptances.values().filter(|v| **v).count()
    }
}
