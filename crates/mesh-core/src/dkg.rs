//! DKG engine: drives the three-round FROST DKG, buffers out-of-order
//! packages, and requests missing ones (§4.6).

use crate::config::NodeConfig;
use crate::error::{ConcurrencyError, CoreError, CryptoError};
use crate::types::{Curve, DeviceId, DkgPackageBuffer, DkgState, KeyMaterial, SecretBytes};
use frost_primitives::FrostCurve;
use rand::rngs::OsRng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

const ROUND1: u8 = 1;
const ROUND2: u8 = 2;

/// Outbound effects the engine asks its caller to perform. The engine
/// itself never touches the transport or signal gateway directly (§5).
pub enum DkgOutput {
    BroadcastRound1 { package_json: Vec<u8> },
    /// The full recipient map, broadcast once; each recipient extracts
    /// its own entry (§4.6 wire format).
    BroadcastRound2 { map_json: Vec<u8> },
    RequestMissingPackage { to: DeviceId, round: u8 },
    ResendPackage { to: DeviceId, round: u8, package_json: Vec<u8> },
    Complete(KeyMaterial),
    Failed(String),
}

fn ed25519_recipient_key(index: u16) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0..2].copy_from_slice(&index.to_le_bytes());
    bytes
}

fn secp256k1_recipient_key(index: u16) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0..4].copy_from_slice(&(index as u32).to_be_bytes());
    bytes
}

/// Decodes a single round-2 map entry. Two historical framings are
/// accepted alongside this engine's own bare-hex-string writer shape
/// (§4.6 "package formats on the wire"): `{"data": "<hex>"}` and a raw
/// structured package object, re-serialized to canonical JSON bytes.
fn decode_round2_entry(value: &serde_json::Value) -> Result<Vec<u8>, CoreError> {
    match value {
        serde_json::Value::String(hex_bytes) => {
            Ok(hex::decode(hex_bytes).map_err(|e| CryptoError::Primitive(e.to_string()))?)
        }
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(hex_bytes)) = map.get("data") {
                Ok(hex::decode(hex_bytes).map_err(|e| CryptoError::Primitive(e.to_string()))?)
            } else {
                serde_json::to_vec(value).map_err(|e| CryptoError::Primitive(e.to_string()).into())
            }
        }
        _ => Err(CryptoError::Primitive(
            "round2 entry is neither a hex string nor an object".to_string(),
        )
        .into()),
    }
}

/// Drives one DKG session for a curve-generic FROST primitive. Single
/// owner per process (§4.6 invariant "single DKG session at a time").
pub struct DkgEngine<C: FrostCurve> {
    self_id: DeviceId,
    state: DkgState,
    auto_trigger_from_buffer: bool,

    curve: Option<Curve>,
    participants: Vec<DeviceId>,
    threshold: u16,

    self_identifier: Option<C::Identifier>,
    identifier_of: HashMap<DeviceId, C::Identifier>,

    round1_secret: Option<C::Round1SecretPackage>,
    round1_packages: BTreeMap<C::Identifier, C::Round1Package>,
    round1_senders: HashSet<DeviceId>,
    /// This device's own round-1 package, kept around to answer a peer's
    /// `DkgPackageRequest` with a `ResendPackage` (§4.6 point 4).
    own_round1_package_json: Option<Vec<u8>>,

    round2_secret: Option<C::Round2SecretPackage>,
    /// Packages addressed to this device, keyed by sender.
    round2_packages: BTreeMap<C::Identifier, C::Round2Package>,
    round2_senders: HashSet<DeviceId>,

    buffer: DkgPackageBuffer,
    requested_missing: HashSet<(DeviceId, u8)>,

    stall_timeout: Duration,
    last_progress: Option<Instant>,

    key_material: Option<KeyMaterial>,
}

impl<C: FrostCurve> DkgEngine<C> {
    pub fn new(self_id: DeviceId, config: &NodeConfig) -> Self {
        Self {
            self_id,
            state: DkgState::Idle,
            auto_trigger_from_buffer: config.auto_trigger_dkg_from_buffer,
            curve: None,
            participants: Vec::new(),
            threshold: 0,
            self_identifier: None,
            identifier_of: HashMap::new(),
            round1_secret: None,
            round1_packages: BTreeMap::new(),
            round1_senders: HashSet::new(),
            own_round1_package_json: None,
            round2_secret: None,
            round2_packages: BTreeMap::new(),
            round2_senders: HashSet::new(),
            buffer: DkgPackageBuffer::new(),
            requested_missing: HashSet::new(),
            stall_timeout: config.dkg_stall_timeout,
            last_progress: None,
            key_material: None,
        }
    }

    pub fn state(&self) -> &DkgState {
        &self.state
    }

    pub fn key_material(&self) -> Option<&KeyMaterial> {
        self.key_material.as_ref()
    }

    pub fn participants(&self) -> &[DeviceId] {
        &self.participants
    }

    /// Whether a DKG session is underway: neither untouched nor resolved
    /// one way or the other.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, DkgState::Idle | DkgState::Complete | DkgState::Failed { .. })
    }

    fn other_participants(&self) -> impl Iterator<Item = &DeviceId> {
        self.participants.iter().filter(|p| **p != self.self_id)
    }

    fn index_of(&self, device: &DeviceId) -> Option<u16> {
        self.participants
            .iter()
            .position(|d| d == device)
            .map(|i| (i + 1) as u16)
    }

    /// `Idle -> Initializing -> Round1InProgress`. Fails if another DKG
    /// session is already active (§5 "at most one DKG... per node").
    pub fn initialize(
        &mut self,
        curve: Curve,
        participants: Vec<DeviceId>,
        threshold: u16,
    ) -> Result<DkgOutput, CoreError> {
        if !matches!(self.state, DkgState::Idle) {
            return Err(ConcurrencyError::DkgAlreadyActive.into());
        }
        self.state = DkgState::Initializing;
        self.curve = Some(curve);
        self.participants = {
            let mut p = participants;
            p.sort();
            p
        };
        self.threshold = threshold;

        for device in &self.participants {
            let index = self.index_of(device).expect("participant just inserted");
            let identifier = C::identifier_from_u16(index)
                .map_err(|e| CryptoError::Primitive(e.to_string()))?;
            self.identifier_of.insert(device.clone(), identifier);
        }
        self.self_identifier = self.identifier_of.get(&self.self_id).cloned();

        let self_identifier = self
            .self_identifier
            .clone()
            .expect("self is always a participant");
        let mut rng = OsRng;
        let (round1_secret, round1_package) =
            C::dkg_part1(self_identifier.clone(), self.participants.len() as u16, threshold, &mut rng)
                .map_err(|e| CryptoError::Primitive(e.to_string()))?;

        self.round1_secret = Some(round1_secret);
        // The local package is added immediately, before any peer's (§4.6 invariant).
        self.round1_packages
            .insert(self_identifier, round1_package.clone());
        self.round1_senders.insert(self.self_id.clone());
        self.state = DkgState::Round1InProgress;
        self.last_progress = Some(Instant::now());
        tracing::info!(curve = ?self.curve, "DKG round 1 started");

        let package_json = serde_json::to_vec(&round1_package)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        self.own_round1_package_json = Some(package_json.clone());

        self.replay_buffered(ROUND1)?;

        Ok(DkgOutput::BroadcastRound1 { package_json })
    }

    /// Auto-initializes if the engine is still `Idle`, a session/curve are
    /// known, and buffered round-1 packages exist from every other
    /// participant — gated behind the config flag (§4.6 point 3, §9).
    pub fn maybe_auto_trigger(&mut self) -> Result<Option<DkgOutput>, CoreError> {
        if !self.auto_trigger_from_buffer {
            return Ok(None);
        }
        if !matches!(self.state, DkgState::Idle) {
            return Ok(None);
        }
        let (Some(curve), false) = (self.curve, self.participants.is_empty()) else {
            return Ok(None);
        };
        let senders = self.buffer.senders_for_round(ROUND1);
        let all_present = self
            .other_participants()
            .all(|p| senders.contains(p));
        if !all_present {
            return Ok(None);
        }
        tracing::warn!("auto-triggering DKG from buffered round-1 packages");
        let participants = self.participants.clone();
        let threshold = self.threshold;
        self.initialize(curve, participants, threshold).map(Some)
    }

    fn deserialize_round1(&self, raw: &[u8]) -> Result<C::Round1Package, CoreError> {
        serde_json::from_slice(raw).map_err(|e| CryptoError::Primitive(e.to_string()).into())
    }

    /// Adds a round-1 package from `from`. Buffers it if the engine is not
    /// in `Round1InProgress` (§4.6 point 1).
    pub fn add_round1_package(
        &mut self,
        from: DeviceId,
        raw_package: Vec<u8>,
    ) -> Result<Option<DkgOutput>, CoreError> {
        if !matches!(self.state, DkgState::Round1InProgress) {
            self.buffer.insert(from, ROUND1, raw_package);
            return Ok(None);
        }
        self.apply_round1(from, raw_package)
    }

    fn apply_round1(
        &mut self,
        from: DeviceId,
        raw_package: Vec<u8>,
    ) -> Result<Option<DkgOutput>, CoreError> {
        if self.round1_senders.contains(&from) {
            // A round-k package from a given sender is added at most once (§4.6 invariant).
            return Ok(None);
        }
        let identifier = self
            .identifier_of
            .get(&from)
            .cloned()
            .ok_or_else(|| CryptoError::Primitive(format!("unknown sender {from}")))?;
        let package = self.deserialize_round1(&raw_package)?;
        self.round1_packages.insert(identifier, package);
        self.round1_senders.insert(from);
        self.last_progress = Some(Instant::now());

        if self.round1_senders.len() == self.participants.len() {
            return self.start_round2().map(Some);
        }
        Ok(None)
    }

    fn start_round2(&mut self) -> Result<DkgOutput, CoreError> {
        let round1_secret = self
            .round1_secret
            .take()
            .expect("round1 secret set at initialize");
        let (round2_secret, round2_out) = C::dkg_part2(round1_secret, &self.round1_packages)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        self.round2_secret = Some(round2_secret);
        self.state = DkgState::Round2InProgress;
        self.last_progress = Some(Instant::now());
        tracing::info!("DKG round 2 started");

        let curve = self.curve.expect("curve set at initialize");
        let mut map = serde_json::Map::new();
        for device in self.other_participants() {
            let index = self.index_of(device).expect("participant");
            let identifier = self.identifier_of.get(device).expect("identifier");
            let package = round2_out
                .get(identifier)
                .ok_or_else(|| CryptoError::Primitive(format!("no round2 output for {device}")))?;
            let key = match curve {
                Curve::Ed25519 => hex::encode(ed25519_recipient_key(index)),
                Curve::Secp256k1 => hex::encode(secp256k1_recipient_key(index)),
            };
            let package_bytes =
                serde_json::to_vec(package).map_err(|e| CryptoError::Primitive(e.to_string()))?;
            map.insert(key, serde_json::Value::String(hex::encode(package_bytes)));
        }

        self.replay_buffered(ROUND2)?;

        Ok(DkgOutput::BroadcastRound2 {
            map_json: serde_json::to_vec(&map).map_err(|e| CryptoError::Primitive(e.to_string()))?,
        })
    }

    /// Extracts this device's entry from a broadcast round-2 map, trying
    /// both historical recipient keyings (§4.6, §9 endianness note), then
    /// decoding whichever of the tolerated entry framings it finds.
    fn extract_own_round2_entry(&self, map_bytes: &[u8]) -> Result<Vec<u8>, CoreError> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(map_bytes)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let my_index = self
            .index_of(&self.self_id)
            .ok_or_else(|| CryptoError::Primitive("self not a participant".to_string()))?;

        let candidates = [
            hex::encode(ed25519_recipient_key(my_index)),
            hex::encode(secp256k1_recipient_key(my_index)),
        ];
        for key in candidates {
            if let Some(value) = map.get(&key) {
                return decode_round2_entry(value);
            }
        }
        Err(CryptoError::Primitive("no round2 entry for self in any known keying".to_string()).into())
    }

    /// Adds a round-2 package (the full broadcast map) from `from`.
    pub fn add_round2_package(
        &mut self,
        from: DeviceId,
        raw_map: Vec<u8>,
    ) -> Result<Vec<DkgOutput>, CoreError> {
        if matches!(self.state, DkgState::Round1InProgress) {
            self.buffer.insert(from.clone(), ROUND2, raw_map);
            return Ok(self.request_missing_round1(&from));
        }
        if !matches!(self.state, DkgState::Round2InProgress) {
            self.buffer.insert(from, ROUND2, raw_map);
            return Ok(Vec::new());
        }
        self.apply_round2(from, &raw_map)
    }

    /// A round-2 broadcast arrived from `peer_in_round2` before this
    /// device had that peer's round-1 package. The broadcast's sender is
    /// definitionally the device whose round-1 package is missing — the
    /// wire schema carries no separate "missing sender" field — so the
    /// request is addressed straight back to them (§4.6 point 4).
    fn request_missing_round1(&mut self, peer_in_round2: &DeviceId) -> Vec<DkgOutput> {
        if self.round1_senders.contains(peer_in_round2) {
            return Vec::new();
        }
        let key = (peer_in_round2.clone(), ROUND1);
        if self.requested_missing.contains(&key) {
            return Vec::new();
        }
        self.requested_missing.insert(key);
        vec![DkgOutput::RequestMissingPackage {
            to: peer_in_round2.clone(),
            round: ROUND1,
        }]
    }

    /// Answers a peer's `DkgPackageRequest` for a round-1 package. Only
    /// round 1 is resendable: round-2 entries are per-recipient, so a
    /// missing one is re-requested from its actual sender, not resent from
    /// here (§4.6 point 4).
    pub fn handle_missing_package_request(
        &self,
        requester: DeviceId,
        round: u8,
    ) -> Option<DkgOutput> {
        if round != ROUND1 {
            return None;
        }
        self.own_round1_package_json
            .clone()
            .map(|package_json| DkgOutput::ResendPackage {
                to: requester,
                round: ROUND1,
                package_json,
            })
    }

    fn apply_round2(
        &mut self,
        from: DeviceId,
        raw_map: &[u8],
    ) -> Result<Vec<DkgOutput>, CoreError> {
        if self.round2_senders.contains(&from) {
            return Ok(Vec::new());
        }
        let own_entry = self.extract_own_round2_entry(raw_map)?;
        let identifier = self
            .identifier_of
            .get(&from)
            .cloned()
            .ok_or_else(|| CryptoError::Primitive(format!("unknown sender {from}")))?;
        let package: C::Round2Package =
            serde_json::from_slice(&own_entry).map_err(|e| CryptoError::Primitive(e.to_string()))?;
        self.round2_packages.insert(identifier, package);
        self.round2_senders.insert(from);
        self.last_progress = Some(Instant::now());

        if self.round2_senders.len() == self.participants.len() - 1 {
            return Ok(vec![self.finalize()?]);
        }
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Result<DkgOutput, CoreError> {
        self.state = DkgState::Finalizing;
        let round2_secret = self
            .round2_secret
            .take()
            .expect("round2 secret set at round2 start");
        let result = C::dkg_part3(&round2_secret, &self.round1_packages, &self.round2_packages);
        let (key_package, public_key_package) = match result {
            Ok(v) => v,
            Err(e) => {
                let reason = e.to_string();
                self.state = DkgState::Failed {
                    reason: reason.clone(),
                };
                return Ok(DkgOutput::Failed(reason));
            }
        };

        let verifying_key = C::verifying_key(&public_key_package);
        let group_public_key = C::serialize_verifying_key(&verifying_key)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let address = C::get_address(&verifying_key);
        let secret_share = serde_json::to_vec(&key_package)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        let public_key_package_bytes = serde_json::to_vec(&public_key_package)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;

        let key_material = KeyMaterial {
            group_public_key,
            public_key_package: public_key_package_bytes,
            secret_share: SecretBytes::new(secret_share),
            participants: self.participants.clone(),
            threshold: self.threshold,
            curve: self.curve.expect("curve set at initialize"),
            address,
        };
        self.key_material = Some(key_material.clone());
        self.state = DkgState::Complete;
        tracing::info!(address = %key_material.address, "DKG complete");
        Ok(DkgOutput::Complete(key_material))
    }

    fn replay_buffered(&mut self, round: u8) -> Result<(), CoreError> {
        let drained = self.buffer.drain_round(round);
        for entry in drained {
            if entry.from_device == self.self_id {
                continue;
            }
            match round {
                ROUND1 => {
                    self.apply_round1(entry.from_device, entry.raw_package)?;
                }
                ROUND2 => {
                    self.apply_round2(entry.from_device, &entry.raw_package)?;
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }

    /// Marks the session failed, e.g. on a participant disconnecting
    /// mid-round or the stall timeout below firing.
    pub fn fail(&mut self, reason: impl Into<String>) -> DkgOutput {
        let reason = reason.into();
        self.state = DkgState::Failed {
            reason: reason.clone(),
        };
        DkgOutput::Failed(reason)
    }

    /// Called periodically by the node loop. Fails the session if it is
    /// active and has made no progress for longer than the configured
    /// stall timeout (§5 mandatory stall timeout).
    pub fn check_stall(&mut self) -> Option<DkgOutput> {
        if !self.is_active() {
            return None;
        }
        let last_progress = self.last_progress?;
        if last_progress.elapsed() >= self.stall_timeout {
            Some(self.fail("DKG stalled past the configured timeout"))
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(
            self.self_id.clone(),
            &NodeConfig {
                auto_trigger_dkg_from_buffer: self.auto_trigger_from_buffer,
                dkg_stall_timeout: self.stall_timeout,
                ..NodeConfig::default()
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frost_primitives::Ed25519Curve;

    #[test]
    fn decode_round2_entry_accepts_bare_hex_string() {
        let value = serde_json::Value::String(hex::encode([1, 2, 3]));
        assert_eq!(decode_round2_entry(&value).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decode_round2_entry_accepts_data_keyed_object() {
        let value = serde_json::json!({"sender_index": 2, "data": hex::encode([4, 5, 6])});
        assert_eq!(decode_round2_entry(&value).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn decode_round2_entry_accepts_structured_package_object() {
        let value = serde_json::json!({"header": {"ciphersuite": "FROST-ED25519-SHA512-v1"}});
        let decoded = decode_round2_entry(&value).unwrap();
        let reparsed: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(reparsed, value);
    }

    #[test]
    fn missing_package_request_resends_stored_round1_package() {
        let config = NodeConfig::default();
        let mut engine = DkgEngine::<Ed25519Curve>::new(DeviceId::new("a"), &config);
        let a = DeviceId::new("a");
        let b = DeviceId::new("b");
        engine
            .initialize(Curve::Ed25519, vec![a, b.clone()], 2)
            .unwrap();

        let output = engine.handle_missing_package_request(b.clone(), ROUND1).unwrap();
        match output {
            DkgOutput::ResendPackage { to, round, package_json } => {
                assert_eq!(to, b);
                assert_eq!(round, ROUND1);
                assert!(!package_json.is_empty());
            }
            _ => panic!("wrong output variant"),
        }
    }

    #[test]
    fn missing_package_request_ignores_round2() {
        let config = NodeConfig::default();
        let engine = DkgEngine::<Ed25519Curve>::new(DeviceId::new("a"), &config);
        assert!(engine
            .handle_missing_package_request(DeviceId::new("b"), ROUND2)
            .is_none());
    }
}
