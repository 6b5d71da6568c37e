//! End-to-end tests driving the DKG and signing engines the way a node's
//! event loop would: every wire message is serialized, handed to the
//! peer engine, and any effect that needs rebroadcasting is fed back in.

use frost_primitives::{Ed25519Curve, FrostCurve, Secp256k1Curve};
use mesh_core::config::NodeConfig;
use mesh_core::dkg::{DkgEngine, DkgOutput};
use mesh_core::signing::{SigningEngine, SigningOutput};
use mesh_core::types::{Curve, DeviceId, KeyMaterial};
use std::collections::HashMap;

fn devices(n: usize) -> Vec<DeviceId> {
    (0..n).map(|i| DeviceId::new(format!("d{i}"))).collect()
}

/// Drives a full DKG to completion across `n` in-process engines and
/// returns each device's resulting `KeyMaterial`.
fn run_dkg<C: FrostCurve>(curve: Curve, ids: &[DeviceId], threshold: u16) -> HashMap<DeviceId, KeyMaterial> {
    let config = NodeConfig::default();
    let mut engines: HashMap<DeviceId, DkgEngine<C>> = ids
        .iter()
        .map(|id| (id.clone(), DkgEngine::<C>::new(id.clone(), &config)))
        .collect();

    let mut round1_packages: HashMap<DeviceId, Vec<u8>> = HashMap::new();
    for id in ids {
        let engine = engines.get_mut(id).unwrap();
        match engine.initialize(curve, ids.to_vec(), threshold).unwrap() {
            DkgOutput::BroadcastRound1 { package_json } => {
                round1_packages.insert(id.clone(), package_json);
            }
            _ => panic!("initialize must broadcast round1"),
        }
    }

    let mut round2_maps: HashMap<DeviceId, Vec<u8>> = HashMap::new();
    for sender in ids {
        let package = round1_packages.get(sender).unwrap().clone();
        for recipient in ids {
            if recipient == sender {
                continue;
            }
            let engine = engines.get_mut(recipient).unwrap();
            if let Some(DkgOutput::BroadcastRound2 { map_json }) =
                engine.add_round1_package(sender.clone(), package.clone()).unwrap()
            {
                round2_maps.insert(recipient.clone(), map_json);
            }
        }
    }
    assert_eq!(round2_maps.len(), ids.len(), "every device reaches round 2");

    let mut results: HashMap<DeviceId, KeyMaterial> = HashMap::new();
    for sender in ids {
        let map = round2_maps.get(sender).unwrap().clone();
        for recipient in ids {
            if recipient == sender {
                continue;
            }
            let engine = engines.get_mut(recipient).unwrap();
            for output in engine.add_round2_package(sender.clone(), map.clone()).unwrap() {
                if let DkgOutput::Complete(key_material) = output {
                    results.insert(recipient.clone(), key_material);
                }
            }
        }
    }
    results
}

#[test]
fn dkg_happy_path_ed25519_produces_matching_solana_addresses() {
    let ids = devices(3);
    let results = run_dkg::<Ed25519Curve>(Curve::Ed25519, &ids, 2);
    assert_eq!(results.len(), 3);

    let addresses: Vec<&str> = results.values().map(|k| k.address.as_str()).collect();
    assert!(addresses.windows(2).all(|w| w[0] == w[1]));

    let re = regex_lite_check(addresses[0]);
    assert!(re, "address {} is not base58 Solana-shaped", addresses[0]);
}

#[test]
fn dkg_happy_path_secp256k1_produces_matching_eth_addresses() {
    let ids = devices(3);
    let results = run_dkg::<Secp256k1Curve>(Curve::Secp256k1, &ids, 2);
    assert_eq!(results.len(), 3);

    for key_material in results.values() {
        assert!(key_material.address.starts_with("0x"));
        assert_eq!(key_material.address.len(), 42);
        assert!(key_material.address[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }
    let group_keys: Vec<&Vec<u8>> = results.values().map(|k| &k.group_public_key).collect();
    assert!(group_keys.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn dkg_boundary_two_of_two() {
    let ids = devices(2);
    let results = run_dkg::<Ed25519Curve>(Curve::Ed25519, &ids, 2);
    assert_eq!(results.len(), 2);
}

#[test]
fn dkg_boundary_threshold_equals_total() {
    let ids = devices(4);
    let results = run_dkg::<Ed25519Curve>(Curve::Ed25519, &ids, 4);
    assert_eq!(results.len(), 4);
}

#[test]
fn dkg_tolerates_round2_arriving_before_round1() {
    let ids = devices(3);
    let config = NodeConfig::default();
    let mut engines: HashMap<DeviceId, DkgEngine<Ed25519Curve>> = ids
        .iter()
        .map(|id| (id.clone(), DkgEngine::<Ed25519Curve>::new(id.clone(), &config)))
        .collect();

    let mut round1_packages: HashMap<DeviceId, Vec<u8>> = HashMap::new();
    for id in &ids {
        match engines
            .get_mut(id)
            .unwrap()
            .initialize(Curve::Ed25519, ids.clone(), 2)
            .unwrap()
        {
            DkgOutput::BroadcastRound1 { package_json } => {
                round1_packages.insert(id.clone(), package_json);
            }
            _ => panic!(),
        }
    }

    // d2's round1 package is delivered to d0 and d1 *after* a round2 map
    // that depends on it, exercising the missing-package buffering path.
    let a = &ids[0];
    let b = &ids[1];
    let c = &ids[2];

    for (sender, recipient) in [(a, b), (b, a)] {
        let package = round1_packages.get(sender).unwrap().clone();
        engines
            .get_mut(recipient)
            .unwrap()
            .add_round1_package(sender.clone(), package)
            .unwrap();
    }
    // Neither a nor b has c's round1 package yet, so both remain in
    // Round1InProgress, waiting on c.
    assert!(matches!(
        engines.get(a).unwrap().state(),
        mesh_core::types::DkgState::Round1InProgress
    ));

    // Deliver c's round1 package now; both a and b should move into round2.
    let c_package = round1_packages.get(c).unwrap().clone();
    let mut round2_maps: HashMap<DeviceId, Vec<u8>> = HashMap::new();
    for recipient in [a, b] {
        if let Some(DkgOutput::BroadcastRound2 { map_json }) = engines
            .get_mut(recipient)
            .unwrap()
            .add_round1_package(c.clone(), c_package.clone())
            .unwrap()
        {
            round2_maps.insert(recipient.clone(), map_json);
        }
    }
    assert_eq!(round2_maps.len(), 2);
}

fn run_signing<C: FrostCurve>(
    participants: &[DeviceId],
    key_materials: &HashMap<DeviceId, KeyMaterial>,
    initiator: &DeviceId,
    threshold: u16,
    tx: Vec<u8>,
) -> Option<String> {
    let config = NodeConfig::default();
    let mut engines: HashMap<DeviceId, SigningEngine<C>> = participants
        .iter()
        .map(|id| (id.clone(), SigningEngine::<C>::new(id.clone(), &config)))
        .collect();

    let signing_id = "sign-1";
    let init_km = key_materials.get(initiator).unwrap();
    let request = match engines
        .get_mut(initiator)
        .unwrap()
        .propose(signing_id, tx.clone(), init_km)
        .unwrap()
    {
        SigningOutput::BroadcastRequest {
            required_signers, ..
        } => required_signers,
        _ => panic!(),
    };
    assert_eq!(request, threshold);

    let mut acceptances: Vec<DeviceId> = Vec::new();
    for id in participants {
        if id == initiator {
            continue;
        }
        let km = key_materials.get(id).unwrap();
        match engines
            .get_mut(id)
            .unwrap()
            .handle_request(signing_id, initiator.clone(), tx.clone(), threshold, km)
            .unwrap()
        {
            SigningOutput::SendAcceptance { accepted, .. } => {
                if accepted {
                    acceptances.push(id.clone());
                }
            }
            _ => panic!(),
        }
    }

    let mut selection: Option<Vec<DeviceId>> = None;
    for from in acceptances {
        if let Some(SigningOutput::BroadcastSelection { selected_signers, .. }) = engines
            .get_mut(initiator)
            .unwrap()
            .handle_acceptance(from, signing_id, true)
            .unwrap()
        {
            selection = Some(selected_signers);
        }
    }
    let selected = selection.expect("threshold reached, selection must occur");

    let mut commitments: HashMap<DeviceId, Vec<u8>> = HashMap::new();
    for id in &selected {
        let km = key_materials.get(id).unwrap();
        if let Some(SigningOutput::BroadcastCommitment { commitment_json, .. }) = engines
            .get_mut(id)
            .unwrap()
            .handle_selection(signing_id, selected.clone(), km)
            .unwrap()
        {
            commitments.insert(id.clone(), commitment_json);
        }
    }
    // Non-selected participants still observe the selection, as spectators.
    for id in participants {
        if !selected.contains(id) {
            let km = key_materials.get(id).unwrap();
            engines
                .get_mut(id)
                .unwrap()
                .handle_selection(signing_id, selected.clone(), km)
                .unwrap();
        }
    }

    let mut shares: HashMap<DeviceId, Vec<u8>> = HashMap::new();
    for sender in &selected {
        let commitment = commitments.get(sender).unwrap().clone();
        for recipient in &selected {
            if recipient == sender {
                continue;
            }
            let km = key_materials.get(recipient).unwrap();
            if let Some(SigningOutput::BroadcastShare { share_json, .. }) = engines
                .get_mut(recipient)
                .unwrap()
                .handle_commitment(sender.clone(), signing_id, &commitment, km)
                .unwrap()
            {
                shares.insert(recipient.clone(), share_json);
            }
        }
    }

    let mut signature_hex = None;
    for sender in &selected {
        let share = shares.get(sender).unwrap().clone();
        for recipient in &selected {
            if recipient == sender {
                continue;
            }
            let km = key_materials.get(recipient).unwrap();
            if let Some(SigningOutput::BroadcastSignature { signature_hex: sig, .. }) = engines
                .get_mut(recipient)
                .unwrap()
                .handle_share(sender.clone(), signing_id, &share, km)
                .unwrap()
            {
                signature_hex = Some(sig);
            }
        }
    }
    signature_hex
}

#[test]
fn signing_happy_path_ed25519_produces_a_verifiable_signature() {
    let ids = devices(3);
    let key_materials = run_dkg::<Ed25519Curve>(Curve::Ed25519, &ids, 2);
    let signature = run_signing::<Ed25519Curve>(&ids, &key_materials, &ids[0], 2, b"transfer 1 SOL".to_vec());
    let signature = signature.expect("signing must complete");
    assert_eq!(signature.len(), 128, "ed25519 frost signatures are 64 raw bytes / 128 hex chars");
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn signing_rejection_blocks_selection() {
    let ids = devices(3);
    let key_materials = run_dkg::<Ed25519Curve>(Curve::Ed25519, &ids, 3);
    let config = NodeConfig::default();
    let mut engines: HashMap<DeviceId, SigningEngine<Ed25519Curve>> = ids
        .iter()
        .map(|id| (id.clone(), SigningEngine::<Ed25519Curve>::new(id.clone(), &config)))
        .collect();

    let initiator = &ids[0];
    let signing_id = "sign-reject";
    engines
        .get_mut(initiator)
        .unwrap()
        .propose(signing_id, b"tx".to_vec(), key_materials.get(initiator).unwrap())
        .unwrap();

    // ids[1] accepts, ids[2] declines; threshold 3 can never be reached.
    let accept_km = key_materials.get(&ids[1]).unwrap();
    engines
        .get_mut(&ids[1])
        .unwrap()
        .handle_request(signing_id, initiator.clone(), b"tx".to_vec(), 3, accept_km)
        .unwrap();
    let result = engines
        .get_mut(initiator)
        .unwrap()
        .handle_acceptance(ids[1].clone(), signing_id, true)
        .unwrap();
    assert!(result.is_none(), "threshold not yet reached");

    let result = engines
        .get_mut(initiator)
        .unwrap()
        .handle_acceptance(ids[2].clone(), signing_id, false)
        .unwrap();
    assert!(result.is_none());

    // Caller observes the stall and fails the session explicitly.
    let output = engines.get_mut(initiator).unwrap().fail("acceptance timed out");
    assert!(matches!(output, SigningOutput::Failed(_)));
    assert!(matches!(
        engines.get(initiator).unwrap().state(),
        mesh_core::types::SigningState::Failed { .. }
    ));
}

fn regex_lite_check(address: &str) -> bool {
    let len_ok = (32..=44).contains(&address.len());
    let alphabet_ok = address
        .chars()
        .all(|c| c.is_ascii_alphanumeric() && c != '0' && c != 'O' && c != 'I' && c != 'l');
    len_ok && alphabet_ok
}
