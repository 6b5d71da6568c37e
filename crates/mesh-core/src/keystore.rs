//! Wallet persistence: wraps a completed DKG's `KeyMaterial` into the
//! portable, plaintext `KeystoreData` shape (§6 "persisted state").
//!
//! File encryption is out of scope here; callers that need it encrypt the
//! serialized bytes themselves before writing to disk.

use crate::error::{CoreError, CryptoError};
use crate::types::{Curve, DeviceId, KeyMaterial};
use frost_primitives::{FrostCurve, Keystore, KeystoreData};

fn curve_name(curve: Curve) -> &'static str {
    match curve {
        Curve::Ed25519 => "ed25519",
        Curve::Secp256k1 => "secp256k1",
    }
}

/// Builds the on-disk record for a completed DKG. `self_id` locates this
/// device's 1-based index within `key_material.participants`.
pub fn export_wallet_record<C: FrostCurve>(
    key_material: &KeyMaterial,
    self_id: &DeviceId,
    wallet_id: impl Into<String>,
) -> Result<KeystoreData, CoreError> {
    let key_package: C::KeyPackage = serde_json::from_slice(key_material.secret_share.as_bytes())
        .map_err(|e| CryptoError::Primitive(e.to_string()))?;
    let public_key_package: C::PublicKeyPackage =
        serde_json::from_slice(&key_material.public_key_package)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;

    let participant_index = key_material
        .participants
        .iter()
        .position(|d| d == self_id)
        .map(|i| (i + 1) as u16)
        .ok_or_else(|| CryptoError::Primitive(format!("{self_id} not a DKG participant")))?;
    let participant_indices: Vec<u16> = (1..=key_material.participants.len() as u16).collect();

    let mut data = Keystore::export_keystore::<C>(
        &key_package,
        &public_key_package,
        key_material.threshold,
        key_material.participants.len() as u16,
        participant_index,
        participant_indices,
        curve_name(key_material.curve),
    )
    .map_err(|e| CryptoError::Primitive(e.to_string()))?;

    data.wallet_id = Some(wallet_id.into());
    data.device_id = Some(self_id.to_string());
    Ok(data)
}

/// Recovers the curve-typed key/public-key packages from a persisted record.
pub fn import_wallet_record<C: FrostCurve>(
    data: &KeystoreData,
) -> Result<(C::KeyPackage, C::PublicKeyPackage), CoreError> {
    Keystore::import_keystore::<C>(data).map_err(|e| CryptoError::Primitive(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecretBytes;
    use frost_primitives::Ed25519Curve;

    fn sample_key_material() -> KeyMaterial {
        KeyMaterial {
            group_public_key: vec![1, 2, 3],
            public_key_package: b"not-real-json".to_vec(),
            secret_share: SecretBytes::new(b"not-real-json".to_vec()),
            participants: vec![DeviceId::new("a"), DeviceId::new("b")],
            threshold: 2,
            curve: Curve::Ed25519,
            address: "addr".to_string(),
        }
    }

    #[test]
    fn unknown_device_is_rejected() {
        let key_material = sample_key_material();
        let err =
            export_wallet_record::<Ed25519Curve>(&key_material, &DeviceId::new("z"), "w1").unwrap_err();
        assert!(matches!(err, CoreError::Crypto(_)));
    }
}
