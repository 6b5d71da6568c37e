use crate::errors::{FrostError, Result};
use serde::{Deserialize, Serialize};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Keystore data structure that's compatible between CLI and browser extension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreData {
    // Core data for FROST protocol
    pub key_package: String,  // Base64 encoded
    pub public_key_package: String,  // Base64 encoded
    pub min_signers: u16,
    pub max_signers: u16,
    pub participant_index: u16,
    pub participant_indices: Vec<u16>,
    pub curve: String,  // "secp256k1" or "ed25519"
    
    // Additional fields for UI/management
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// High-level keystore abstraction
pub struct Keystore;

impl Keystore {
    /// Export keystore data in a format compatible with both CLI and browser
    pub fn export_keystore<C: crate::traits::FrostCurve>(
        key_package: &C::KeyPackage,
        public_key_package: &C::PublicKeyPackage,
        min_signers: u16,
        max_signers: u16,
        participant_index: u16,
        participant_indices: Vec<u16>,
        curve: &str,
    ) -> Result<KeystoreData> {
        let key_package_bytes = serde_json::to_vec(key_package)
            .map_err(|e| FrostError::SerializationError(e.to_string()))?;
        let public_key_package_bytes = serde_json::to_vec(public_key_package)
            .map_err(|e| FrostError::SerializationError(e.to_string()))?;
        
        Ok(KeystoreData {
            key_package: BASE64.encode(&key_package_bytes),
            public_key_package: BASE64.encode(&public_key_package_bytes),
            min_signers,
            max_signers,
            participant_index,
            participant_indices,
            curve: curve.to_string(),
            wallet_id: None,
            device_id: None,
            device_name: None,
            session_id: None,
            timestamp: None,
        })
    }
    
    /// Import keystore data and deserialize the packages
    pub fn import_keystore<C: crate::traits::FrostCurve>(
        keystore_data: &KeystoreData,
    ) -> Result<(C::KeyPackage, C::PublicKeyPackage)> {
        let key_package_bytes = BASE64.decode(&keystore_data.key_package)
            .map_err(|e| FrostError::SerializationError(format!("Failed to decode key package: {}", e)))?;
        let public_key_package_bytes = BASE64.decode(&keystore_data.public_key_package)
            .map_err(|e| FrostError::SerializationError(format!("Failed to decode public key package: {}", e)))?;
        
        let key_package: C::KeyPackage = serde_json::from_slice(&key_package_bytes)
            .map_err(|e| FrostError::SerializationError(format!("Failed to deserialize key package: {}", e)))?;
        let public_key_package: C::PublicKeyPackage = serde_json::from_slice(&public_key_package_bytes)
            .map_err(|e| FrostError::SerializationError(format!("Failed to deserialize public key package: {}", e)))?;
        
        Ok((key_package, public_key_package))
    }
}