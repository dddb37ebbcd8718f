//! Decoded JSON responses from the license service.
//!
//! Every field defaults when absent; the service omits most of them outside
//! of a successful license response.
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Status value of a successful request.
pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseResponse {
    pub status: String,
    pub status_message: String,
    /// Base64 license (or service certificate) for the client.
    pub license: String,
    pub license_metadata: LicenseMetadata,
    pub supported_tracks: Vec<serde_json::Value>,
    pub make: String,
    pub model: String,
    pub security_level: i64,
    pub internal_status: i64,
    pub session_state: SessionState,
    pub drm_cert_serial_number: String,
    pub device_whitelist_state: String,
    pub message_type: String,
    pub platform: String,
    pub device_state: String,
    pub pssh_data: PsshData,
    pub client_max_hdcp_version: String,
    pub client_info: Vec<ClientInfo>,
    pub signature_expiration_secs: i64,
    pub platform_verification_status: String,
    pub content_owner: String,
    pub content_provider: String,
    pub system_id: i64,
    pub oem_crypto_api_version: i64,
    pub resource_rating_tier: i64,
    pub service_version_info: ServiceVersionInfo,
}

impl LicenseResponse {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Decode the base64 license blob into the bytes a CDM expects.
    pub fn license_bytes(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.license)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseMetadata {
    pub content_id: String,
    pub license_type: String,
    pub request_type: String,
}

/// Init data details returned by a parse-only request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsshData {
    /// Key IDs as sent by the service (base64).
    pub key_id: Vec<String>,
    pub content_id: String,
}

impl PsshData {
    /// Key IDs as raw bytes.
    ///
    /// Accepts base64 (the service's encoding) or 32-digit hex; entries that
    /// decode to anything other than 16 bytes are skipped.
    pub fn key_id_bytes(&self) -> Vec<[u8; 16]> {
        self.key_id
            .iter()
            .filter_map(|kid| decode_key_id(kid))
            .collect()
    }
}

pub(crate) fn decode_key_id(kid: &str) -> Option<[u8; 16]> {
    let kid = kid.trim();
    let mut out = [0u8; 16];
    if kid.len() == 32 && hex::decode_to_slice(kid, &mut out).is_ok() {
        return Some(out);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(kid).ok()?;
    if bytes.len() != out.len() {
        return None;
    }
    out.copy_from_slice(&bytes);
    Some(out)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceVersionInfo {
    pub license_sdk_version: String,
    pub license_service_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub license_id: LicenseId,
    pub signing_key: String,
    pub keybox_system_id: i64,
    pub license_counter: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseId {
    pub request_id: String,
    pub session_id: String,
    pub purchase_id: String,
    #[serde(rename = "type")]
    pub license_type: String,
    pub version: i64,
}
