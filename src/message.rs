//! License request messages sent inside a signed envelope.
use serde::{Deserialize, Serialize};

/// Certificate and parse-only requests: just the client payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMessage {
    /// Base64 of the client's request bytes.
    pub payload: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_only: bool,
}

/// Full license request built by a license authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Base64 of the client's license request.
    pub payload: String,
    pub provider: String,
    pub content_id: String,
    pub allowed_track_types: AllowedTrackType,
    pub content_key_specs: Vec<ContentKeySpec>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sd_only_for_l3: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_overrides: Option<PolicyOverrides>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_policy_overrides_exclusively: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_init: Option<SessionInit>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_iv: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id_msg: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_unverified_platform: bool,
}

/// Highest track type a license may unlock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowedTrackType {
    #[default]
    #[serde(rename = "SD_ONLY")]
    SdOnly,
    #[serde(rename = "SD_HD")]
    SdHd,
    #[serde(rename = "SD_UHD1")]
    SdUhd1,
    #[serde(rename = "SD_UHD2")]
    SdUhd2,
}

/// Key material for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentKeySpec {
    pub track_type: ContentTrackType,
    #[serde(default)]
    pub security_level: SecurityLevel,
    /// Base64 key ID.
    pub key_id: String,
    /// Base64 content key.
    pub key: String,
    /// Base64 IV.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iv: String,
    #[serde(rename = "required_output_protection", default)]
    pub output_protection: OutputProtection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentTrackType {
    Audio,
    Sd,
    Hd,
    Uhd1,
    Uhd2,
}

/// Widevine robustness level, serialized as its numeric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum SecurityLevel {
    /// Software-based whitebox crypto.
    #[default]
    SoftwareSecureCrypto = 1,
    /// Software crypto and an obfuscated decoder.
    SoftwareSecureDecode = 2,
    /// Key material and crypto inside a hardware backed TEE.
    HardwareSecureCrypto = 3,
    /// Crypto and decoding inside a hardware backed TEE.
    HardwareSecureDecode = 4,
    /// All media handling inside a hardware backed TEE.
    HardwareSecureAll = 5,
}

impl From<SecurityLevel> for u32 {
    fn from(level: SecurityLevel) -> Self {
        level as u32
    }
}

impl TryFrom<u32> for SecurityLevel {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(SecurityLevel::SoftwareSecureCrypto),
            2 => Ok(SecurityLevel::SoftwareSecureDecode),
            3 => Ok(SecurityLevel::HardwareSecureCrypto),
            4 => Ok(SecurityLevel::HardwareSecureDecode),
            5 => Ok(SecurityLevel::HardwareSecureAll),
            other => Err(format!("invalid security level {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputProtection {
    #[serde(default)]
    pub cgms_flags: CgmsFlags,
    #[serde(default)]
    pub disable_analog_output: bool,
    #[serde(default)]
    pub hdcp: HdcpVersion,
    #[serde(default)]
    pub hdcp_srm_rule: HdcpSrmRule,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CgmsFlags {
    #[default]
    #[serde(rename = "CGMS_NONE")]
    None,
    #[serde(rename = "COPY_FREE")]
    CopyFree,
    #[serde(rename = "COPY_ONCE")]
    CopyOnce,
    #[serde(rename = "COPY_NEVER")]
    CopyNever,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HdcpVersion {
    #[default]
    #[serde(rename = "HDCP_NONE")]
    None,
    #[serde(rename = "HDCP_V1")]
    V1,
    #[serde(rename = "HDCP_V2")]
    V2,
    #[serde(rename = "HDCP_V2_1")]
    V2_1,
    #[serde(rename = "HDCP_V2_2")]
    V2_2,
    #[serde(rename = "HDCP_NO_DIGITAL_OUTPUT")]
    NoDigitalOutput,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HdcpSrmRule {
    #[default]
    #[serde(rename = "HDCP_SRM_RULE_NONE")]
    None,
    #[serde(rename = "CURRENT_SRM")]
    CurrentSrm,
}

/// Playback policy that overrides the provider defaults.
///
/// Durations are in seconds; 0 means unlimited. Renewal fields only apply
/// when `can_renew` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default = "default_true")]
    pub can_play: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub can_persist: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub can_renew: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub license_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rental_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub playback_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub time_shift_limit_seconds: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub renewal_server_url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub renewal_delay_seconds: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub renewal_retry_interval_seconds: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub renewal_recovery_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub renew_with_usage: bool,
    /// Renewal and release requests must carry the client id.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub always_include_client_id: bool,
}

impl Default for PolicyOverrides {
    fn default() -> Self {
        Self {
            can_play: true,
            can_persist: false,
            can_renew: false,
            license_duration_seconds: 0,
            rental_duration_seconds: 0,
            playback_duration_seconds: 0,
            time_shift_limit_seconds: 0,
            renewal_server_url: String::new(),
            renewal_delay_seconds: 0,
            renewal_retry_interval_seconds: 0,
            renewal_recovery_duration_seconds: 0,
            renew_with_usage: false,
            always_include_client_id: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    /// Only honoured by the Chrome CDM with persistent state enabled.
    pub provider_client_token: String,
    #[serde(default)]
    pub override_provider_client_token: bool,
    /// Carried into every renewal of this license.
    pub session_id: String,
}

fn default_true() -> bool {
    true
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        AllowedTrackType, ContentKeySpec, ContentTrackType, HdcpVersion, Message,
        OutputProtection, PayloadMessage, PolicyOverrides, SecurityLevel,
    };

    #[test]
    fn payload_message_omits_parse_only_when_unset() {
        let certificate = PayloadMessage {
            payload: "CAQ=".to_string(),
            parse_only: false,
        };
        assert_eq!(
            serde_json::to_value(&certificate).unwrap(),
            json!({ "payload": "CAQ=" })
        );

        let parse = PayloadMessage {
            parse_only: true,
            ..certificate
        };
        assert_eq!(
            serde_json::to_value(&parse).unwrap(),
            json!({ "payload": "CAQ=", "parse_only": true })
        );
    }

    #[test]
    fn license_message_wire_shape() {
        let message = Message {
            payload: "cGF5bG9hZA==".to_string(),
            provider: "widevine_test".to_string(),
            content_id: "Y29udGVudA==".to_string(),
            allowed_track_types: AllowedTrackType::SdHd,
            content_key_specs: vec![ContentKeySpec {
                track_type: ContentTrackType::Hd,
                security_level: SecurityLevel::HardwareSecureCrypto,
                key_id: "a2lk".to_string(),
                key: "a2V5".to_string(),
                iv: String::new(),
                output_protection: OutputProtection {
                    hdcp: HdcpVersion::V2_2,
                    ..Default::default()
                },
            }],
            policy_overrides: Some(PolicyOverrides {
                license_duration_seconds: 3600,
                ..Default::default()
            }),
            ..Default::default()
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "payload": "cGF5bG9hZA==",
                "provider": "widevine_test",
                "content_id": "Y29udGVudA==",
                "allowed_track_types": "SD_HD",
                "content_key_specs": [{
                    "track_type": "HD",
                    "security_level": 3,
                    "key_id": "a2lk",
                    "key": "a2V5",
                    "required_output_protection": {
                        "cgms_flags": "CGMS_NONE",
                        "disable_analog_output": false,
                        "hdcp": "HDCP_V2_2",
                        "hdcp_srm_rule": "HDCP_SRM_RULE_NONE"
                    }
                }],
                "policy_overrides": {
                    "can_play": true,
                    "license_duration_seconds": 3600
                }
            })
        );
    }

    #[test]
    fn security_level_rejects_unknown_values() {
        assert!(serde_json::from_value::<SecurityLevel>(json!(9)).is_err());
        assert_eq!(
            serde_json::from_value::<SecurityLevel>(json!(5)).unwrap(),
            SecurityLevel::HardwareSecureAll
        );
    }
}
