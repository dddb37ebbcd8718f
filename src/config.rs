//! Proxy configuration loaded from YAML.
//!
//! ```yaml
//! license_server_url: https://license.uat.widevine.com/cenc/getlicense/widevine_test
//! provider: widevine_test
//! signing_key: 1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9
//! signing_iv: d58ce954203b7c9a9a9d467f59839249
//! policy:
//!   allowed_track_types: SD_HD
//! content:
//!   - content_id: widevine_test
//!     pssh: AAAAOHBzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAABgSEJPkt/Dij+qHMEpog1vObHFI49yVmwY=
//!     keys:
//!       - key_id: 93e4b7f0e28fea87304a68835bce6c71
//!         key: 00112233445566778899aabbccddeeff
//!         track_type: SD
//! ```
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::message::{
    AllowedTrackType, ContentTrackType, OutputProtection, PolicyOverrides, SecurityLevel,
};
use crate::pssh::PsshSummary;

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub license_server_url: String,
    /// Provider name, also used as the envelope signer.
    pub provider: String,
    /// Hex AES key used to sign requests.
    pub signing_key: String,
    /// Hex CBC IV used to sign requests.
    pub signing_iv: String,
    #[serde(default = "default_certificate_threshold")]
    pub certificate_threshold: usize,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
    #[serde(default)]
    pub serve: ServeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            request_secs: default_request_secs(),
        }
    }
}

/// License policy applied to every license message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allowed_track_types: AllowedTrackType,
    #[serde(default)]
    pub sd_only_for_l3: bool,
    #[serde(default)]
    pub policy_overrides: Option<PolicyOverrides>,
    #[serde(default)]
    pub use_policy_overrides_exclusively: bool,
    #[serde(default)]
    pub allow_unverified_platform: bool,
}

/// One piece of content and its keys.
///
/// A request matches the entry when one of its key IDs is listed in `keys`
/// or carried by `pssh`, or when its content ID equals `content_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    #[serde(default)]
    pub content_id: Option<String>,
    /// Base64 PSSH box as emitted by the packager.
    #[serde(default)]
    pub pssh: Option<String>,
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyEntry {
    /// Hex key ID.
    pub key_id: String,
    /// Hex content key.
    pub key: String,
    pub track_type: ContentTrackType,
    /// Hex IV.
    #[serde(default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub required_output_protection: OutputProtection,
}

/// HTTP front end access control.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServeConfig {
    /// Map of secret key to user. Empty means no authentication.
    #[serde(default)]
    pub users: HashMap<String, ServeUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServeUser {
    /// Optional display name used in logs.
    pub username: Option<String>,
}

impl ProxyConfig {
    /// Load and validate a YAML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&yaml)
    }

    /// Parse and validate a YAML config document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Decoded signing key.
    pub fn signing_key_bytes(&self) -> Result<Vec<u8>> {
        decode_hex_field("signing_key", &self.signing_key)
    }

    /// Decoded signing IV.
    pub fn signing_iv_bytes(&self) -> Result<Vec<u8>> {
        decode_hex_field("signing_iv", &self.signing_iv)
    }

    /// Check everything that would otherwise only fail on the first request.
    pub fn validate(&self) -> Result<()> {
        if self.license_server_url.trim().is_empty() {
            return Err(Error::Config("license_server_url is empty".to_string()));
        }
        if self.provider.trim().is_empty() {
            return Err(Error::Config("provider is empty".to_string()));
        }

        let key = self.signing_key_bytes()?;
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(Error::Config(format!(
                "signing_key must be 16, 24 or 32 bytes, got {}",
                key.len()
            )));
        }
        let iv = self.signing_iv_bytes()?;
        if iv.len() != 16 {
            return Err(Error::Config(format!(
                "signing_iv must be 16 bytes, got {}",
                iv.len()
            )));
        }

        if self.timeouts.connect_secs == 0 || self.timeouts.request_secs == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }

        for (i, entry) in self.content.iter().enumerate() {
            if let Some(pssh) = entry.pssh.as_deref() {
                PsshSummary::from_base64(pssh)
                    .map_err(|e| Error::Config(format!("content[{}].pssh: {}", i, e)))?;
            }
            if entry.keys.is_empty() {
                return Err(Error::Config(format!("content[{}] has no keys", i)));
            }
            for key in entry.keys.iter() {
                let kid = decode_hex_field("key_id", &key.key_id)?;
                if kid.len() != 16 {
                    return Err(Error::Config(format!(
                        "content[{}] key_id {} is not 16 bytes",
                        i, key.key_id
                    )));
                }
                decode_hex_field("key", &key.key)?;
                if let Some(iv) = key.iv.as_deref() {
                    decode_hex_field("iv", iv)?;
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn decode_hex_field(name: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim()).map_err(|e| Error::Config(format!("{} is not valid hex: {}", name, e)))
}

fn default_certificate_threshold() -> usize {
    crate::proxy::Proxy::CERTIFICATE_THRESHOLD
}

fn default_connect_secs() -> u64 {
    crate::proxy::Proxy::CONNECT_TIMEOUT.as_secs()
}

fn default_request_secs() -> u64 {
    crate::proxy::Proxy::REQUEST_TIMEOUT.as_secs()
}
