//! Config-backed license authority.
use std::collections::HashSet;

use base64::Engine;

use crate::config::{decode_hex_field, ContentEntry, PolicyConfig, ProxyConfig};
use crate::error::{Error, Result};
use crate::message::{ContentKeySpec, Message};
use crate::proxy::LicenseAuthority;
use crate::pssh::PsshSummary;
use crate::response::PsshData;

/// [`LicenseAuthority`] serving keys from a static content catalog.
#[derive(Debug, Clone)]
pub struct StaticAuthority {
    license_server_url: String,
    provider: String,
    signing_key: Vec<u8>,
    signing_iv: Vec<u8>,
    policy: PolicyConfig,
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    content_id: Option<String>,
    key_ids: HashSet<[u8; 16]>,
    key_specs: Vec<ContentKeySpec>,
}

impl CatalogEntry {
    fn from_config(entry: &ContentEntry) -> Result<Self> {
        let b64 = &base64::engine::general_purpose::STANDARD;
        let mut key_ids = HashSet::new();
        let mut key_specs = Vec::with_capacity(entry.keys.len());

        for key in entry.keys.iter() {
            let kid = decode_hex_field("key_id", &key.key_id)?;
            let kid: [u8; 16] = kid
                .as_slice()
                .try_into()
                .map_err(|_| Error::Config(format!("key_id {} is not 16 bytes", key.key_id)))?;
            key_ids.insert(kid);

            let iv = match key.iv.as_deref() {
                Some(iv) => b64.encode(decode_hex_field("iv", iv)?),
                None => String::new(),
            };
            key_specs.push(ContentKeySpec {
                track_type: key.track_type,
                security_level: key.security_level,
                key_id: b64.encode(kid),
                key: b64.encode(decode_hex_field("key", &key.key)?),
                iv,
                output_protection: key.required_output_protection.clone(),
            });
        }

        if let Some(pssh) = entry.pssh.as_deref() {
            let summary = PsshSummary::from_base64(pssh)?;
            key_ids.extend(summary.key_id_bytes());
        }

        Ok(Self {
            content_id: entry.content_id.clone(),
            key_ids,
            key_specs,
        })
    }

    fn matches_content_id(&self, content_id: &str) -> bool {
        let Some(own) = self.content_id.as_deref() else {
            return false;
        };
        if content_id.is_empty() {
            return false;
        }
        if own == content_id {
            return true;
        }
        // The service reports content IDs base64 encoded.
        base64::engine::general_purpose::STANDARD
            .decode(content_id)
            .map(|raw| raw == own.as_bytes())
            .unwrap_or(false)
    }
}

impl StaticAuthority {
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let catalog = config
            .content
            .iter()
            .map(CatalogEntry::from_config)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            license_server_url: config.license_server_url.clone(),
            provider: config.provider.clone(),
            signing_key: config.signing_key_bytes()?,
            signing_iv: config.signing_iv_bytes()?,
            policy: config.policy.clone(),
            catalog,
        })
    }

    fn find_entry(&self, pssh_data: &PsshData) -> Option<&CatalogEntry> {
        let requested = pssh_data.key_id_bytes();
        self.catalog
            .iter()
            .find(|entry| requested.iter().any(|kid| entry.key_ids.contains(kid)))
            .or_else(|| {
                self.catalog
                    .iter()
                    .find(|entry| entry.matches_content_id(&pssh_data.content_id))
            })
    }
}

impl LicenseAuthority for StaticAuthority {
    fn build_license_message(&self, body: &[u8], pssh_data: &PsshData) -> Result<Message> {
        let b64 = &base64::engine::general_purpose::STANDARD;

        let entry = self.find_entry(pssh_data).ok_or_else(|| {
            let kids = pssh_data
                .key_id_bytes()
                .iter()
                .map(hex::encode)
                .collect::<Vec<_>>()
                .join(", ");
            Error::Authority(format!(
                "no content for key ids [{}] content id {:?}",
                kids, pssh_data.content_id
            ))
        })?;

        let content_id = if !pssh_data.content_id.is_empty() {
            pssh_data.content_id.clone()
        } else {
            entry
                .content_id
                .as_deref()
                .map(|id| b64.encode(id))
                .unwrap_or_default()
        };
        debug!(
            "Building license for content {:?} with {} key(s)",
            content_id,
            entry.key_specs.len()
        );

        Ok(Message {
            payload: b64.encode(body),
            provider: self.provider.clone(),
            content_id,
            allowed_track_types: self.policy.allowed_track_types,
            content_key_specs: entry.key_specs.clone(),
            sd_only_for_l3: self.policy.sd_only_for_l3,
            policy_overrides: self.policy.policy_overrides.clone(),
            use_policy_overrides_exclusively: self.policy.use_policy_overrides_exclusively,
            allow_unverified_platform: self.policy.allow_unverified_platform,
            ..Default::default()
        })
    }

    fn license_server_url(&self) -> &str {
        &self.license_server_url
    }

    fn signing_key(&self) -> &[u8] {
        &self.signing_key
    }

    fn signing_iv(&self) -> &[u8] {
        &self.signing_iv
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::StaticAuthority;
    use crate::config::ProxyConfig;
    use crate::error::Error;
    use crate::message::{AllowedTrackType, ContentTrackType, SecurityLevel};
    use crate::proxy::LicenseAuthority;
    use crate::response::PsshData;

    const CONFIG: &str = "
license_server_url: http://localhost/getlicense
provider: widevine_test
signing_key: 1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9
signing_iv: d58ce954203b7c9a9a9d467f59839249
policy:
  allowed_track_types: SD_HD
  sd_only_for_l3: true
content:
  - content_id: widevine_test
    pssh: AAAAOHBzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAABgSEJPkt/Dij+qHMEpog1vObHFI49yVmwY=
    keys:
      - key_id: 00000000000000000000000000000001
        key: 00112233445566778899aabbccddeeff
        track_type: SD
      - key_id: 00000000000000000000000000000002
        key: ffeeddccbbaa99887766554433221100
        iv: 000102030405060708090a0b0c0d0e0f
        track_type: HD
        security_level: 3
  - content_id: other_title
    keys:
      - key_id: 0000000000000000000000000000000a
        key: 0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a
        track_type: AUDIO
";

    fn authority() -> StaticAuthority {
        let config = ProxyConfig::from_yaml_str(CONFIG).expect("config");
        StaticAuthority::from_config(&config).expect("authority")
    }

    fn pssh_data(key_ids: &[&str], content_id: &str) -> PsshData {
        PsshData {
            key_id: key_ids.iter().map(|k| k.to_string()).collect(),
            content_id: content_id.to_string(),
        }
    }

    #[test]
    fn signing_material_comes_from_config() {
        let authority = authority();
        assert_eq!(authority.provider(), "widevine_test");
        assert_eq!(authority.license_server_url(), "http://localhost/getlicense");
        assert_eq!(authority.signing_key().len(), 32);
        assert_eq!(authority.signing_iv().len(), 16);
    }

    #[test]
    fn matches_key_id_from_entry_pssh() {
        // 93e4b7f0e28fea87304a68835bce6c71 is only carried by the entry's PSSH.
        let message = authority()
            .build_license_message(b"\x08\x01", &pssh_data(&["k+S38OKP6ocwSmiDW85scQ=="], ""))
            .expect("message");

        assert_eq!(message.payload, "CAE=");
        assert_eq!(message.provider, "widevine_test");
        assert_eq!(message.content_id, "d2lkZXZpbmVfdGVzdA==");
        assert_eq!(message.allowed_track_types, AllowedTrackType::SdHd);
        assert!(message.sd_only_for_l3);
        assert_eq!(message.content_key_specs.len(), 2);

        let hd = &message.content_key_specs[1];
        assert_eq!(hd.track_type, ContentTrackType::Hd);
        assert_eq!(hd.security_level, SecurityLevel::HardwareSecureCrypto);
        assert_eq!(hd.key_id, "AAAAAAAAAAAAAAAAAAAAAg==");
        assert_eq!(hd.iv, "AAECAwQFBgcICQoLDA0ODw==");
        assert!(message.content_key_specs[0].iv.is_empty());
    }

    #[test]
    fn matches_explicit_hex_key_id() {
        let message = authority()
            .build_license_message(
                b"req",
                &pssh_data(&["0000000000000000000000000000000a"], "b3RoZXJfdGl0bGU="),
            )
            .expect("message");
        assert_eq!(message.content_id, "b3RoZXJfdGl0bGU=");
        assert_eq!(message.content_key_specs.len(), 1);
        assert_eq!(
            message.content_key_specs[0].track_type,
            ContentTrackType::Audio
        );
    }

    #[test]
    fn falls_back_to_content_id() {
        let message = authority()
            .build_license_message(b"req", &pssh_data(&[], "b3RoZXJfdGl0bGU="))
            .expect("message");
        assert_eq!(message.content_key_specs.len(), 1);

        let message = authority()
            .build_license_message(b"req", &pssh_data(&[], "widevine_test"))
            .expect("message");
        assert_eq!(message.content_key_specs.len(), 2);
    }

    #[test]
    fn unknown_content_is_authority_error() {
        let err = authority()
            .build_license_message(
                b"req",
                &pssh_data(&["ffffffffffffffffffffffffffffffff"], "bm9wZQ=="),
            )
            .expect_err("no entry");
        assert!(
            matches!(&err, Error::Authority(msg) if msg.contains("ffffffffffffffffffffffffffffffff"))
        );
    }
}
