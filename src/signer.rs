//! Request signing and envelope packing.
//!
//! The license service authenticates a request by decrypting its signature
//! with the provider's signing key and comparing the result against the
//! SHA-1 digest of the request bytes.
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::crypto;
use crate::error::{Error, Result};

/// Signed request as sent to the license service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the JSON message.
    pub request: String,
    /// Base64 of the encrypted SHA-1 digest.
    pub signature: String,
    /// Provider name the signing key belongs to.
    pub signer: String,
}

impl Envelope {
    /// Serialize the envelope as a JSON request body.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::EncodeFailure)
    }

    /// Decode the base64 request back into the signed message bytes.
    pub fn request_bytes(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.request)?)
    }

    /// Decode the base64 signature.
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.signature)?)
    }
}

/// Compute the signature of `payload`: AES-CBC over its SHA-1 digest.
pub fn sign(payload: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha1::digest(payload);
    crypto::encrypt(key, iv, &digest)
}

/// Sign `payload` and wrap it into an [`Envelope`].
pub fn pack(payload: &[u8], key: &[u8], iv: &[u8], signer: &str) -> Result<Envelope> {
    let signature = sign(payload, key, iv)?;
    Ok(Envelope {
        request: base64::engine::general_purpose::STANDARD.encode(payload),
        signature: base64::engine::general_purpose::STANDARD.encode(signature),
        signer: signer.to_string(),
    })
}
