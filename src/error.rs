//! Error types for widevine-proxy.

use thiserror::Error;

/// Main error type for widevine-proxy operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The PSSH box is shorter than its fixed header.
    #[error("PSSH box truncated: need {needed} bytes, got {actual}")]
    TruncatedBox { needed: usize, actual: usize },

    /// The box type tag is not `pssh`.
    #[error("Not a PSSH box (type {0})")]
    InvalidBoxType(String),

    /// The declared data length runs past the end of the buffer.
    #[error("PSSH data length {declared} exceeds remaining {remaining} bytes")]
    DataLengthMismatch { declared: usize, remaining: usize },

    /// The declared box size disagrees with the sum of its fields.
    #[error("PSSH box size {declared} does not match field total {computed}")]
    SizeMismatch { declared: usize, computed: usize },

    /// The buffer holds more than the one box it declares.
    #[error("PSSH box is {size} bytes but the input holds {actual}")]
    TrailingData { size: usize, actual: usize },

    /// AES key is not 16, 24 or 32 bytes.
    #[error("Invalid AES key length: {0}")]
    InvalidKeyLength(usize),

    /// CBC IV is not one block long.
    #[error("Invalid IV length: expected 16, got {0}")]
    InvalidIvLength(usize),

    /// Nothing to decrypt.
    #[error("Ciphertext must not be empty")]
    EmptyCiphertext,

    /// Ciphertext is not made of whole blocks.
    #[error("Ciphertext length {0} is not a multiple of the block size")]
    InvalidCiphertextLength(usize),

    /// Network, DNS or timeout failure talking to the license server.
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] reqwest::Error),

    /// The license server answered with something that is not a license response.
    #[error("Failed to decode license response: {0}")]
    DecodeFailure(#[source] serde_json::Error),

    /// An outbound message could not be serialized.
    #[error("Failed to encode request: {0}")]
    EncodeFailure(#[source] serde_json::Error),

    /// The license server returned a status other than `OK`.
    ///
    /// The status is kept verbatim and never used as a format string.
    #[error("License request rejected with status {0:?}")]
    AuthorityRejected(String),

    /// The license authority could not build a license message.
    #[error("License authority error: {0}")]
    Authority(String),

    /// Invalid or incomplete configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// Hex decode error.
    #[error("Hex decode error: {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Status string carried by an `AuthorityRejected` error.
    pub fn rejected_status(&self) -> Option<&str> {
        match self {
            Error::AuthorityRejected(status) => Some(status),
            _ => None,
        }
    }
}

/// Result type alias for widevine-proxy operations.
pub type Result<T> = std::result::Result<T, Error>;
