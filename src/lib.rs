//! widevine-proxy - Widevine license proxy.
//!
//! This crate provides:
//! - PSSH box parsing and key ID extraction.
//! - AES-CBC request signing and envelope packing.
//! - A blocking license proxy that relays certificate and license requests
//!   to a Widevine license service.
//! - A config-backed license authority and an optional HTTP front end.
//!
//! Feature flags:
//! - `cli`: enable the CLI binary.
//! - `serve`: enable the HTTP front end.
//! - `tracing`: emit log events through `tracing`.
#![allow(clippy::result_large_err)]

#[macro_use]
mod macros;

/// Config-backed license authority.
pub mod authority;
/// YAML configuration.
pub mod config;
/// AES-CBC with the signing padding rules.
pub mod crypto;
/// Common error types and Result alias.
pub mod error;
/// Outbound license messages.
pub mod message;
/// License proxy orchestration.
pub mod proxy;
/// PSSH box parsing.
pub mod pssh;
/// License service responses.
pub mod response;
/// Request signing.
pub mod signer;

/// HTTP front end (feature: `serve`).
#[cfg(feature = "serve")]
pub mod serve;

pub use authority::StaticAuthority;
pub use config::ProxyConfig;
pub use error::{Error, Result};
pub use proxy::{LicenseAuthority, Proxy};
pub use pssh::PsshSummary;
pub use response::LicenseResponse;
pub use signer::Envelope;
