//! PSSH box parsing.
//!
//! Decodes the fixed header of a `pssh` box into a hex summary and pulls
//! 16-byte key IDs out of the init data. The key ID scan only recognises
//! `tag, 0x10, <16 bytes>` records at the start of the data section and does
//! not attempt to decode the rest of the Widevine header.
use std::str::FromStr;

use base64::Engine;
use byteorder::{BigEndian, ByteOrder};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Size, type, version/flags, system ID and data length.
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 16 + 4;

const KEY_ID_SIZE: usize = 16;
const KEY_ID_RECORD_SIZE: usize = 2 + KEY_ID_SIZE;

/// Known DRM system IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemId {
    Widevine,
    PlayReady,
    ClearKey,
}

impl SystemId {
    pub fn to_uuid(self) -> Uuid {
        match self {
            SystemId::Widevine => Uuid::from_u128(0xedef8ba979d64acea3c827dcd51d21ed),
            SystemId::PlayReady => Uuid::from_u128(0x9a04f07998404286ab92e65be0885f95),
            SystemId::ClearKey => Uuid::from_u128(0x1077efecc0b24d02ace33c1e52e2fb4b),
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        [SystemId::Widevine, SystemId::PlayReady, SystemId::ClearKey]
            .into_iter()
            .find(|id| id.to_uuid() == uuid)
    }
}

/// Hex view of a parsed PSSH box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshSummary {
    /// Box size as 8 hex digits.
    pub size_hex: String,
    /// Box size.
    pub size: u32,
    /// Box type tag as hex (`70737368`).
    pub box_type: String,
    /// Version as 2 hex digits.
    pub version: String,
    /// Flags as 6 hex digits.
    pub flags: String,
    /// DRM system ID as 32 hex digits.
    pub system_id: String,
    /// Length of the data section.
    pub data_size: u32,
    /// Data section as hex.
    pub data_hex: String,
    /// Key IDs in encounter order, 32 hex digits each.
    pub key_ids: Vec<String>,
}

impl PsshSummary {
    /// Parse a PSSH box from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        parse_pssh_box(data)
    }

    /// Parse a base64 encoded PSSH box.
    pub fn from_base64(data_b64: &str) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(data_b64.trim())
            .map_err(Error::Base64DecodeError)?;
        Self::from_bytes(&data)
    }

    /// System ID as a UUID.
    pub fn system_uuid(&self) -> Result<Uuid> {
        let bytes = hex::decode(&self.system_id)?;
        Uuid::from_slice(&bytes).map_err(|_| Error::InvalidBoxType(self.system_id.clone()))
    }

    /// The DRM system this box belongs to, when it is a known one.
    pub fn system(&self) -> Option<SystemId> {
        self.system_uuid().ok().and_then(SystemId::from_uuid)
    }

    /// Key IDs as raw 16-byte arrays.
    pub fn key_id_bytes(&self) -> Vec<[u8; KEY_ID_SIZE]> {
        self.key_ids
            .iter()
            .filter_map(|kid| {
                let mut out = [0u8; KEY_ID_SIZE];
                hex::decode_to_slice(kid, &mut out).ok()?;
                Some(out)
            })
            .collect()
    }

    /// Key IDs as UUIDs.
    pub fn key_id_uuids(&self) -> Vec<Uuid> {
        self.key_id_bytes().into_iter().map(Uuid::from_bytes).collect()
    }
}

impl FromStr for PsshSummary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PsshSummary::from_base64(s)
    }
}

fn parse_pssh_box(data: &[u8]) -> Result<PsshSummary> {
    if data.len() < HEADER_SIZE {
        return Err(Error::TruncatedBox {
            needed: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let mut offset = 0;
    let size = BigEndian::read_u32(&data[offset..offset + 4]);
    let size_hex = hex::encode(&data[offset..offset + 4]);
    offset += 4;

    let box_type = &data[offset..offset + 4];
    if box_type != b"pssh" {
        return Err(Error::InvalidBoxType(hex::encode(box_type)));
    }
    let box_type = hex::encode(box_type);
    offset += 4;

    let version = data[offset];
    let flags = hex::encode(&data[offset + 1..offset + 4]);
    offset += 4;

    let system_id = hex::encode(&data[offset..offset + 16]);
    offset += 16;

    let mut key_ids = Vec::new();
    if version == 1 {
        let kid_count = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;

        let required = kid_count
            .checked_mul(KEY_ID_SIZE)
            .and_then(|n| n.checked_add(offset + 4))
            .unwrap_or(usize::MAX);
        if data.len() < required {
            return Err(Error::TruncatedBox {
                needed: required,
                actual: data.len(),
            });
        }
        for kid in data[offset..offset + kid_count * KEY_ID_SIZE].chunks_exact(KEY_ID_SIZE) {
            key_ids.push(hex::encode(kid));
        }
        offset += kid_count * KEY_ID_SIZE;
    }

    let data_size = BigEndian::read_u32(&data[offset..offset + 4]);
    offset += 4;

    let remaining = data.len() - offset;
    if data_size as usize > remaining {
        return Err(Error::DataLengthMismatch {
            declared: data_size as usize,
            remaining,
        });
    }
    let init_data = &data[offset..offset + data_size as usize];

    let computed = offset + init_data.len();
    if size as usize != computed {
        return Err(Error::SizeMismatch {
            declared: size as usize,
            computed,
        });
    }

    if data.len() != computed {
        return Err(Error::TrailingData {
            size: computed,
            actual: data.len(),
        });
    }

    key_ids.extend(scan_key_ids(init_data));

    Ok(PsshSummary {
        size_hex,
        size,
        box_type,
        version: hex::encode([version]),
        flags,
        system_id,
        data_size,
        data_hex: hex::encode(init_data),
        key_ids,
    })
}

/// Pull `tag, 16, <key id>` records off the front of `data`.
///
/// Stops at the first record whose length byte is not 16 or when fewer than
/// 18 bytes remain.
pub fn scan_key_ids(data: &[u8]) -> Vec<String> {
    let mut key_ids = Vec::new();
    let mut rest = data;
    while rest.len() >= KEY_ID_RECORD_SIZE && rest[1] as usize == KEY_ID_SIZE {
        key_ids.push(hex::encode(&rest[2..KEY_ID_RECORD_SIZE]));
        rest = &rest[KEY_ID_RECORD_SIZE..];
    }
    key_ids
}
