//! AES-CBC with the license service's padding rules.
//!
//! Plaintext that is already block aligned is encrypted without a padding
//! block; anything else gets PKCS#5/7 padding. Signatures computed by the
//! license service depend on this, so it must not be "corrected" to plain
//! PKCS#7.
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes192CbcEnc = cbc::Encryptor<Aes192>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext` with AES-CBC.
///
/// The key selects AES-128/192/256 by length. Unaligned input is padded with
/// PKCS#5; aligned input is encrypted as is, so the ciphertext is never more
/// than one block longer than the plaintext and never grows when aligned.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;
    check_iv(iv)?;

    let mut buffer = plaintext.to_vec();
    if buffer.len() % BLOCK_SIZE != 0 {
        pkcs5_pad(&mut buffer);
    }
    let len = buffer.len();

    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidIvLength(iv.len()))?
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len),
        24 => Aes192CbcEnc::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidIvLength(iv.len()))?
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidIvLength(iv.len()))?
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len),
        n => return Err(Error::InvalidKeyLength(n)),
    }
    .map_err(|_| Error::InvalidCiphertextLength(len))?
    .to_vec();

    Ok(ciphertext)
}

/// Decrypt AES-CBC `ciphertext` produced by [`encrypt`].
///
/// Every block is decrypted. A trailing PKCS#5 run shorter than one block is
/// stripped; otherwise the decrypted bytes are returned untouched. An aligned
/// plaintext that happens to end in such a run cannot be told apart from a
/// padded one, so callers that encrypt aligned data must not rely on the
/// round trip for arbitrary trailing bytes.
pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() {
        return Err(Error::EmptyCiphertext);
    }
    check_key(key)?;
    check_iv(iv)?;
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidCiphertextLength(ciphertext.len()));
    }

    let mut buffer = ciphertext.to_vec();
    let mut plaintext = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidIvLength(iv.len()))?
            .decrypt_padded_mut::<NoPadding>(&mut buffer),
        24 => Aes192CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidIvLength(iv.len()))?
            .decrypt_padded_mut::<NoPadding>(&mut buffer),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::InvalidIvLength(iv.len()))?
            .decrypt_padded_mut::<NoPadding>(&mut buffer),
        n => return Err(Error::InvalidKeyLength(n)),
    }
    .map_err(|_| Error::InvalidCiphertextLength(ciphertext.len()))?
    .to_vec();

    strip_short_padding(&mut plaintext);
    Ok(plaintext)
}

fn check_key(key: &[u8]) -> Result<()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        n => Err(Error::InvalidKeyLength(n)),
    }
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != BLOCK_SIZE {
        return Err(Error::InvalidIvLength(iv.len()));
    }
    Ok(())
}

fn pkcs5_pad(buffer: &mut Vec<u8>) {
    let padding = BLOCK_SIZE - buffer.len() % BLOCK_SIZE;
    buffer.resize(buffer.len() + padding, padding as u8);
}

// Only runs of 1..=15 can come from `encrypt`; a full block of 0x10 never does.
fn strip_short_padding(plaintext: &mut Vec<u8>) {
    let Some(&last) = plaintext.last() else {
        return;
    };
    let padding = last as usize;
    if padding == 0 || padding >= BLOCK_SIZE || padding > plaintext.len() {
        return;
    }
    let start = plaintext.len() - padding;
    if plaintext[start..].iter().all(|&b| b == last) {
        plaintext.truncate(start);
    }
}
