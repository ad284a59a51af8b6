//! Depot filename decryption.
//!
//! Encrypted filenames are base64 text. The first 16 decoded bytes are the
//! CBC initialization vector, itself encrypted with AES-256-ECB under the
//! depot key; the rest is the AES-256-CBC ciphertext with PKCS#7 padding.

use aes::{
    Aes256,
    cipher::{BlockDecryptMut, KeyInit, KeyIvInit, block_padding::Pkcs7, generic_array::GenericArray},
};
use data_encoding::{BASE64_MIME, HEXLOWER_PERMISSIVE};

use crate::error::{Error, Result};

const IV_LEN: usize = 16;

#[derive(Debug)]
enum NameCipherError {
    Base64,
    Truncated,
    KeyLength,
    Padding,
    Utf8,
}

/// Decodes a hex depot key into raw key bytes.
pub fn parse_depot_key(hex: &str) -> Result<Vec<u8>> {
    let key = HEXLOWER_PERMISSIVE
        .decode(hex.trim().as_bytes())
        .map_err(|e| Error::InvalidKey(e.to_string()))?;
    if key.len() != 32 {
        return Err(Error::InvalidKey(format!(
            "expected 32 bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}

/// Decrypts one filename with the depot key.
///
/// Never fails: when any stage rejects the input (not base64, wrong key,
/// bad padding, not UTF-8) the ciphertext is returned unchanged. Some
/// entries are legitimately stored in the clear.
pub fn decrypt_filename(ciphertext_b64: &str, key: &[u8]) -> String {
    match try_decrypt(ciphertext_b64, key) {
        Ok(name) => name,
        Err(e) => {
            tracing::trace!(reason = ?e, "filename left as-is");
            ciphertext_b64.to_owned()
        }
    }
}

fn try_decrypt(ciphertext_b64: &str, key: &[u8]) -> std::result::Result<String, NameCipherError> {
    let data = BASE64_MIME
        .decode(ciphertext_b64.as_bytes())
        .map_err(|_| NameCipherError::Base64)?;
    if data.len() < IV_LEN {
        return Err(NameCipherError::Truncated);
    }

    let mut iv = GenericArray::clone_from_slice(&data[..IV_LEN]);
    let mut ecb = ecb::Decryptor::<Aes256>::new_from_slice(key)
        .map_err(|_| NameCipherError::KeyLength)?;
    ecb.decrypt_block_mut(&mut iv);

    let cbc = cbc::Decryptor::<Aes256>::new_from_slices(key, &iv)
        .map_err(|_| NameCipherError::KeyLength)?;
    let mut body = data[IV_LEN..].to_vec();
    let plain = cbc
        .decrypt_padded_mut::<Pkcs7>(&mut body)
        .map_err(|_| NameCipherError::Padding)?;

    let end = plain.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8(plain[..end].to_vec()).map_err(|_| NameCipherError::Utf8)
}
