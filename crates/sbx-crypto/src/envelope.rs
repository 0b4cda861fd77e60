//! Encrypt/decrypt a buffer as a binary age message
//!
//! The ciphertext is opaque to the rest of the pipeline: the sharder slices
//! it at arbitrary byte offsets, so nothing here may assume the blob stays
//! in one piece — and nothing downstream may assume any offset is
//! meaningful.

use std::io::{Read, Write};

use sbx_core::{SbxError, SbxResult};

use crate::keys::parse_private_key;

/// Encrypt a plaintext buffer to a single recipient.
///
/// Succeeds for any input length, including empty. The output embeds the
/// recipient stanza, so it decrypts with nothing but the matching identity.
pub fn encrypt(plaintext: &[u8], recipient: &age::x25519::Recipient) -> SbxResult<Vec<u8>> {
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(recipient as &dyn age::Recipient))
            .map_err(|e| SbxError::Encryption(format!("building encryptor: {e}")))?;

    let mut ciphertext = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut ciphertext)
        .map_err(|e| SbxError::Encryption(format!("starting message: {e}")))?;
    writer
        .write_all(plaintext)
        .map_err(|e| SbxError::Message(format!("framing plaintext: {e}")))?;
    writer
        .finish()
        .map_err(|e| SbxError::Encryption(format!("finalizing message: {e}")))?;

    Ok(ciphertext)
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// `key_material` is the base64 serialized private key from the manifest.
/// A non-empty `passphrase` unlocks passphrase-sealed key material first;
/// empty means the material is already usable.
pub fn decrypt(ciphertext: &[u8], key_material: &str, passphrase: &str) -> SbxResult<Vec<u8>> {
    if ciphertext.is_empty() {
        return Err(SbxError::Message("empty ciphertext".into()));
    }

    let identity = parse_private_key(key_material, passphrase)?;

    let decryptor = age::Decryptor::new(ciphertext).map_err(map_decrypt_error)?;

    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(map_decrypt_error)?;

    let mut plaintext = Vec::new();
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| SbxError::Decryption(format!("reading payload: {e}")))?;

    Ok(plaintext)
}

/// Header/framing problems are message errors; everything else (no matching
/// key, bad MAC, truncated payload) is a decryption failure.
fn map_decrypt_error(e: age::DecryptError) -> SbxError {
    match e {
        age::DecryptError::InvalidHeader => {
            SbxError::Message("malformed ciphertext header".into())
        }
        age::DecryptError::UnknownFormat => {
            SbxError::Message("ciphertext is not an age message".into())
        }
        other => SbxError::Decryption(other.to_string()),
    }
}
