//! Ephemeral key pairs and private-key serialization

use age::secrecy::{ExposeSecret, SecretString};

use sbx_core::{SbxError, SbxResult};

const AGE_SECRET_KEY_PREFIX: &[u8] = b"AGE-SECRET-KEY-";

/// A single-use X25519 key pair.
///
/// Generated once per stored file and never reused: the recipient encrypts
/// exactly one ciphertext, and the identity decrypts exactly that one.
pub struct EphemeralKeyPair {
    identity: age::x25519::Identity,
    recipient: age::x25519::Recipient,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let identity = age::x25519::Identity::generate();
        let recipient = identity.to_public();
        Self {
            identity,
            recipient,
        }
    }

    pub fn recipient(&self) -> &age::x25519::Recipient {
        &self.recipient
    }

    pub fn identity(&self) -> &age::x25519::Identity {
        &self.identity
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("recipient", &self.recipient.to_string())
            .field("identity", &"[REDACTED]")
            .finish()
    }
}

/// Serialize a private key for transport, base64-encoded.
///
/// With an empty passphrase the payload is the bare identity string
/// (`AGE-SECRET-KEY-1...`). With a non-empty passphrase the identity string
/// is first sealed into a binary age message under a scrypt recipient, so
/// the key material is unusable without the passphrase.
pub fn serialize_private_key(
    identity: &age::x25519::Identity,
    passphrase: &str,
) -> SbxResult<String> {
    let identity_str = identity.to_string();
    let payload = if passphrase.is_empty() {
        identity_str.expose_secret().as_bytes().to_vec()
    } else {
        lock_with_passphrase(identity_str.expose_secret().as_bytes(), passphrase)?
    };
    Ok(base64_encode(&payload))
}

/// Parse private-key material produced by [`serialize_private_key`].
///
/// An empty passphrase means the material is assumed to be a bare identity;
/// a non-empty passphrase unlocks scrypt-sealed material first.
pub fn parse_private_key(key_material: &str, passphrase: &str) -> SbxResult<age::x25519::Identity> {
    let payload = base64_decode(key_material)?;

    let identity_bytes = if payload.starts_with(AGE_SECRET_KEY_PREFIX) {
        payload
    } else if passphrase.is_empty() {
        return Err(SbxError::KeyFormat(
            "private key is passphrase-locked but no passphrase was given".into(),
        ));
    } else {
        unlock_with_passphrase(&payload, passphrase)?
    };

    let identity_str = String::from_utf8(identity_bytes)
        .map_err(|_| SbxError::KeyFormat("private key material is not UTF-8".into()))?;

    identity_str
        .trim()
        .parse::<age::x25519::Identity>()
        .map_err(|e| SbxError::KeyFormat(format!("parsing X25519 identity: {e}")))
}

fn lock_with_passphrase(identity_bytes: &[u8], passphrase: &str) -> SbxResult<Vec<u8>> {
    use std::io::Write;

    let recipient = age::scrypt::Recipient::new(SecretString::from(passphrase.to_owned()));
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
            .map_err(|e| SbxError::KeyManagement(format!("locking private key: {e}")))?;

    let mut sealed = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut sealed)
        .map_err(|e| SbxError::KeyManagement(format!("locking private key: {e}")))?;
    writer.write_all(identity_bytes)?;
    writer.finish()?;
    Ok(sealed)
}

fn unlock_with_passphrase(sealed: &[u8], passphrase: &str) -> SbxResult<Vec<u8>> {
    use std::io::Read;

    let decryptor = age::Decryptor::new(sealed)
        .map_err(|e| SbxError::KeyFormat(format!("reading locked private key: {e}")))?;

    if !decryptor.is_scrypt() {
        return Err(SbxError::KeyFormat(
            "locked private key is not passphrase-sealed".into(),
        ));
    }

    let identity = age::scrypt::Identity::new(SecretString::from(passphrase.to_owned()));
    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(|e| SbxError::KeyManagement(format!("unlocking private key: {e}")))?;

    let mut identity_bytes = Vec::new();
    reader
        .read_to_end(&mut identity_bytes)
        .map_err(|e| SbxError::KeyManagement(format!("unlocking private key: {e}")))?;
    Ok(identity_bytes)
}

pub(crate) fn base64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

pub(crate) fn base64_decode(s: &str) -> SbxResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s.trim())
        .map_err(|e| SbxError::KeyFormat(format!("base64 decode: {e}")))
}
