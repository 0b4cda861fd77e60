//! Key custody seam
//!
//! The manifest's `PvBase64` field carries whatever the custodian hands it.
//! `EmbeddedCustody` serializes the ephemeral private key straight into the
//! manifest: the manifest stays self-contained, but anyone who can read it
//! can decrypt the file it describes. A vault-backed custodian would store
//! the key out-of-band and put a reference in the manifest instead, without
//! the pipeline changing shape.

use sbx_core::SbxResult;
use sbx_crypto::serialize_private_key;

pub trait KeyCustody: Send + Sync {
    /// Turn a fresh ephemeral private key into the manifest's key material.
    fn seal(&self, identity: &age::x25519::Identity) -> SbxResult<String>;

    /// Passphrase needed to use retrieved key material (empty = none).
    fn passphrase(&self) -> &str;
}

/// Private key travels in the manifest, unlocked.
#[derive(Debug, Default)]
pub struct EmbeddedCustody {
    passphrase: String,
}

impl EmbeddedCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed the key passphrase-locked; the same passphrase must be
    /// configured on the reconstructing side.
    pub fn with_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }
}

impl KeyCustody for EmbeddedCustody {
    fn seal(&self, identity: &age::x25519::Identity) -> SbxResult<String> {
        serialize_private_key(identity, &self.passphrase)
    }

    fn passphrase(&self) -> &str {
        &self.passphrase
    }
}
