//! sbx-crypto: envelope encryption for dispersed secret files
//!
//! One ephemeral X25519 key pair per stored file. The ciphertext is a binary
//! age message, so the recipient stanza travels inside it and the blob is
//! self-describing. The private key is serialized to base64 for the
//! manifest; a non-empty passphrase locks the serialized form with age's
//! scrypt recipient, and the same passphrase unlocks it before decryption.
//!
//! Pipeline: plaintext → encrypt to ephemeral recipient → shard → upload
//!           chunks → fetch → reassemble → decrypt with ephemeral identity

pub mod envelope;
pub mod keys;

pub use envelope::{decrypt, encrypt};
pub use keys::{parse_private_key, serialize_private_key, EphemeralKeyPair};
