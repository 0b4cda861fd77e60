//! Manifest wire format
//!
//! A manifest is the record published to the queue after a file has been
//! encrypted and dispersed. It carries everything the reconstructor needs:
//! the original file name, the chunk names in ciphertext byte order, the
//! serialized private key, and the storage timestamp.
//!
//! Field names on the wire are fixed (`FileName`, `ChunkList`, `PvBase64`,
//! `Date`) for compatibility with existing consumers.
//!
//! Chunk order is load-bearing: the ciphertext has no internal record
//! boundaries, so reassembling chunks in any other order produces wrong
//! bytes, not a clean decode error.

use serde::{Deserialize, Serialize};

use crate::error::{SbxError, SbxResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Original file name (used to key the reconstructed output).
    #[serde(rename = "FileName")]
    pub file_name: String,

    /// Chunk object names, in ciphertext byte order. Order-significant.
    #[serde(rename = "ChunkList")]
    pub chunk_list: Vec<String>,

    /// Serialized private key, base64. See sbx-crypto for the format and
    /// DESIGN.md for the custody caveat.
    #[serde(rename = "PvBase64")]
    pub key_material: String,

    /// Storage timestamp, epoch milliseconds.
    #[serde(rename = "Date")]
    pub timestamp: i64,
}

impl Manifest {
    /// Serialize to the JSON wire form.
    pub fn to_bytes(&self) -> SbxResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SbxError::Manifest(format!("serializing: {e}")))
    }

    /// Deserialize from the JSON wire form, rejecting structurally valid
    /// but unusable payloads (empty file name or key material).
    pub fn from_bytes(data: &[u8]) -> SbxResult<Self> {
        let manifest: Manifest = serde_json::from_slice(data)
            .map_err(|e| SbxError::Manifest(format!("deserializing: {e}")))?;

        if manifest.file_name.is_empty() {
            return Err(SbxError::Manifest("empty FileName".into()));
        }
        if manifest.key_material.is_empty() {
            return Err(SbxError::Manifest("empty PvBase64".into()));
        }
        Ok(manifest)
    }

    /// Current epoch-milliseconds timestamp for new manifests.
    pub fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}
