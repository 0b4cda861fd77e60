//! Store pipeline: encrypt → disperse → announce

use opendal::Operator;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use sbx_core::{Manifest, SbxError, SbxResult};
use sbx_crypto::{encrypt, EphemeralKeyPair};
use sbx_queue::ManifestQueue;
use sbx_shards::shard_and_upload;

use crate::custody::KeyCustody;

/// What `store_secret_file` hands back.
///
/// The manifest is always returned once the chunks are stored; a failed
/// announcement rides alongside it as a distinct `Queue` error instead of
/// masking the stored file.
#[derive(Debug)]
pub struct StoreReceipt {
    pub manifest: Manifest,
    pub publish_error: Option<SbxError>,
}

/// Producer half of the pipeline.
pub struct FileStore {
    op: Operator,
    queue: Option<ManifestQueue>,
    custody: Box<dyn KeyCustody>,
}

impl FileStore {
    /// `queue: None` stores and returns the manifest without announcing it
    /// (the CLI's --no-publish mode); workers always pass a queue.
    pub fn new(op: Operator, queue: Option<ManifestQueue>, custody: Box<dyn KeyCustody>) -> Self {
        Self { op, queue, custody }
    }

    /// Encrypt `data` under a fresh ephemeral key pair, disperse the
    /// ciphertext, and announce the resulting manifest.
    ///
    /// Publish is fire-and-forget from the caller's perspective: the
    /// receipt carries the manifest regardless, with any publish failure
    /// reported separately.
    pub async fn store_secret_file(&self, file_name: &str, data: &[u8]) -> SbxResult<StoreReceipt> {
        if file_name.is_empty() {
            return Err(SbxError::Validation("file name must not be empty".into()));
        }
        info!(file = %file_name, bytes = data.len(), "storing secret file");

        // One pair per file, never reused.
        let pair = EphemeralKeyPair::generate();
        let ciphertext = encrypt(data, pair.recipient())?;
        debug!(file = %file_name, ciphertext_bytes = ciphertext.len(), "encrypted");

        let mut rng = StdRng::from_entropy();
        let chunk_list = shard_and_upload(&self.op, &ciphertext, &mut rng).await?;

        let manifest = Manifest {
            file_name: file_name.to_string(),
            chunk_list,
            key_material: self.custody.seal(pair.identity())?,
            timestamp: Manifest::now_millis(),
        };

        let publish_error = match &self.queue {
            Some(queue) => match queue.publish(&manifest).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "manifest publish failed");
                    Some(e)
                }
            },
            None => None,
        };

        info!(
            file = %file_name,
            chunks = manifest.chunk_list.len(),
            published = publish_error.is_none() && self.queue.is_some(),
            "secret file stored"
        );
        Ok(StoreReceipt {
            manifest,
            publish_error,
        })
    }
}
