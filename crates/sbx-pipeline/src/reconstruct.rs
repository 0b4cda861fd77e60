//! Reconstructor: manifest delivery → plaintext on disk
//!
//! Per delivery the stages are parse → fetch → reassemble → decrypt →
//! write, failing out of any stage. The handler never signals the queue
//! itself; it returns a `HandlerOutcome` and the adapter acks, naks, or
//! dead-letters. Deliveries are at-least-once, so every stage must tolerate
//! running again for the same manifest — which is also why a missing chunk
//! is terminal rather than retried: after delete-after-read the chunks are
//! gone for good.

use std::path::{Path, PathBuf};

use opendal::Operator;
use tracing::{debug, info, warn};

use sbx_core::config::ReconstructConfig;
use sbx_core::{Manifest, SbxError, SbxResult};
use sbx_crypto::decrypt;
use sbx_queue::HandlerOutcome;
use sbx_shards::{delete_chunks, reassemble};

/// Consumer half of the pipeline.
pub struct Reconstructor {
    op: Operator,
    output_dir: PathBuf,
    delete_after_read: bool,
    passphrase: String,
}

impl Reconstructor {
    pub fn new(op: Operator, config: &ReconstructConfig) -> Self {
        Self {
            op,
            output_dir: config.output_dir.clone(),
            delete_after_read: config.delete_after_read,
            passphrase: String::new(),
        }
    }

    /// Use a non-empty passphrase to unlock manifest key material
    /// (must match the producer's custody configuration).
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    /// Process one queue delivery.
    pub async fn handle(&self, payload: &[u8]) -> HandlerOutcome {
        match self.process(payload).await {
            Ok(path) => {
                info!(path = %path.display(), "file reconstructed");
                HandlerOutcome::Success
            }
            Err(e) => HandlerOutcome::from_error(e),
        }
    }

    async fn process(&self, payload: &[u8]) -> SbxResult<PathBuf> {
        let manifest = Manifest::from_bytes(payload)?;
        debug!(
            file = %manifest.file_name,
            chunks = manifest.chunk_list.len(),
            "manifest parsed"
        );

        // Fetches run concurrently; concatenation follows ChunkList order.
        let ciphertext = reassemble(&self.op, &manifest.chunk_list).await?;
        debug!(file = %manifest.file_name, bytes = ciphertext.len(), "chunks reassembled");

        // Only after every chunk has been fetched and concatenated is it
        // safe to let go of the stored copies.
        if self.delete_after_read {
            if let Err(e) = delete_chunks(&self.op, &manifest.chunk_list).await {
                // The data is already in hand; a failed cleanup is not a
                // failed reconstruction.
                warn!(file = %manifest.file_name, error = %e, "chunk cleanup failed");
            }
        }

        let plaintext = decrypt(&ciphertext, &manifest.key_material, &self.passphrase)?;
        debug!(file = %manifest.file_name, bytes = plaintext.len(), "decrypted");

        let output_path = self.output_path(&manifest.file_name)?;
        self.write_atomic(&output_path, &plaintext).await?;
        Ok(output_path)
    }

    /// Key the output by the manifest's file name, refusing anything that
    /// would escape the output directory.
    fn output_path(&self, file_name: &str) -> SbxResult<PathBuf> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| SbxError::Validation(format!("unusable file name: {file_name:?}")))?;
        if name != file_name {
            return Err(SbxError::Validation(format!(
                "file name must not contain path components: {file_name:?}"
            )));
        }
        Ok(self.output_dir.join(name))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> SbxResult<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        // The tmp name keeps the full file name (extension included) and
        // adds a random suffix: reconstructions running in parallel must
        // never share a tmp path, or one rename steals the other's bytes.
        let nonce: u64 = rand::random();
        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(format!(".{nonce:016x}.sbx_tmp"));
        let tmp = self.output_dir.join(tmp_name);
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::EmbeddedCustody;
    use crate::store::FileStore;
    use sbx_storage::memory_operator;

    fn reconstructor(op: &Operator, dir: &Path, delete_after_read: bool) -> Reconstructor {
        Reconstructor::new(
            op.clone(),
            &ReconstructConfig {
                output_dir: dir.to_path_buf(),
                delete_after_read,
                workers: 0,
            },
        )
    }

    async fn stored_manifest(op: &Operator, name: &str, data: &[u8]) -> Manifest {
        FileStore::new(op.clone(), None, Box::new(EmbeddedCustody::new()))
            .store_secret_file(name, data)
            .await
            .unwrap()
            .manifest
    }

    #[tokio::test]
    async fn test_end_to_end_reconstruction() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let manifest = stored_manifest(&op, "hello.txt", b"hello world").await;

        let outcome = reconstructor(&op, dir.path(), false)
            .handle(&manifest.to_bytes().unwrap())
            .await;
        assert!(matches!(outcome, HandlerOutcome::Success));

        let written = std::fs::read(dir.path().join("hello.txt")).unwrap();
        assert_eq!(written, b"hello world");
    }

    #[tokio::test]
    async fn test_redelivery_without_delete_is_idempotent() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let manifest = stored_manifest(&op, "twice.txt", b"same result").await;
        let payload = manifest.to_bytes().unwrap();
        let recon = reconstructor(&op, dir.path(), false);

        assert!(matches!(recon.handle(&payload).await, HandlerOutcome::Success));
        assert!(matches!(recon.handle(&payload).await, HandlerOutcome::Success));
        assert_eq!(
            std::fs::read(dir.path().join("twice.txt")).unwrap(),
            b"same result"
        );
    }

    #[tokio::test]
    async fn test_delete_after_read_removes_chunks_and_terminates_redelivery() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let manifest = stored_manifest(&op, "once.txt", b"read once").await;
        let payload = manifest.to_bytes().unwrap();
        let recon = reconstructor(&op, dir.path(), true);

        assert!(matches!(recon.handle(&payload).await, HandlerOutcome::Success));
        for chunk in &manifest.chunk_list {
            assert_eq!(
                op.read(chunk).await.unwrap_err().kind(),
                opendal::ErrorKind::NotFound
            );
        }

        // Redelivery finds the chunks gone: terminal, not retried forever.
        match recon.handle(&payload).await {
            HandlerOutcome::Terminal(SbxError::ChunkNotFound(_)) => {}
            other => panic!("expected Terminal(ChunkNotFound), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_reconstructions_sharing_a_stem() {
        // data.txt and data.bin differ only in extension; their tmp files
        // must stay disjoint or parallel handlers swap plaintexts.
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();

        let payload_txt: Vec<u8> = (0..65_536u32).map(|i| (i % 251) as u8).collect();
        let payload_bin: Vec<u8> = (0..65_536u32).map(|i| (i % 241) as u8).collect();
        let manifest_txt = stored_manifest(&op, "data.txt", &payload_txt).await;
        let manifest_bin = stored_manifest(&op, "data.bin", &payload_bin).await;
        let bytes_txt = manifest_txt.to_bytes().unwrap();
        let bytes_bin = manifest_bin.to_bytes().unwrap();

        let recon = reconstructor(&op, dir.path(), false);
        for round in 0..20 {
            let (txt, bin) = tokio::join!(recon.handle(&bytes_txt), recon.handle(&bytes_bin));
            assert!(
                matches!(txt, HandlerOutcome::Success),
                "round {round}: data.txt outcome {txt:?}"
            );
            assert!(
                matches!(bin, HandlerOutcome::Success),
                "round {round}: data.bin outcome {bin:?}"
            );
            assert_eq!(
                std::fs::read(dir.path().join("data.txt")).unwrap(),
                payload_txt
            );
            assert_eq!(
                std::fs::read(dir.path().join("data.bin")).unwrap(),
                payload_bin
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_terminal() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let recon = reconstructor(&op, dir.path(), false);

        match recon.handle(b"{\"FileName\": 42}").await {
            HandlerOutcome::Terminal(SbxError::Manifest(_)) => {}
            other => panic!("expected Terminal(Manifest), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_chunk_means_no_partial_output() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let manifest = stored_manifest(&op, "gone.txt", b"some payload bytes").await;
        op.delete(&manifest.chunk_list[0]).await.unwrap();

        let outcome = reconstructor(&op, dir.path(), false)
            .handle(&manifest.to_bytes().unwrap())
            .await;
        match outcome {
            HandlerOutcome::Terminal(SbxError::ChunkNotFound(chunk)) => {
                assert_eq!(chunk, manifest.chunk_list[0]);
            }
            other => panic!("expected Terminal(ChunkNotFound), got {other:?}"),
        }
        assert!(!dir.path().join("gone.txt").exists());
    }

    #[tokio::test]
    async fn test_empty_chunk_list_fails_at_decrypt() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = stored_manifest(&op, "hollow.txt", b"payload").await;
        manifest.chunk_list.clear();

        let outcome = reconstructor(&op, dir.path(), false)
            .handle(&manifest.to_bytes().unwrap())
            .await;
        match outcome {
            HandlerOutcome::Terminal(SbxError::Message(_)) => {}
            other => panic!("expected Terminal(Message), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupted_key_material_is_terminal() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = stored_manifest(&op, "badkey.txt", b"payload").await;
        manifest.key_material = "!!not base64!!".into();

        let outcome = reconstructor(&op, dir.path(), false)
            .handle(&manifest.to_bytes().unwrap())
            .await;
        match outcome {
            HandlerOutcome::Terminal(SbxError::KeyFormat(_)) => {}
            other => panic!("expected Terminal(KeyFormat), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_path_traversal_file_name_rejected() {
        let op = memory_operator();
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = stored_manifest(&op, "innocent.txt", b"payload").await;
        manifest.file_name = "../escape.txt".into();

        let outcome = reconstructor(&op, dir.path(), false)
            .handle(&manifest.to_bytes().unwrap())
            .await;
        match outcome {
            HandlerOutcome::Terminal(SbxError::Validation(_)) => {}
            other => panic!("expected Terminal(Validation), got {other:?}"),
        }
    }
}
