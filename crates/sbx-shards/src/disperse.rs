//! Concurrent chunk upload and order-preserving reassembly

use futures::future::try_join_all;
use opendal::Operator;
use rand::Rng;
use tracing::debug;

use sbx_core::{SbxError, SbxResult};

use crate::names::chunk_name;
use crate::plan::plan_sizes;

/// Slice `ciphertext` into contiguous, non-overlapping ranges per the size
/// plan, name each range, and upload all of them.
///
/// Uploads run concurrently; the returned names are in ciphertext byte
/// order regardless of which upload finishes first. Any failed upload
/// surfaces as a `Storage` error naming the chunk — a partial failure
/// never yields a shortened name list.
pub async fn shard_and_upload<R: Rng + ?Sized>(
    op: &Operator,
    ciphertext: &[u8],
    rng: &mut R,
) -> SbxResult<Vec<String>> {
    // Plan and name synchronously so the rng borrow ends before any await.
    let sizes = plan_sizes(ciphertext.len(), rng);

    let mut parts = Vec::with_capacity(sizes.len());
    let mut offset = 0usize;
    for len in &sizes {
        let name = chunk_name(rng);
        parts.push((name, ciphertext[offset..offset + len].to_vec()));
        offset += len;
    }
    debug_assert_eq!(offset, ciphertext.len());

    let names: Vec<String> = parts.iter().map(|(name, _)| name.clone()).collect();
    debug!(
        total_bytes = ciphertext.len(),
        chunks = names.len(),
        "dispersing ciphertext"
    );

    let uploads = parts.into_iter().map(|(name, data)| async move {
        let len = data.len();
        op.write(&name, data)
            .await
            .map_err(|e| SbxError::Storage(format!("uploading chunk {name}: {e}")))?;
        debug!(chunk = %name, bytes = len, "chunk uploaded");
        Ok::<_, SbxError>(())
    });
    try_join_all(uploads).await?;

    Ok(names)
}

/// Fetch every named chunk and concatenate strictly in `names` order.
///
/// Fetches run concurrently and may complete in any order; concatenation
/// follows the name list, never completion order. A missing chunk is
/// reported as `ChunkNotFound` (terminal), any other fetch failure as
/// `Storage`. Partial reconstruction is never returned.
pub async fn reassemble(op: &Operator, names: &[String]) -> SbxResult<Vec<u8>> {
    let fetches = names.iter().map(|name| async move {
        op.read(name).await.map_err(|e| {
            if e.kind() == opendal::ErrorKind::NotFound {
                SbxError::ChunkNotFound(name.clone())
            } else {
                SbxError::Storage(format!("reading chunk {name}: {e}"))
            }
        })
    });

    // try_join_all yields results in input order, whatever the completion
    // order was — this is the ordering invariant the whole system leans on.
    let buffers = try_join_all(fetches).await?;

    let total: usize = buffers.iter().map(|b| b.len()).sum();
    let mut ciphertext = Vec::with_capacity(total);
    for buffer in buffers {
        ciphertext.extend_from_slice(&buffer.to_bytes());
    }

    debug!(chunks = names.len(), bytes = ciphertext.len(), "reassembled");
    Ok(ciphertext)
}

/// Delete chunk objects after a successful reconstruction.
///
/// Already-gone chunks are ignored so a redelivered manifest can be
/// processed idempotently up to this point.
pub async fn delete_chunks(op: &Operator, names: &[String]) -> SbxResult<()> {
    let deletes = names.iter().map(|name| async move {
        match op.delete(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SbxError::Storage(format!("deleting chunk {name}: {e}"))),
        }
    });
    try_join_all(deletes).await?;
    debug!(chunks = names.len(), "chunks deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sbx_storage::memory_operator;

    fn sample_ciphertext(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_shard_reassemble_roundtrip() {
        let op = memory_operator();
        let ciphertext = sample_ciphertext(70_001);
        let mut rng = StdRng::seed_from_u64(9);

        let names = shard_and_upload(&op, &ciphertext, &mut rng).await.unwrap();
        assert!(!names.is_empty() && names.len() <= crate::MAX_CHUNKS);

        let rebuilt = reassemble(&op, &names).await.unwrap();
        assert_eq!(rebuilt, ciphertext);
    }

    #[tokio::test]
    async fn test_empty_ciphertext_roundtrips() {
        let op = memory_operator();
        let mut rng = StdRng::seed_from_u64(3);

        let names = shard_and_upload(&op, &[], &mut rng).await.unwrap();
        let rebuilt = reassemble(&op, &names).await.unwrap();
        assert!(rebuilt.is_empty());
    }

    #[tokio::test]
    async fn test_order_is_name_list_order_not_store_order() {
        // Upload chunks by hand in scrambled store order; reassemble must
        // follow the name list.
        let op = memory_operator();
        let names = vec!["x1.dat".to_string(), "x2.dat".to_string(), "x3.dat".to_string()];
        op.write("x3.dat", b"cc".to_vec()).await.unwrap();
        op.write("x1.dat", b"aa".to_vec()).await.unwrap();
        op.write("x2.dat", b"bb".to_vec()).await.unwrap();

        let rebuilt = reassemble(&op, &names).await.unwrap();
        assert_eq!(rebuilt, b"aabbcc");
    }

    #[tokio::test]
    async fn test_missing_chunk_is_chunk_not_found() {
        let op = memory_operator();
        let ciphertext = sample_ciphertext(4096);
        let mut rng = StdRng::seed_from_u64(11);

        let names = shard_and_upload(&op, &ciphertext, &mut rng).await.unwrap();
        op.delete(&names[0]).await.unwrap();

        let err = reassemble(&op, &names).await.unwrap_err();
        match err {
            SbxError::ChunkNotFound(chunk) => assert_eq!(chunk, names[0]),
            other => panic!("expected ChunkNotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_name_list_reassembles_empty() {
        let op = memory_operator();
        let rebuilt = reassemble(&op, &[]).await.unwrap();
        assert!(rebuilt.is_empty());
    }

    #[tokio::test]
    async fn test_delete_chunks_idempotent() {
        let op = memory_operator();
        let names = vec!["d1.dat".to_string(), "d2.dat".to_string()];
        op.write("d1.dat", b"a".to_vec()).await.unwrap();
        op.write("d2.dat", b"b".to_vec()).await.unwrap();

        delete_chunks(&op, &names).await.unwrap();
        // Second pass hits NotFound everywhere and still succeeds.
        delete_chunks(&op, &names).await.unwrap();

        assert_eq!(
            op.read("d1.dat").await.unwrap_err().kind(),
            opendal::ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_concurrent_shardings_never_share_names() {
        let op = memory_operator();
        let a = sample_ciphertext(10_000);
        let b = sample_ciphertext(20_000);

        let (names_a, names_b) = tokio::join!(
            async {
                let mut rng = rand::rngs::StdRng::from_entropy();
                shard_and_upload(&op, &a, &mut rng).await.unwrap()
            },
            async {
                let mut rng = rand::rngs::StdRng::from_entropy();
                shard_and_upload(&op, &b, &mut rng).await.unwrap()
            },
        );

        for name in &names_a {
            assert!(!names_b.contains(name));
        }
        assert_eq!(reassemble(&op, &names_a).await.unwrap(), a);
        assert_eq!(reassemble(&op, &names_b).await.unwrap(), b);
    }
}
