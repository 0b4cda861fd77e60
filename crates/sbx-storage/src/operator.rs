//! Chunk object store access
//!
//! One OpenDAL `Operator` per process, pointed at an S3-compatible bucket
//! that holds nothing but chunk objects. Transient put/get failures retry
//! with jitter, and every operation carries a bounded timeout so a dead
//! endpoint fails the chunk instead of stalling the pipeline.

use anyhow::{bail, Context, Result};
use opendal::layers::{LoggingLayer, RetryLayer, TimeoutLayer};
use opendal::Operator;
use std::time::Duration;
use tracing::warn;

use sbx_core::config::StorageConfig;

/// Build the chunk-store operator.
///
/// Credentials are handed in by the binary; `StorageConfig` never carries
/// them. A plaintext `http://` endpoint is refused outright when
/// `enforce_tls` is set, and logged when it is not, since chunk bytes and
/// credentials would cross the wire unprotected.
pub fn build_operator(
    cfg: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            bail!(
                "refusing plaintext S3 endpoint {} while enforce_tls is set",
                cfg.endpoint
            );
        }
        warn!(endpoint = %cfg.endpoint, "chunk store endpoint is plaintext HTTP");
    }

    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .context("initializing S3 operator")?
        .layer(LoggingLayer::default())
        .layer(RetryLayer::new().with_max_times(5).with_jitter())
        .layer(TimeoutLayer::new().with_timeout(Duration::from_secs(cfg.timeout_secs.max(1))))
        .finish();

    Ok(op)
}

/// In-memory operator for tests: same interface, no network.
pub fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator construction cannot fail")
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str, enforce_tls: bool) -> StorageConfig {
        StorageConfig {
            endpoint: endpoint.into(),
            enforce_tls,
            ..Default::default()
        }
    }

    #[test]
    fn test_https_endpoint_builds() {
        let cfg = config("https://chunks.internal:9000", true);
        assert!(build_operator(&cfg, "ak", "sk").is_ok());
    }

    #[test]
    fn test_plaintext_endpoint_refused_when_tls_enforced() {
        let cfg = config("http://127.0.0.1:8333", true);
        let err = build_operator(&cfg, "ak", "sk").unwrap_err();
        assert!(err.to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_plaintext_endpoint_tolerated_for_local_development() {
        let cfg = config("http://127.0.0.1:8333", false);
        assert!(build_operator(&cfg, "ak", "sk").is_ok());
    }

    #[tokio::test]
    async fn test_memory_operator_put_get_delete() {
        let op = memory_operator();
        op.write("obj.dat", b"bytes".to_vec()).await.unwrap();
        let read = op.read("obj.dat").await.unwrap();
        assert_eq!(read.to_vec(), b"bytes");
        op.delete("obj.dat").await.unwrap();
        let err = op.read("obj.dat").await.unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::NotFound);
    }
}
