use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from scatterbox.toml)
///
/// Every collaborator gets its settings passed in explicitly through these
/// structs; components never read process-global environment state. The one
/// exception is S3 credentials, which enter at the binary edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SbxConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub reconstruct: ReconstructConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Prometheus metrics endpoint (default: 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding chunk objects
    pub bucket: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Per-operation timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// NATS JetStream endpoint
    pub nats_url: String,
    /// Stream name for manifest announcements
    pub stream: String,
    /// Durable consumer name for reconstructor workers
    pub consumer: String,
    /// Redelivery limit before the stream stops retrying a message
    pub max_deliver: i64,
    /// Seconds a worker may hold a message before redelivery
    pub ack_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructConfig {
    /// Directory reconstructed plaintext files are written under
    pub output_dir: PathBuf,
    /// Delete chunk objects after a successful fetch+reassembly
    pub delete_after_read: bool,
    /// Max concurrent reconstructions (0 = cpu_count)
    pub workers: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            metrics_addr: Some("127.0.0.1:9100".into()),
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "scatterbox".into(),
            enforce_tls: false,
            timeout_secs: 30,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".into(),
            stream: "MANIFESTS".into(),
            consumer: "reconstruct-workers".into(),
            max_deliver: 3,
            ack_wait_secs: 60,
        }
    }
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./download"),
            delete_after_read: false,
            workers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"
log_format = "text"
metrics_addr = "0.0.0.0:9100"

[storage]
endpoint = "https://s3.example.com:8333"
region = "us-west-2"
bucket = "secret-chunks"
enforce_tls = true
timeout_secs = 10

[queue]
nats_url = "tls://nats.example.com:4222"
stream = "MANIFESTS"
max_deliver = 5
ack_wait_secs = 120

[reconstruct]
output_dir = "/var/lib/scatterbox/out"
delete_after_read = true
workers = 8
"#;
        let config: SbxConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.storage.endpoint, "https://s3.example.com:8333");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.storage.bucket, "secret-chunks");
        assert_eq!(config.queue.max_deliver, 5);
        assert!(config.reconstruct.delete_after_read);
        assert_eq!(config.reconstruct.workers, 8);
    }

    #[test]
    fn test_parse_defaults() {
        let config: SbxConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.storage.endpoint, "http://localhost:8333");
        assert!(!config.storage.enforce_tls);
        assert_eq!(config.queue.nats_url, "nats://localhost:4222");
        assert_eq!(config.queue.stream, "MANIFESTS");
        assert_eq!(config.queue.max_deliver, 3);
        assert_eq!(config.reconstruct.output_dir, PathBuf::from("./download"));
        assert!(!config.reconstruct.delete_after_read);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[storage]
endpoint = "http://192.168.1.100:8333"
"#;
        let config: SbxConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.storage.endpoint, "http://192.168.1.100:8333");
        // Defaults
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.bucket, "scatterbox");
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SbxConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SbxConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.storage.endpoint, parsed.storage.endpoint);
        assert_eq!(config.queue.nats_url, parsed.queue.nats_url);
        assert_eq!(config.reconstruct.output_dir, parsed.reconstruct.output_dir);
    }
}
