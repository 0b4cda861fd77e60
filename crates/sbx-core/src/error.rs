use thiserror::Error;

pub type SbxResult<T> = Result<T, SbxError>;

/// Error taxonomy for the store/reconstruct pipeline.
///
/// Each variant is a distinct, user-facing failure kind: the CLI reports
/// them verbatim, and the queue adapter uses them to decide
/// ack/nak/dead-letter. Encryption-path failures in particular must stay
/// distinguishable (a bad key is not a malformed message is not a backend
/// failure).
#[derive(Debug, Error)]
pub enum SbxError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("key management error: {0}")]
    KeyManagement(String),

    #[error("key format error: {0}")]
    KeyFormat(String),

    #[error("message error: {0}")]
    Message(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A named chunk object does not exist. Kept apart from `Storage`
    /// because a missing chunk is terminal (the object is gone, e.g. after
    /// delete-after-read), while other storage failures are transient.
    #[error("storage error: chunk {0} not found")]
    ChunkNotFound(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SbxError {
    /// Whether a retry can plausibly succeed.
    ///
    /// Storage, queue, and I/O failures are transient until proven
    /// otherwise; everything else (bad keys, corrupt ciphertext, malformed
    /// manifests) will fail identically on redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SbxError::Storage(_) | SbxError::Queue(_) | SbxError::Io(_)
        )
    }
}
