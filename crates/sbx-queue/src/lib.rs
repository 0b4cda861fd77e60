//! sbx-queue: NATS JetStream transport for manifest announcements
//!
//! `ManifestQueue` connects, ensures the stream exists, and publishes
//! manifests. `manifest_stream()` opens a durable pull consumer for the
//! reconstructor workers, yielding `ManifestMessage` handles that carry the
//! payload plus ack/nak/term. `HandlerOutcome` is the explicit handler
//! result the adapter turns into one of those signals.
//!
//! Delivery is at-least-once: the stream may hand the same manifest to a
//! worker more than once, and `max_deliver` bounds how often a nak'd
//! message comes back.

use async_nats::jetstream::{self, consumer::pull, stream};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use sbx_core::config::QueueConfig;
use sbx_core::{Manifest, SbxError, SbxResult};

// ── HandlerOutcome ────────────────────────────────────────────────────────

/// What a reconstruction handler decided about one delivery.
///
/// Every failure must end in exactly one of these; a delivery that is
/// neither acked, naked, nor termed just times out and redelivers.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Processed to completion. Ack, removing the manifest from the queue.
    Success,
    /// Transient failure. Nak and let the stream redeliver, bounded by the
    /// consumer's max_deliver.
    Retryable(SbxError),
    /// Permanent failure (malformed manifest, missing chunks, bad key
    /// material). Term, never redeliver.
    Terminal(SbxError),
}

impl HandlerOutcome {
    /// Classify an error by its retryability.
    pub fn from_error(err: SbxError) -> Self {
        if err.is_retryable() {
            HandlerOutcome::Retryable(err)
        } else {
            HandlerOutcome::Terminal(err)
        }
    }
}

// ── ManifestQueue ─────────────────────────────────────────────────────────

/// Thin wrapper around an async-nats JetStream context.
pub struct ManifestQueue {
    js: jetstream::Context,
    config: QueueConfig,
}

impl ManifestQueue {
    /// Connect to NATS and return a queue handle with JetStream enabled.
    pub async fn connect(config: &QueueConfig) -> SbxResult<Self> {
        let client = async_nats::connect(&config.nats_url)
            .await
            .map_err(|e| SbxError::Queue(format!("connecting to NATS at {}: {e}", config.nats_url)))?;
        info!(url = %config.nats_url, "NATS connected");
        let js = jetstream::new(client);
        Ok(ManifestQueue {
            js,
            config: config.clone(),
        })
    }

    /// Ensure the manifest stream exists (idempotent via CreateOrUpdate).
    ///
    /// Work-queue retention: each manifest is owned by exactly one consumer
    /// and removed once acked or termed.
    pub async fn ensure_stream(&self) -> SbxResult<()> {
        self.js
            .get_or_create_stream(stream::Config {
                name: self.config.stream.clone(),
                subjects: vec![self.config.stream.clone()],
                max_messages: 1_000_000,
                max_age: Duration::from_secs(7 * 24 * 3600),
                retention: stream::RetentionPolicy::WorkQueue,
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| SbxError::Queue(format!("ensuring {} stream: {e}", self.config.stream)))?;
        info!(stream = %self.config.stream, "stream verified");
        Ok(())
    }

    /// Publish a manifest announcement.
    ///
    /// Double-awaits: first sends the publish, second waits for server ack.
    pub async fn publish(&self, manifest: &Manifest) -> SbxResult<()> {
        let payload = manifest.to_bytes()?;
        self.js
            .publish(self.config.stream.clone(), payload.into())
            .await
            .map_err(|e| SbxError::Queue(format!("publishing manifest: {e}")))?
            .await
            .map_err(|e| SbxError::Queue(format!("awaiting publish ack: {e}")))?;
        debug!(
            file = %manifest.file_name,
            chunks = manifest.chunk_list.len(),
            "manifest published"
        );
        Ok(())
    }

    /// Open a streaming pull consumer for reconstructor workers.
    ///
    /// The consumer is durable and uses CreateOrUpdate semantics, so any
    /// number of workers share one delivery cursor.
    pub async fn manifest_stream(
        &self,
    ) -> SbxResult<impl futures::Stream<Item = SbxResult<ManifestMessage>>> {
        let consumer: jetstream::consumer::Consumer<pull::Config> = self
            .js
            .create_consumer_on_stream(
                pull::Config {
                    durable_name: Some(self.config.consumer.clone()),
                    ack_wait: Duration::from_secs(self.config.ack_wait_secs),
                    max_deliver: self.config.max_deliver,
                    ..Default::default()
                },
                self.config.stream.clone(),
            )
            .await
            .map_err(|e| {
                SbxError::Queue(format!(
                    "creating {} consumer: {e}",
                    self.config.consumer
                ))
            })?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| SbxError::Queue(format!("opening pull consumer stream: {e}")))?;

        let stream = messages.map(|msg_result| {
            let msg =
                msg_result.map_err(|e| SbxError::Queue(format!("receiving message: {e}")))?;
            Ok(ManifestMessage { msg })
        });

        Ok(stream)
    }
}

// ── ManifestMessage ───────────────────────────────────────────────────────

/// One queue delivery: the raw payload plus the underlying NATS message.
///
/// The payload stays raw here — parse failures belong to the handler, which
/// must turn them into `Terminal`, not drop them at the transport.
pub struct ManifestMessage {
    msg: jetstream::Message,
}

impl ManifestMessage {
    pub fn payload(&self) -> &[u8] {
        &self.msg.payload
    }

    /// Acknowledge successful processing, removing the message.
    pub async fn ack(self) -> SbxResult<()> {
        self.msg
            .ack()
            .await
            .map_err(|e| SbxError::Queue(format!("acking message: {e}")))
    }

    /// Negative-acknowledge; the message is redelivered after ack_wait.
    pub async fn nak(self) -> SbxResult<()> {
        self.msg
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| SbxError::Queue(format!("naking message: {e}")))
    }

    /// Terminate; the stream stops redelivering this message.
    pub async fn term(self) -> SbxResult<()> {
        self.msg
            .ack_with(jetstream::AckKind::Term)
            .await
            .map_err(|e| SbxError::Queue(format!("terming message: {e}")))
    }

    /// Extend the ack deadline (call periodically for long reconstructions).
    pub async fn in_progress(&self) -> SbxResult<()> {
        self.msg
            .ack_with(jetstream::AckKind::Progress)
            .await
            .map_err(|e| SbxError::Queue(format!("sending in-progress ack: {e}")))
    }
}

/// Settle one delivery according to the handler's outcome.
pub async fn settle(msg: ManifestMessage, outcome: HandlerOutcome) {
    match outcome {
        HandlerOutcome::Success => {
            if let Err(e) = msg.ack().await {
                warn!("ack failed: {e}");
            }
        }
        HandlerOutcome::Retryable(err) => {
            error!(error = %err, "reconstruction failed, naking for retry");
            if let Err(nak_err) = msg.nak().await {
                warn!("nak failed: {nak_err}");
            }
        }
        HandlerOutcome::Terminal(err) => {
            error!(error = %err, "reconstruction failed permanently, dead-lettering");
            if let Err(term_err) = msg.term().await {
                warn!("term failed: {term_err}");
            }
        }
    }
}
