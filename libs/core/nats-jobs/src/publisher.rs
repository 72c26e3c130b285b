//! Publishing jobs to the stream subject.

use crate::error::NatsJobsError;
use crate::item::Item;
use crate::metrics::JobsMetrics;
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::Context;
use tracing::{debug, warn};

/// Operation tag of [`crate::NatsDriver`] pushes.
pub const PUSH_OP: &str = "nats_consumer_push";

/// Operation tag of item requeues.
pub const REQUEUE_OP: &str = "nats_requeue";

/// Publishes jobs and removes messages from the bound stream.
pub struct Publisher {
    jetstream: Context,
    stream: Stream,
    stream_name: String,
    subject: String,
    metrics: JobsMetrics,
}

impl Publisher {
    pub fn new(
        jetstream: Context,
        stream: Stream,
        stream_name: impl Into<String>,
        subject: impl Into<String>,
        metrics: JobsMetrics,
    ) -> Self {
        Self {
            jetstream,
            stream,
            stream_name: stream_name.into(),
            subject: subject.into(),
            metrics,
        }
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Publish an item and wait for the stream acknowledgement.
    ///
    /// Returns the stream sequence of the new message.
    pub async fn publish(&self, op: &'static str, item: &Item) -> Result<u64, NatsJobsError> {
        if item.job().delay() > 0 {
            return Err(NatsJobsError::DelayNotSupported { op });
        }

        let body = serde_json::to_vec(item.job())
            .map_err(|source| NatsJobsError::Serialization { op, source })?;

        let ack = self
            .jetstream
            .publish(self.subject.clone(), body.into())
            .await
            .map_err(|e| NatsJobsError::publish_error(op, e))?
            .await
            .map_err(|e| NatsJobsError::publish_error(op, e))?;

        debug!(
            stream = %self.stream_name,
            subject = %self.subject,
            sequence = ack.sequence,
            job_id = %item.job().id,
            "Published job"
        );

        Ok(ack.sequence)
    }

    /// Republish an item at the tail of the stream and drop the original.
    pub async fn requeue(&self, item: &Item) -> Result<u64, NatsJobsError> {
        let sequence = self.publish(REQUEUE_OP, item).await?;

        if let Some(original) = item.sequence() {
            if let Err(e) = self.delete(original.stream).await {
                warn!(
                    stream = %self.stream_name,
                    sequence = original.stream,
                    error = %e,
                    "failed to delete requeued message"
                );
            }
        }

        self.metrics.job_requeued();
        Ok(sequence)
    }

    /// Delete a message by stream sequence.
    pub async fn delete(&self, sequence: u64) -> Result<(), NatsJobsError> {
        self.stream
            .delete_message(sequence)
            .await
            .map_err(NatsJobsError::from_jetstream_error)?;

        debug!(stream = %self.stream_name, sequence, "Deleted message");
        Ok(())
    }
}
