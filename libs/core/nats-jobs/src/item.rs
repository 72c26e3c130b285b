//! Queue items produced by the driver.

use crate::error::NatsJobsError;
use crate::publisher::{Publisher, REQUEUE_OP};
use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use messaging::{BoxError, Headers, Job, QueueItem};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Position of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    pub stream: u64,
    pub consumer: u64,
}

/// Handle back to the message an item was decoded from.
#[derive(Clone)]
pub(crate) struct Delivery {
    pub(crate) message: Arc<jetstream::Message>,
    pub(crate) publisher: Arc<Publisher>,
    pub(crate) stopped: Arc<AtomicBool>,
    pub(crate) delete_after_ack: bool,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.message.subject)
            .field("delete_after_ack", &self.delete_after_ack)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    fn ensure_running(&self) -> Result<(), NatsJobsError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(NatsJobsError::Stopped);
        }
        Ok(())
    }

    async fn ack(&self, sequence: Option<Sequence>) -> Result<(), NatsJobsError> {
        self.ensure_running()?;

        self.message
            .ack()
            .await
            .map_err(|e| NatsJobsError::consumer_error(format!("failed to ack: {e}")))?;

        if self.delete_after_ack {
            if let Some(seq) = sequence {
                self.publisher.delete(seq.stream).await?;
            }
        }

        Ok(())
    }

    async fn nak(&self) -> Result<(), NatsJobsError> {
        self.ensure_running()?;

        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| NatsJobsError::consumer_error(format!("failed to nak: {e}")))
    }
}

/// A job consumed from the stream, or about to be published to it.
///
/// Items handed to the queue keep their delivery so dispatchers can settle
/// them. An item built from a [`Job`] has no delivery and only supports
/// publishing.
#[derive(Debug, Clone)]
pub struct Item {
    job: Job,
    sequence: Option<Sequence>,
    delivery: Option<Delivery>,
}

impl From<Job> for Item {
    fn from(job: Job) -> Self {
        Self {
            job,
            sequence: None,
            delivery: None,
        }
    }
}

impl Item {
    pub(crate) fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub(crate) fn attach(&mut self, delivery: Delivery) {
        self.delivery = Some(delivery);
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn sequence(&self) -> Option<Sequence> {
        self.sequence
    }

    pub fn auto_ack(&self) -> bool {
        self.job.options.auto_ack
    }

    fn delivery(&self) -> Result<&Delivery, NatsJobsError> {
        self.delivery
            .as_ref()
            .ok_or_else(|| NatsJobsError::consumer_error("item was not consumed from a stream"))
    }
}

#[async_trait]
impl QueueItem for Item {
    fn id(&self) -> &str {
        &self.job.id
    }

    fn name(&self) -> &str {
        &self.job.job
    }

    fn priority(&self) -> i64 {
        self.job.options.priority
    }

    fn pipeline(&self) -> &str {
        &self.job.options.pipeline
    }

    fn payload(&self) -> &[u8] {
        self.job.payload.as_bytes()
    }

    fn headers(&self) -> &Headers {
        &self.job.headers
    }

    async fn ack(&self) -> Result<(), BoxError> {
        if self.auto_ack() {
            debug!(id = %self.job.id, "auto-acked item, ack is a no-op");
            return Ok(());
        }

        Ok(self.delivery()?.ack(self.sequence).await?)
    }

    async fn nack(&self) -> Result<(), BoxError> {
        if self.auto_ack() {
            debug!(id = %self.job.id, "auto-acked item, nack is a no-op");
            return Ok(());
        }

        Ok(self.delivery()?.nak().await?)
    }

    async fn nack_with_options(&mut self, requeue: bool, delay: i64) -> Result<(), BoxError> {
        if requeue {
            return self.requeue(self.job.headers.clone(), delay).await;
        }

        self.nack().await
    }

    async fn requeue(&mut self, headers: Headers, delay: i64) -> Result<(), BoxError> {
        if delay > 0 {
            return Err(NatsJobsError::DelayNotSupported { op: REQUEUE_OP }.into());
        }

        let delivery = self.delivery()?.clone();
        delivery.ensure_running()?;

        self.job.headers = headers;
        self.job.options.delay = delay;

        delivery.publisher.requeue(self).await?;

        // the original is already deleted from the stream
        if !self.auto_ack() {
            if let Err(e) = delivery.message.ack().await {
                warn!(id = %self.job.id, error = %e, "failed to ack requeued message");
            }
        }

        Ok(())
    }
}
