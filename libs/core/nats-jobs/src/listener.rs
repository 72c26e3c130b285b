//! Consumer listener: pulls messages and hands items to the queue.
//!
//! ```text
//!   JetStream consumer
//!         │
//!         ▼
//!   ┌──────────┐  rate limit  ┌────────┐  unpack   ┌───────┐
//!   │   pump   │─────────────▶│ intake │──────────▶│ queue │
//!   └──────────┘   (bounded)  └────────┘  worker   └───────┘
//!        ▲ drain                   ▲ stop
//! ```
//!
//! The pump owns the consumer stream and stops on drain. The worker owns the
//! intake channel and stops on the stop signal, or once the pump is gone and
//! the intake is empty.

use crate::config::NatsConfig;
use crate::error::NatsJobsError;
use crate::item::{Delivery, Sequence};
use crate::metrics::JobsMetrics;
use crate::publisher::Publisher;
use crate::unpack::{headers_from_nats, unpack};
use async_nats::jetstream::consumer::pull::{self, Config as ConsumerConfig};
use async_nats::jetstream::consumer::{AckPolicy, Consumer};
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::{self, AckKind};
use futures::StreamExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use messaging::Queue;
use std::num::NonZeroU32;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Ephemeral consumers are reaped by the server after this much inactivity.
const EPHEMERAL_INACTIVE_THRESHOLD: Duration = Duration::from_secs(60);

/// What the worker needs to turn messages into queue items.
#[derive(Clone)]
pub(crate) struct ListenerContext {
    pub queue: Arc<dyn Queue>,
    pub publisher: Arc<Publisher>,
    pub stopped: Arc<AtomicBool>,
    pub consume_all: bool,
    pub delete_after_ack: bool,
    pub metrics: JobsMetrics,
}

pub(crate) struct Listener {
    consumer: Consumer<ConsumerConfig>,
    stream: Stream,
    durable: bool,
    drain_tx: watch::Sender<bool>,
    pump: Option<JoinHandle<()>>,
    stop_tx: mpsc::Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl Listener {
    /// Create the consumer and spawn the pump and worker tasks.
    pub async fn start(
        stream: &Stream,
        config: &NatsConfig,
        ctx: ListenerContext,
    ) -> Result<Self, NatsJobsError> {
        let consumer = stream
            .create_consumer(consumer_config(config))
            .await
            .map_err(|e| {
                NatsJobsError::consumer_error(format!("failed to create consumer: {e}"))
            })?;

        let prefetch = config.prefetch.max(1);
        let messages = consumer
            .stream()
            .max_messages_per_batch(prefetch)
            .messages()
            .await
            .map_err(|e| NatsJobsError::consumer_error(format!("failed to subscribe: {e}")))?;

        let (intake_tx, intake_rx) = mpsc::channel(prefetch);
        let (drain_tx, drain_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let limiter = rate_limiter(config.rate_limit);
        let pump = tokio::spawn(pump_loop(messages, intake_tx, drain_rx, limiter));
        let worker = tokio::spawn(worker_loop(intake_rx, stop_rx, ctx));

        info!(
            consumer = %consumer.cached_info().name,
            durable = config.durable.is_some(),
            prefetch,
            "Listener started"
        );

        Ok(Self {
            consumer,
            stream: stream.clone(),
            durable: config.durable.is_some(),
            drain_tx,
            pump: Some(pump),
            stop_tx,
            worker: Some(worker),
        })
    }

    /// Handle for querying the consumer without holding the listener.
    pub fn consumer(&self) -> Consumer<ConsumerConfig> {
        self.consumer.clone()
    }

    /// Stop pulling new messages. Ephemeral consumers are deleted.
    pub async fn drain(&mut self) -> Result<(), NatsJobsError> {
        let _ = self.drain_tx.send(true);

        if let Some(pump) = self.pump.take() {
            pump.await
                .map_err(|e| NatsJobsError::consumer_error(format!("listener pump failed: {e}")))?;
        }

        if !self.durable {
            let name = self.consumer.cached_info().name.clone();
            self.stream
                .delete_consumer(&name)
                .await
                .map_err(NatsJobsError::from_jetstream_error)?;
            debug!(consumer = %name, "Deleted ephemeral consumer");
        }

        Ok(())
    }

    /// Signal the worker and wait for it to exit.
    pub async fn stop(mut self) {
        if self.stop_tx.send(()).await.is_err() {
            debug!("listener worker already exited");
        }

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "listener worker failed");
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

fn consumer_config(config: &NatsConfig) -> ConsumerConfig {
    ConsumerConfig {
        durable_name: config.durable.clone(),
        deliver_policy: config.deliver_policy(),
        ack_policy: AckPolicy::Explicit,
        max_ack_pending: i64::try_from(config.prefetch).unwrap_or(i64::MAX),
        filter_subject: config.subject.clone(),
        inactive_threshold: if config.durable.is_some() {
            Duration::ZERO
        } else {
            EPHEMERAL_INACTIVE_THRESHOLD
        },
        ..Default::default()
    }
}

fn rate_limiter(per_second: u64) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(u32::try_from(per_second).unwrap_or(u32::MAX))
        .unwrap_or(NonZeroU32::MIN);

    RateLimiter::direct(Quota::per_second(rate))
}

async fn pump_loop(
    mut messages: pull::Stream,
    intake: mpsc::Sender<jetstream::Message>,
    mut drain: watch::Receiver<bool>,
    limiter: DefaultDirectRateLimiter,
) {
    loop {
        tokio::select! {
            biased;

            _ = drain.changed() => {
                debug!("listener draining");
                return;
            }
            next = messages.next() => match next {
                Some(Ok(message)) => {
                    limiter.until_ready().await;
                    if intake.send(message).await.is_err() {
                        warn!("listener intake closed");
                        return;
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Error receiving message"),
                None => {
                    warn!("consumer message stream ended");
                    return;
                }
            },
        }
    }
}

async fn worker_loop(
    mut intake: mpsc::Receiver<jetstream::Message>,
    mut stop: mpsc::Receiver<()>,
    ctx: ListenerContext,
) {
    loop {
        tokio::select! {
            biased;

            _ = stop.recv() => {
                debug!("listener worker stopped");
                return;
            }
            next = intake.recv() => match next {
                Some(message) => ctx.handle(message).await,
                None => {
                    debug!("listener intake drained");
                    return;
                }
            },
        }
    }
}

impl ListenerContext {
    async fn handle(&self, message: jetstream::Message) {
        let sequence = match message.info() {
            Ok(info) => Sequence {
                stream: info.stream_sequence,
                consumer: info.consumer_sequence,
            },
            Err(e) => {
                warn!(error = %e, "failed to read message metadata, skipping");
                self.metrics.message_dropped("metadata");
                return;
            }
        };

        if let Err(e) = message.ack_with(AckKind::Progress).await {
            error!(
                error = %e,
                stream_seq = sequence.stream,
                "failed to mark message in progress"
            );
            self.metrics.message_dropped("in_progress");
            return;
        }

        let headers = headers_from_nats(message.headers.as_ref());
        let mut item = match unpack(self.consume_all, &message.payload, headers, sequence) {
            Ok(item) => item,
            Err(e) => {
                error!(error = %e, stream_seq = sequence.stream, "failed to unpack message");
                self.metrics.message_dropped("decode");
                return;
            }
        };

        let message = Arc::new(message);

        if item.auto_ack() {
            match message.ack().await {
                Ok(()) => debug!(id = %item.job().id, "auto-acked message"),
                Err(e) => error!(error = %e, id = %item.job().id, "failed to auto-ack message"),
            }
        }

        item.attach(Delivery {
            message,
            publisher: self.publisher.clone(),
            stopped: self.stopped.clone(),
            delete_after_ack: self.delete_after_ack,
        });

        self.metrics.message_received();
        self.queue.insert(Box::new(item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NatsSection;
    use async_nats::jetstream::consumer::DeliverPolicy;

    #[test]
    fn test_ephemeral_consumer_config() {
        let config = NatsSection::default().finish(25);
        let consumer = consumer_config(&config);

        assert_eq!(consumer.durable_name, None);
        assert_eq!(consumer.ack_policy, AckPolicy::Explicit);
        assert_eq!(consumer.max_ack_pending, 25);
        assert_eq!(consumer.filter_subject, "default");
        assert_eq!(consumer.deliver_policy, DeliverPolicy::All);
        assert_eq!(consumer.inactive_threshold, EPHEMERAL_INACTIVE_THRESHOLD);
    }

    #[test]
    fn test_durable_consumer_config() {
        let config = NatsSection {
            durable: Some("mailer".into()),
            deliver_new: Some(true),
            ..Default::default()
        }
        .finish(10);
        let consumer = consumer_config(&config);

        assert_eq!(consumer.durable_name.as_deref(), Some("mailer"));
        assert_eq!(consumer.deliver_policy, DeliverPolicy::New);
        assert_eq!(consumer.inactive_threshold, Duration::ZERO);
    }

    #[test]
    fn test_rate_limiter_admits_burst() {
        let limiter = rate_limiter(5);
        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_rate_limiter_zero_is_clamped() {
        let limiter = rate_limiter(0);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_rate_limiter_saturates_above_u32() {
        let limiter = rate_limiter(u64::from(u32::MAX) + 1);
        for _ in 0..1000 {
            assert!(limiter.check().is_ok());
        }
    }
}
