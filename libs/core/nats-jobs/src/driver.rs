//! The NATS JetStream driver.

use crate::config::NatsConfig;
use crate::connection;
use crate::error::NatsJobsError;
use crate::item::Item;
use crate::listener::{Listener, ListenerContext};
use crate::metrics::JobsMetrics;
use crate::publisher::{Publisher, PUSH_OP};
use crate::stream;
use arc_swap::ArcSwap;
use async_nats::jetstream::{self, Context};
use async_nats::Client;
use async_trait::async_trait;
use core_config::Configurer;
use messaging::{Driver, Job, Pipeline, Queue, State};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

/// Listener lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerStatus {
    /// Constructed, never run.
    Idle = 0,
    Active = 1,
    Paused = 2,
    /// Terminal.
    Stopped = 3,
}

impl ListenerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ListenerStatus::Active,
            2 => ListenerStatus::Paused,
            3 => ListenerStatus::Stopped,
            _ => ListenerStatus::Idle,
        }
    }
}

#[derive(Default)]
struct Runtime {
    listener: Option<Listener>,
    // stream teardown and connection drain completed
    closed: bool,
}

/// Job queue driver backed by one JetStream stream and subject.
///
/// Lifecycle calls are serialized; `push` and `state` run concurrently with
/// them. Items handed to the queue settle against the stream until the
/// driver is stopped.
pub struct NatsDriver {
    config: NatsConfig,
    client: Client,
    jetstream: Context,
    publisher: Arc<Publisher>,
    queue: Arc<dyn Queue>,
    pipeline: ArcSwap<Pipeline>,
    status: AtomicU8,
    stopped: Arc<AtomicBool>,
    runtime: Mutex<Runtime>,
    metrics: JobsMetrics,
}

impl NatsDriver {
    /// Build a driver from the section under `config_key`, layered over the
    /// global `nats` section.
    pub async fn from_config<C: Configurer>(
        config_key: &str,
        cfg: &C,
        pipeline: Pipeline,
        queue: Arc<dyn Queue>,
    ) -> Result<Self, NatsJobsError> {
        let config = NatsConfig::from_config_key(config_key, cfg)?;
        Self::connect(config, pipeline, queue).await
    }

    /// Build a driver from the pipeline's options, layered over the global
    /// `nats` section.
    pub async fn from_pipeline<C: Configurer>(
        pipeline: Pipeline,
        cfg: &C,
        queue: Arc<dyn Queue>,
    ) -> Result<Self, NatsJobsError> {
        let config = NatsConfig::from_pipeline(&pipeline, cfg)?;
        Self::connect(config, pipeline, queue).await
    }

    /// Connect and provision the stream.
    pub async fn connect(
        config: NatsConfig,
        pipeline: Pipeline,
        queue: Arc<dyn Queue>,
    ) -> Result<Self, NatsJobsError> {
        let client = connection::connect(&config).await?;
        let jetstream = jetstream::new(client.clone());
        let stream = stream::ensure_stream(&jetstream, &config.stream, &config.subject).await?;

        let metrics = JobsMetrics::new(&config.stream, &config.subject);
        let publisher = Arc::new(Publisher::new(
            jetstream.clone(),
            stream,
            config.stream.clone(),
            config.subject.clone(),
            metrics.clone(),
        ));

        debug!(
            pipeline = %pipeline.name(),
            stream = %config.stream,
            subject = %config.subject,
            "nats driver created"
        );

        Ok(Self {
            config,
            client,
            jetstream,
            publisher,
            queue,
            pipeline: ArcSwap::from_pointee(pipeline),
            status: AtomicU8::new(ListenerStatus::Idle as u8),
            stopped: Arc::new(AtomicBool::new(false)),
            runtime: Mutex::new(Runtime::default()),
            metrics,
        })
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    // callers hold the runtime lock
    fn set_status(&self, status: ListenerStatus) {
        self.status.store(status as u8, Ordering::Release);
        self.metrics.listener_active(status == ListenerStatus::Active);
    }

    fn ensure_bound(&self, requested: &str) -> Result<Arc<Pipeline>, NatsJobsError> {
        let bound = self.pipeline.load_full();
        if bound.name() != requested {
            return Err(NatsJobsError::PipelineMismatch {
                requested: requested.to_string(),
                bound: bound.name().to_string(),
            });
        }
        Ok(bound)
    }

    fn listener_context(&self) -> ListenerContext {
        ListenerContext {
            queue: self.queue.clone(),
            publisher: self.publisher.clone(),
            stopped: self.stopped.clone(),
            consume_all: self.config.consume_all,
            delete_after_ack: self.config.delete_after_ack,
            metrics: self.metrics.clone(),
        }
    }

    async fn start_listener(&self, runtime: &mut Runtime) -> Result<(), NatsJobsError> {
        let listener =
            Listener::start(self.publisher.stream(), &self.config, self.listener_context()).await?;
        runtime.listener = Some(listener);
        self.set_status(ListenerStatus::Active);
        Ok(())
    }

    async fn shutdown_listener(&self, mut listener: Listener) {
        if let Err(e) = listener.drain().await {
            error!(error = %e, "failed to drain listener");
        }
        listener.stop().await;
    }
}

#[async_trait]
impl Driver for NatsDriver {
    type Error = NatsJobsError;

    #[instrument(skip_all, fields(job = %job.job, id = %job.id))]
    async fn push(&self, job: Job) -> Result<(), NatsJobsError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(NatsJobsError::Stopped);
        }

        let start = Instant::now();
        let item = Item::from(job);
        let sequence = self.publisher.publish(PUSH_OP, &item).await?;

        self.metrics.job_pushed();
        debug!(
            sequence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "job was pushed successfully"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(pipeline = %pipeline.name()))]
    async fn run(&self, pipeline: &Pipeline) -> Result<(), NatsJobsError> {
        let start = Instant::now();
        let mut runtime = self.runtime.lock().await;

        if self.status() == ListenerStatus::Stopped {
            return Err(NatsJobsError::Stopped);
        }

        let bound = self.ensure_bound(pipeline.name())?;

        if self.status() == ListenerStatus::Active {
            warn!("nats listener is already in the active state");
            return Ok(());
        }

        self.start_listener(&mut runtime).await?;

        debug!(
            driver = %bound.driver(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline was started"
        );
        Ok(())
    }

    async fn register(&self, pipeline: Pipeline) -> Result<(), NatsJobsError> {
        debug!(pipeline = %pipeline.name(), "pipeline registered");
        self.pipeline.store(Arc::new(pipeline));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pause(&self, pipeline: &str) -> Result<(), NatsJobsError> {
        let start = Instant::now();
        let mut runtime = self.runtime.lock().await;

        let bound = self.ensure_bound(pipeline)?;

        match self.status() {
            ListenerStatus::Stopped => return Err(NatsJobsError::Stopped),
            ListenerStatus::Active => {}
            _ => return Err(NatsJobsError::NothingToPause),
        }

        self.set_status(ListenerStatus::Paused);
        if let Some(listener) = runtime.listener.take() {
            self.shutdown_listener(listener).await;
        }

        debug!(
            driver = %bound.driver(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline was paused"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resume(&self, pipeline: &str) -> Result<(), NatsJobsError> {
        let start = Instant::now();
        let mut runtime = self.runtime.lock().await;

        let bound = self.ensure_bound(pipeline)?;

        match self.status() {
            ListenerStatus::Stopped => return Err(NatsJobsError::Stopped),
            ListenerStatus::Active => return Err(NatsJobsError::AlreadyActive),
            _ => {}
        }

        self.start_listener(&mut runtime).await?;

        debug!(
            driver = %bound.driver(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline was resumed"
        );
        Ok(())
    }

    async fn state(&self) -> Result<State, NatsJobsError> {
        let pipeline = self.pipeline.load_full();
        let mut state = State {
            pipeline: pipeline.name().to_string(),
            priority: u64::try_from(pipeline.priority()).unwrap_or_default(),
            driver: pipeline.driver().to_string(),
            queue: self.config.subject.clone(),
            ready: self.status() == ListenerStatus::Active,
            ..Default::default()
        };

        let consumer = {
            let runtime = self.runtime.lock().await;
            runtime.listener.as_ref().map(Listener::consumer)
        };

        if let Some(mut consumer) = consumer {
            let info = consumer
                .info()
                .await
                .map_err(NatsJobsError::from_jetstream_error)?;
            state.active = i64::try_from(info.num_ack_pending).unwrap_or(i64::MAX);
            state.reserved = i64::try_from(info.num_waiting).unwrap_or(i64::MAX);
        }

        Ok(state)
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), NatsJobsError> {
        let start = Instant::now();
        let mut runtime = self.runtime.lock().await;

        if runtime.closed {
            warn!("nats driver is already stopped");
            return Ok(());
        }

        if self.status() != ListenerStatus::Stopped {
            self.stopped.store(true, Ordering::Release);
            if let Some(listener) = runtime.listener.take() {
                self.shutdown_listener(listener).await;
            }
            self.set_status(ListenerStatus::Stopped);
        }

        // a failure below leaves the driver stopped but not closed, so stop
        // can be retried
        if self.config.delete_stream_on_stop {
            stream::delete_stream(&self.jetstream, &self.config.stream).await?;
        }

        self.client
            .drain()
            .await
            .map_err(|e| NatsJobsError::Connection(format!("failed to drain connection: {e}")))?;
        runtime.closed = true;

        let pipeline = self.pipeline.load_full();
        debug!(
            pipeline = %pipeline.name(),
            driver = %pipeline.driver(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline was stopped"
        );
        Ok(())
    }
}
