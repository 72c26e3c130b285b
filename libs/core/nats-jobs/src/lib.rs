//! NATS JetStream job queue driver.
//!
//! Publishes jobs to a single subject of a JetStream stream and consumes them
//! through a pull consumer, handing every decoded message to a shared
//! priority [`Queue`](messaging::Queue) for dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌─────────────────────┐     ┌────────────────┐
//! │  NatsDriver    │────▶│   NATS JetStream    │────▶│    Listener    │
//! │    (push)      │     │  (stream/subject)   │     │ (pump, worker) │
//! └────────────────┘     └─────────────────────┘     └────────────────┘
//!                                  ▲                         │
//!                                  │ ack / nak / requeue     ▼
//!                        ┌─────────────────┐        ┌────────────────┐
//!                        │      Item       │◀───────│     Queue      │
//!                        └─────────────────┘        └────────────────┘
//! ```
//!
//! # Key Features
//!
//! - **Stream provisioning**: the stream is created on first use
//! - **Lifecycle**: run, pause, resume and stop, serialized per driver
//! - **Raw mode**: consume foreign messages with `consume_all`
//! - **Rate limiting**: messages per second handed to the queue
//! - **Prometheus Metrics**: pushes, requeues, received and dropped messages
//!
//! # Example
//!
//! ```rust,ignore
//! use core_config::ConfigTree;
//! use messaging::{Driver, Job, Pipeline};
//! use nats_jobs::NatsJobsPlugin;
//!
//! let cfg = Arc::new(ConfigTree::from_file("config.json")?);
//! let plugin = NatsJobsPlugin::init(cfg)?;
//!
//! let pipeline = Pipeline::new("emails", "nats").with_option("subject", "mail");
//! let driver = plugin.driver_from_pipeline(pipeline.clone(), queue).await?;
//!
//! driver.push(Job::new("send-email", body).with_pipeline("emails")).await?;
//! driver.run(&pipeline).await?;
//! ```

mod config;
mod connection;
mod driver;
mod error;
mod item;
mod listener;
pub mod metrics;
mod plugin;
mod publisher;
mod stream;
mod unpack;

pub use config::{
    NatsConfig, NatsSection, CONFIG_DEFAULT_PREFETCH, DEFAULT_PRIORITY, DEFAULT_RATE_LIMIT,
    DEFAULT_STREAM, DEFAULT_SUBJECT, DEFAULT_URL, PIPELINE_DEFAULT_PREFETCH, PLUGIN_NAME,
};
pub use driver::{ListenerStatus, NatsDriver};
pub use error::{ErrorKind, NatsJobsError};
pub use item::{Item, Sequence};
pub use plugin::NatsJobsPlugin;
pub use publisher::{PUSH_OP, REQUEUE_OP};
pub use unpack::{headers_from_nats, unpack, AUTO};

// Re-export from messaging
pub use messaging::{Driver, Job, Pipeline, Queue, QueueItem, State};
