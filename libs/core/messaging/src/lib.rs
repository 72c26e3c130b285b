//! Common abstractions shared by job queue drivers.
//!
//! A driver sits between application code and a durable backend:
//!
//! ```text
//! ┌─────────────┐  push(Job)   ┌──────────┐   publish   ┌────────────────┐
//! │ Application │─────────────▶│  Driver  │────────────▶│    Backend     │
//! └─────────────┘              │          │◀────────────│ (e.g. NATS JS) │
//!        ▲                     └──────────┘   consume   └────────────────┘
//!        │ dispatch                 │ insert(QueueItem)
//!  ┌─────────────┐                  ▼
//!  │ Priority    │◀──────────── Queue
//!  │ dispatcher  │
//!  └─────────────┘
//! ```
//!
//! - [`Job`]: outbound unit of work pushed by application code
//! - [`Pipeline`]: immutable description of a named pipeline and its options
//! - [`Queue`] / [`QueueItem`]: the shared priority queue a driver feeds
//! - [`Driver`]: lifecycle contract (run / pause / resume / stop / state)
//!
//! # Example
//!
//! ```rust,ignore
//! use messaging::{Driver, Job, Pipeline};
//!
//! let pipeline = Pipeline::new("emails", "nats").with_priority(5);
//! driver.run(&pipeline).await?;
//!
//! driver
//!     .push(Job::new("send-email", r#"{"to":"a@b.c"}"#).with_pipeline("emails"))
//!     .await?;
//! ```

mod driver;
mod job;
mod pipeline;
mod queue;

pub use driver::{Driver, State};
pub use job::{Headers, Job, JobOptions};
pub use pipeline::Pipeline;
pub use queue::{BoxError, Queue, QueueItem};
