//! Driver lifecycle contract.

use crate::job::Job;
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use serde::Serialize;

/// Point-in-time report of a driver's pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct State {
    /// Bound pipeline name.
    pub pipeline: String,
    /// Bound pipeline priority.
    pub priority: u64,
    /// Driver tag of the pipeline.
    pub driver: String,
    /// Backend queue identifier (subject, topic, ...).
    pub queue: String,
    /// Messages delivered but not yet acknowledged.
    pub active: i64,
    /// Delayed messages.
    pub delayed: i64,
    /// Outstanding pull requests / reserved messages.
    pub reserved: i64,
    /// Whether a listener is consuming.
    pub ready: bool,
}

/// A job queue driver bound to one pipeline.
///
/// `run` starts consumption, `pause`/`resume` toggle it, `stop` tears the
/// driver down for good. `register` rebinds the pipeline definition without
/// touching the listener.
#[async_trait]
pub trait Driver: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish a job.
    async fn push(&self, job: Job) -> Result<(), Self::Error>;

    /// Start consuming for `pipeline`.
    async fn run(&self, pipeline: &Pipeline) -> Result<(), Self::Error>;

    /// Replace the bound pipeline definition.
    async fn register(&self, pipeline: Pipeline) -> Result<(), Self::Error>;

    async fn pause(&self, pipeline: &str) -> Result<(), Self::Error>;

    async fn resume(&self, pipeline: &str) -> Result<(), Self::Error>;

    async fn state(&self) -> Result<State, Self::Error>;

    async fn stop(&self) -> Result<(), Self::Error>;
}
