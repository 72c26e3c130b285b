//! Queue boundary between drivers and dispatchers.

use crate::job::Headers;
use async_trait::async_trait;
use std::fmt::Debug;

/// Error type returned by queue item operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An item sitting in the priority queue, waiting for dispatch.
///
/// Items produced by a driver keep a handle to their delivery so dispatchers
/// can acknowledge or requeue them once processing finishes.
#[async_trait]
pub trait QueueItem: Send + Sync + Debug {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn priority(&self) -> i64;

    fn pipeline(&self) -> &str;

    fn payload(&self) -> &[u8];

    fn headers(&self) -> &Headers;

    /// Acknowledge successful processing.
    async fn ack(&self) -> Result<(), BoxError>;

    /// Negative acknowledgement; the backend redelivers.
    async fn nack(&self) -> Result<(), BoxError>;

    /// Nack, or requeue with new delay when `requeue` is set.
    async fn nack_with_options(&mut self, requeue: bool, delay: i64) -> Result<(), BoxError>;

    /// Put the item back at the tail of its pipeline.
    async fn requeue(&mut self, headers: Headers, delay: i64) -> Result<(), BoxError>;
}

/// The shared priority queue. Drivers only ever insert.
pub trait Queue: Send + Sync {
    fn insert(&self, item: Box<dyn QueueItem>);
}
