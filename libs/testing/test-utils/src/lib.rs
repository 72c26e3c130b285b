//! Shared test utilities for the job drivers
//!
//! This crate provides reusable test infrastructure:
//! - `TestNats`: NATS container with JetStream and automatic cleanup (feature: "nats")
//! - `CollectingQueue`: a `Queue` that records inserted items (always available)
//! - `TestDataBuilder`: Deterministic stream and subject names (always available)
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Features
//!
//! - `nats` (default): Enables NATS test infrastructure
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use test_utils::{CollectingQueue, TestDataBuilder, TestNats};
//!
//! #[tokio::test]
//! async fn my_driver_test() {
//!     let nats = TestNats::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_driver_test");
//!     let queue = CollectingQueue::new();
//!
//!     let stream = builder.stream("main");
//!     // build a driver on `nats.connection_string()` and `stream`...
//!
//!     let item = queue.next_item(Duration::from_secs(5)).await;
//! }
//! ```

#[cfg(feature = "nats")]
mod nats;
mod queue;

#[cfg(feature = "nats")]
pub use nats::TestNats;
pub use queue::CollectingQueue;

/// Builder for test data with deterministic names
///
/// Each test gets its own streams and subjects so tests sharing a server do
/// not see each other's messages.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_push_and_run");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique name for testing
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(12345);
    /// assert_eq!(builder.name("pipeline", "main"), "test-pipeline-12345-main");
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Stream name. JetStream forbids dots in stream names.
    pub fn stream(&self, suffix: &str) -> String {
        self.name("stream", suffix)
    }

    /// Subject name
    pub fn subject(&self, suffix: &str) -> String {
        format!("test.{}.{}", self.seed, suffix)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}
