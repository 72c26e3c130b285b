//! NATS test infrastructure
//!
//! Provides a `TestNats` helper that creates a NATS container with JetStream for testing.

use async_nats::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::nats::Nats;

/// Test NATS wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
/// JetStream is enabled by default for stream-based testing.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestNats;
///
/// # async fn example() {
/// let nats = TestNats::new().await;
///
/// // Get a client for your tests
/// let client = nats.client();
///
/// // Or get JetStream context
/// let jetstream = nats.jetstream();
///
/// // Create streams, publish/consume messages, etc.
/// # }
/// ```
pub struct TestNats {
    container: ContainerAsync<Nats>,
    client: Client,
    pub connection_string: String,
}

impl TestNats {
    /// Create a new test NATS instance with JetStream enabled
    ///
    /// Uses NATS latest image with JetStream (-js flag).
    pub async fn new() -> Self {
        // Use NATS with JetStream enabled (-js flag)
        let nats_image = Nats::default().with_tag("latest").with_cmd(["-js"]); // Enable JetStream

        let container = nats_image
            .start()
            .await
            .expect("Failed to start NATS container");

        let host_port = container
            .get_host_port_ipv4(4222)
            .await
            .expect("Failed to get NATS port");

        let connection_string = format!("nats://127.0.0.1:{}", host_port);

        let client = async_nats::connect(&connection_string)
            .await
            .expect("Failed to connect to NATS");

        tracing::info!(port = host_port, "Test NATS ready with JetStream");

        Self {
            container,
            client,
            connection_string,
        }
    }

    /// Get a cloned client (useful for passing to services)
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Get a JetStream context for stream operations
    pub fn jetstream(&self) -> async_nats::jetstream::Context {
        async_nats::jetstream::new(self.client.clone())
    }

    /// Get the connection string for manual client creation
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Number of messages currently stored in a stream
    pub async fn stream_messages(&self, name: &str) -> u64 {
        let mut stream = self
            .jetstream()
            .get_stream(name)
            .await
            .expect("Failed to get stream");

        stream
            .info()
            .await
            .expect("Failed to get stream info")
            .state
            .messages
    }

    /// Number of consumers attached to a stream
    pub async fn stream_consumers(&self, name: &str) -> usize {
        let mut stream = self
            .jetstream()
            .get_stream(name)
            .await
            .expect("Failed to get stream");

        stream
            .info()
            .await
            .expect("Failed to get stream info")
            .state
            .consumer_count
    }

    /// Freeze the server process; open connections stay up but get no replies
    pub async fn pause(&self) {
        self.container
            .pause()
            .await
            .expect("Failed to pause NATS container");
    }

    /// Thaw a server frozen with [`TestNats::pause`]
    pub async fn unpause(&self) {
        self.container
            .unpause()
            .await
            .expect("Failed to unpause NATS container");
    }

    /// Whether a stream exists
    pub async fn stream_exists(&self, name: &str) -> bool {
        self.jetstream().get_stream(name).await.is_ok()
    }
}

// Container is automatically cleaned up when TestNats is dropped
impl Drop for TestNats {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test NATS container");
    }
}
