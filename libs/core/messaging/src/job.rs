//! Outbound job pushed by application code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Multi-valued message headers.
pub type Headers = HashMap<String, Vec<String>>;

/// A job pushed into a pipeline.
///
/// The field names are the wire names; drivers serialize a job as-is.
///
/// # Example
///
/// ```rust
/// use messaging::Job;
///
/// let job = Job::new("send-email", r#"{"to":"ops@example.com"}"#)
///     .with_pipeline("emails")
///     .with_priority(5)
///     .with_header("tenant", "acme");
///
/// assert_eq!(job.name(), "send-email");
/// assert_eq!(job.delay(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job name, used by dispatchers to route to a handler.
    pub job: String,

    /// Unique job ID.
    pub id: String,

    /// Opaque payload.
    pub payload: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: Headers,

    #[serde(default)]
    pub options: JobOptions,
}

/// Delivery options attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Higher value = dispatched first.
    #[serde(default)]
    pub priority: i64,

    /// Target pipeline name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pipeline: String,

    /// Delay in seconds before the job becomes visible.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub delay: i64,

    /// Acknowledge on receipt instead of after processing.
    #[serde(default)]
    pub auto_ack: bool,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Job {
    /// Create a job with a fresh UUID.
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            job: name.into(),
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
            headers: Headers::new(),
            options: JobOptions::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Append a header value (headers are multi-valued).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.options.pipeline = pipeline.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: i64) -> Self {
        self.options.delay = delay;
        self
    }

    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.options.auto_ack = auto_ack;
        self
    }

    pub fn name(&self) -> &str {
        &self.job
    }

    pub fn delay(&self) -> i64 {
        self.options.delay
    }
}
