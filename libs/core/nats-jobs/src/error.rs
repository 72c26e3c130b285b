//! Error types for the NATS jobs driver.

use std::fmt;
use thiserror::Error;

/// Broad classification of driver errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing section or unmarshal failure. Fatal at construction.
    Configuration,
    /// Initial connect failure.
    Connection,
    /// Stream lookup or creation failed.
    StreamProvisioning,
    /// Delayed delivery was requested.
    UnsupportedFeature,
    /// Invalid lifecycle transition; driver state is unchanged.
    StateTransition,
    /// Inbound message did not match the job schema.
    Decode,
    /// Publish, consumer or JetStream API failure.
    Transport,
    /// The plugin has no global configuration.
    Disabled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::StreamProvisioning => write!(f, "stream_provisioning"),
            ErrorKind::UnsupportedFeature => write!(f, "unsupported_feature"),
            ErrorKind::StateTransition => write!(f, "state_transition"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Disabled => write!(f, "disabled"),
        }
    }
}

/// Error that can occur in NATS jobs driver operations.
#[derive(Debug, Error)]
pub enum NatsJobsError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] core_config::ConfigError),

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    Connection(String),

    /// Stream could not be queried or created
    #[error("Stream provisioning error for '{stream}': {message}")]
    StreamProvisioning { stream: String, message: String },

    /// Delayed delivery requested
    #[error("{op}: nats doesn't support delayed messages, see: https://github.com/nats-io/nats-streaming-server/issues/324")]
    DelayNotSupported { op: &'static str },

    /// Pipeline name does not match the bound pipeline
    #[error("no such pipeline registered: {requested} (bound: {bound})")]
    PipelineMismatch { requested: String, bound: String },

    /// Resume on an active listener
    #[error("nats listener is already in the active state")]
    AlreadyActive,

    /// Pause without an active listener
    #[error("no active listeners, nothing to pause")]
    NothingToPause,

    /// Operation on a stopped driver
    #[error("the driver is stopped")]
    Stopped,

    /// Serialization error
    #[error("{op}: serialization error: {source}")]
    Serialization {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Publish error
    #[error("{op}: publish error: {message}")]
    Publish { op: &'static str, message: String },

    /// Inbound message could not be decoded
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// JetStream error
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Consumer error
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// No global section
    #[error("no global '{0}' configuration, global configuration should contain NATS URL")]
    Disabled(String),
}

impl NatsJobsError {
    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NatsJobsError::Config(_) => ErrorKind::Configuration,
            NatsJobsError::Connection(_) => ErrorKind::Connection,
            NatsJobsError::StreamProvisioning { .. } => ErrorKind::StreamProvisioning,
            NatsJobsError::DelayNotSupported { .. } => ErrorKind::UnsupportedFeature,
            NatsJobsError::PipelineMismatch { .. }
            | NatsJobsError::AlreadyActive
            | NatsJobsError::NothingToPause
            | NatsJobsError::Stopped => ErrorKind::StateTransition,
            NatsJobsError::Decode(_) => ErrorKind::Decode,
            NatsJobsError::Serialization { .. }
            | NatsJobsError::Publish { .. }
            | NatsJobsError::JetStream(_)
            | NatsJobsError::Consumer(_) => ErrorKind::Transport,
            NatsJobsError::Disabled(_) => ErrorKind::Disabled,
        }
    }

    /// Create a JetStream error from an async_nats error.
    pub fn from_jetstream_error(error: impl fmt::Display) -> Self {
        Self::JetStream(error.to_string())
    }

    /// Create a publish error tagged with the operation.
    pub fn publish_error(op: &'static str, error: impl fmt::Display) -> Self {
        Self::Publish {
            op,
            message: error.to_string(),
        }
    }

    /// Create a consumer error.
    pub fn consumer_error(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }

    pub(crate) fn provisioning(stream: &str, error: impl fmt::Display) -> Self {
        Self::StreamProvisioning {
            stream: stream.to_string(),
            message: error.to_string(),
        }
    }
}
