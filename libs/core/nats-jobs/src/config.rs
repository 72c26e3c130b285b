//! Driver configuration: section merging and defaults.

use crate::error::NatsJobsError;
use async_nats::jetstream::consumer::DeliverPolicy;
use core_config::Configurer;
use messaging::Pipeline;
use serde::Deserialize;

/// Name of the global configuration section (and of the plugin).
pub const PLUGIN_NAME: &str = "nats";

/// Conventional NATS server address.
pub const DEFAULT_URL: &str = "nats://127.0.0.1:4222";

pub const DEFAULT_STREAM: &str = "default-stream";
pub const DEFAULT_SUBJECT: &str = "default";
pub const DEFAULT_RATE_LIMIT: u64 = 1000;
pub const DEFAULT_PRIORITY: i64 = 10;

/// Prefetch when built from a configuration key.
pub const CONFIG_DEFAULT_PREFETCH: usize = 10;

/// Prefetch when built from a pipeline.
pub const PIPELINE_DEFAULT_PREFETCH: usize = 100;

// pipeline option keys
const PIPE_SUBJECT: &str = "subject";
const PIPE_STREAM: &str = "stream";
const PIPE_PREFETCH: &str = "prefetch";
const PIPE_DELETE_AFTER_ACK: &str = "delete_after_ack";
const PIPE_DELIVER_NEW: &str = "deliver_new";
const PIPE_DELIVER_LAST: &str = "deliver_last";
const PIPE_RATE_LIMIT: &str = "rate_limit";
const PIPE_DELETE_STREAM_ON_STOP: &str = "delete_stream_on_stop";
const PIPE_CONSUME_ALL: &str = "consume_all";
const PIPE_DURABLE: &str = "durable";

/// Raw configuration section. Every field is optional so a specific section
/// can be layered over the global one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NatsSection {
    pub addr: Option<String>,
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Client connection name
    pub name: Option<String>,
    pub consume_all: Option<bool>,
    pub priority: Option<i64>,
    pub subject: Option<String>,
    pub stream: Option<String>,
    pub prefetch: Option<i64>,
    pub rate_limit: Option<u64>,
    pub delete_after_ack: Option<bool>,
    pub deliver_new: Option<bool>,
    pub deliver_last: Option<bool>,
    pub delete_stream_on_stop: Option<bool>,
    /// Durable consumer name
    pub durable: Option<String>,
}

impl NatsSection {
    /// Layer `self` over `global`: fields set here win.
    pub fn merge_over(self, global: NatsSection) -> NatsSection {
        NatsSection {
            addr: self.addr.or(global.addr),
            token: self.token.or(global.token),
            user: self.user.or(global.user),
            password: self.password.or(global.password),
            name: self.name.or(global.name),
            consume_all: self.consume_all.or(global.consume_all),
            priority: self.priority.or(global.priority),
            subject: self.subject.or(global.subject),
            stream: self.stream.or(global.stream),
            prefetch: self.prefetch.or(global.prefetch),
            rate_limit: self.rate_limit.or(global.rate_limit),
            delete_after_ack: self.delete_after_ack.or(global.delete_after_ack),
            deliver_new: self.deliver_new.or(global.deliver_new),
            deliver_last: self.deliver_last.or(global.deliver_last),
            delete_stream_on_stop: self.delete_stream_on_stop.or(global.delete_stream_on_stop),
            durable: self.durable.or(global.durable),
        }
    }

    /// Read the driver options set on a pipeline.
    pub fn from_pipeline(pipe: &Pipeline) -> NatsSection {
        let string = |key: &str| pipe.has(key).then(|| pipe.string(key, ""));
        let boolean = |key: &str| pipe.has(key).then(|| pipe.bool(key, false));
        let int = |key: &str| pipe.has(key).then(|| pipe.int(key, 0));

        NatsSection {
            consume_all: boolean(PIPE_CONSUME_ALL),
            priority: Some(pipe.priority()),
            subject: string(PIPE_SUBJECT),
            stream: string(PIPE_STREAM),
            prefetch: int(PIPE_PREFETCH),
            rate_limit: int(PIPE_RATE_LIMIT).and_then(|v| u64::try_from(v).ok()),
            delete_after_ack: boolean(PIPE_DELETE_AFTER_ACK),
            deliver_new: boolean(PIPE_DELIVER_NEW),
            deliver_last: boolean(PIPE_DELIVER_LAST),
            delete_stream_on_stop: boolean(PIPE_DELETE_STREAM_ON_STOP),
            durable: string(PIPE_DURABLE),
            ..Default::default()
        }
    }

    /// Apply defaults to every unset or zero-valued field.
    pub fn finish(self, default_prefetch: usize) -> NatsConfig {
        NatsConfig {
            addr: non_empty(self.addr).unwrap_or_else(|| DEFAULT_URL.to_string()),
            token: non_empty(self.token),
            user: non_empty(self.user),
            password: self.password,
            name: non_empty(self.name),
            consume_all: self.consume_all.unwrap_or(false),
            priority: self
                .priority
                .filter(|p| *p != 0)
                .unwrap_or(DEFAULT_PRIORITY),
            subject: non_empty(self.subject).unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            stream: non_empty(self.stream).unwrap_or_else(|| DEFAULT_STREAM.to_string()),
            prefetch: self
                .prefetch
                .and_then(|p| usize::try_from(p).ok())
                .filter(|p| *p > 0)
                .unwrap_or(default_prefetch),
            rate_limit: self
                .rate_limit
                .filter(|r| *r > 0)
                .unwrap_or(DEFAULT_RATE_LIMIT),
            delete_after_ack: self.delete_after_ack.unwrap_or(false),
            deliver_new: self.deliver_new.unwrap_or(false),
            deliver_last: self.deliver_last.unwrap_or(false),
            delete_stream_on_stop: self.delete_stream_on_stop.unwrap_or(false),
            durable: non_empty(self.durable),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Immutable configuration snapshot of one driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsConfig {
    pub addr: String,
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub consume_all: bool,
    pub priority: i64,
    pub subject: String,
    pub stream: String,
    pub prefetch: usize,
    /// Messages per second handed to the queue.
    pub rate_limit: u64,
    pub delete_after_ack: bool,
    pub deliver_new: bool,
    pub deliver_last: bool,
    pub delete_stream_on_stop: bool,
    pub durable: Option<String>,
}

impl NatsConfig {
    /// Merge the section under `config_key` over the global `nats` section.
    pub fn from_config_key<C: Configurer>(
        config_key: &str,
        cfg: &C,
    ) -> Result<Self, NatsJobsError> {
        if !cfg.has(config_key) {
            return Err(core_config::ConfigError::MissingSection(config_key.to_string()).into());
        }

        if !cfg.has(PLUGIN_NAME) {
            return Err(NatsJobsError::Disabled(PLUGIN_NAME.to_string()));
        }

        let specific: NatsSection = cfg.unmarshal_key(config_key)?;
        let global: NatsSection = cfg.unmarshal_key(PLUGIN_NAME)?;

        Ok(specific.merge_over(global).finish(CONFIG_DEFAULT_PREFETCH))
    }

    /// Merge the pipeline's options over the global `nats` section.
    pub fn from_pipeline<C: Configurer>(pipe: &Pipeline, cfg: &C) -> Result<Self, NatsJobsError> {
        if !cfg.has(PLUGIN_NAME) {
            return Err(NatsJobsError::Disabled(PLUGIN_NAME.to_string()));
        }

        let global: NatsSection = cfg.unmarshal_key(PLUGIN_NAME)?;

        Ok(NatsSection::from_pipeline(pipe)
            .merge_over(global)
            .finish(PIPELINE_DEFAULT_PREFETCH))
    }

    /// Where a new consumer starts: `deliver_new` wins over `deliver_last`,
    /// otherwise the whole stream.
    pub fn deliver_policy(&self) -> DeliverPolicy {
        if self.deliver_new {
            DeliverPolicy::New
        } else if self.deliver_last {
            DeliverPolicy::Last
        } else {
            DeliverPolicy::All
        }
    }
}
