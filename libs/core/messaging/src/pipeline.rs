//! Pipeline definition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Immutable description of a pipeline: its name, the driver that serves it,
/// its priority, and free-form driver options.
///
/// Drivers read options through the typed accessors, which fall back to the
/// supplied default when the key is absent or has the wrong shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,

    pub driver: String,

    #[serde(default)]
    pub priority: i64,

    #[serde(default, flatten)]
    options: Map<String, Value>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            priority: 0,
            options: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set a driver option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Whether an option is set (and not null).
    pub fn has(&self, key: &str) -> bool {
        self.options.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        match self.options.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    pub fn bool(&self, key: &str, default: bool) -> bool {
        match self.options.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn int(&self, key: &str, default: i64) -> i64 {
        match self.options.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}
