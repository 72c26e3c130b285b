//! Plugin entry point: hands out drivers for pipelines.

use crate::config::PLUGIN_NAME;
use crate::driver::NatsDriver;
use crate::error::NatsJobsError;
use core_config::Configurer;
use messaging::{Pipeline, Queue};
use std::sync::Arc;

/// Factory for [`NatsDriver`]s sharing one configuration.
pub struct NatsJobsPlugin<C: Configurer> {
    cfg: Arc<C>,
}

impl<C: Configurer> NatsJobsPlugin<C> {
    /// Fails with [`NatsJobsError::Disabled`] when there is no global `nats`
    /// section.
    pub fn init(cfg: Arc<C>) -> Result<Self, NatsJobsError> {
        if !cfg.has(PLUGIN_NAME) {
            return Err(NatsJobsError::Disabled(PLUGIN_NAME.to_string()));
        }

        Ok(Self { cfg })
    }

    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    pub async fn driver_from_config(
        &self,
        config_key: &str,
        queue: Arc<dyn Queue>,
        pipeline: Pipeline,
    ) -> Result<NatsDriver, NatsJobsError> {
        NatsDriver::from_config(config_key, self.cfg.as_ref(), pipeline, queue).await
    }

    pub async fn driver_from_pipeline(
        &self,
        pipeline: Pipeline,
        queue: Arc<dyn Queue>,
    ) -> Result<NatsDriver, NatsJobsError> {
        NatsDriver::from_pipeline(pipeline, self.cfg.as_ref(), queue).await
    }
}
