//! NATS connection setup.

use crate::config::NatsConfig;
use crate::error::NatsJobsError;
use async_nats::{Client, ConnectOptions, Event};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PING_INTERVAL: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connect with unlimited reconnects and connection events routed to logs.
///
/// Only the initial connect can fail; later disconnects are retried in the
/// background.
pub async fn connect(config: &NatsConfig) -> Result<Client, NatsJobsError> {
    let mut options = ConnectOptions::new()
        .no_echo()
        .request_timeout(Some(REQUEST_TIMEOUT))
        .ping_interval(PING_INTERVAL)
        .max_reconnects(None::<usize>)
        .reconnect_delay_callback(|_attempts| RECONNECT_DELAY)
        .event_callback(|event| async move {
            match event {
                Event::Connected => info!("nats connection established"),
                Event::Disconnected => warn!("nats connection lost, reconnecting"),
                Event::ClientError(e) => error!(error = %e, "nats client error"),
                Event::ServerError(e) => error!(error = %e, "nats server error"),
                Event::SlowConsumer(sid) => warn!(sid, "nats slow consumer"),
                other => debug!(event = %other, "nats connection event"),
            }
        });

    if let Some(name) = &config.name {
        options = options.name(name);
    }

    if let Some(token) = &config.token {
        options = options.token(token.clone());
    }

    if let Some(user) = &config.user {
        options = options.user_and_password(
            user.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }

    let client = options.connect(config.addr.as_str()).await.map_err(|e| {
        NatsJobsError::Connection(format!("failed to connect to {}: {e}", config.addr))
    })?;

    debug!(addr = %config.addr, "Connected to NATS");
    Ok(client)
}
