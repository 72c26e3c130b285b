//! Stream provisioning.

use crate::error::NatsJobsError;
use async_nats::jetstream::context::{GetStreamError, GetStreamErrorKind};
use async_nats::jetstream::stream::{Config as StreamConfig, Stream};
use async_nats::jetstream::{Context, ErrorCode};
use tracing::{debug, info};

/// Look the stream up, creating it with a single subject when the server
/// reports it missing. Any other lookup failure is returned as is.
pub async fn ensure_stream(
    jetstream: &Context,
    name: &str,
    subject: &str,
) -> Result<Stream, NatsJobsError> {
    match jetstream.get_stream(name).await {
        Ok(stream) => {
            debug!(stream = %name, "Stream already exists");
            Ok(stream)
        }
        Err(err) if is_stream_not_found(&err) => {
            info!(stream = %name, subject = %subject, "Creating stream");

            let stream = jetstream
                .create_stream(StreamConfig {
                    name: name.to_string(),
                    subjects: vec![subject.to_string()],
                    ..Default::default()
                })
                .await
                .map_err(|e| NatsJobsError::provisioning(name, e))?;

            info!(stream = %name, "Stream created");
            Ok(stream)
        }
        Err(err) => Err(NatsJobsError::provisioning(name, err)),
    }
}

/// Remove the stream and every message in it.
pub async fn delete_stream(jetstream: &Context, name: &str) -> Result<(), NatsJobsError> {
    jetstream
        .delete_stream(name)
        .await
        .map_err(NatsJobsError::from_jetstream_error)?;

    info!(stream = %name, "Stream deleted");
    Ok(())
}

fn is_stream_not_found(err: &GetStreamError) -> bool {
    matches!(
        err.kind(),
        GetStreamErrorKind::JetStream(e) if e.error_code() == ErrorCode::STREAM_NOT_FOUND
    )
}
