//! Decoding inbound messages into items.

use crate::config::DEFAULT_PRIORITY;
use crate::error::NatsJobsError;
use crate::item::{Item, Sequence};
use async_nats::HeaderMap;
use messaging::{Headers, Job, JobOptions};

/// Job name and pipeline given to messages consumed in raw mode.
pub const AUTO: &str = "deduced_by_rr";

/// Decode a message body.
///
/// In raw mode the body is taken as-is: the job is named [`AUTO`], its id is
/// `"<consumer seq>:<stream seq>"`, it gets the default priority and the
/// transport headers are kept. Bodies that are not UTF-8 are converted lossily.
pub fn unpack(
    consume_all: bool,
    payload: &[u8],
    headers: Headers,
    sequence: Sequence,
) -> Result<Item, NatsJobsError> {
    let job = if consume_all {
        Job {
            job: AUTO.to_string(),
            id: format!("{}:{}", sequence.consumer, sequence.stream),
            payload: String::from_utf8_lossy(payload).into_owned(),
            headers,
            options: JobOptions {
                priority: DEFAULT_PRIORITY,
                pipeline: AUTO.to_string(),
                ..Default::default()
            },
        }
    } else {
        serde_json::from_slice::<Job>(payload).map_err(NatsJobsError::Decode)?
    };

    Ok(Item::from(job).with_sequence(sequence))
}

/// Copy NATS headers into the multi-valued header map.
pub fn headers_from_nats(headers: Option<&HeaderMap>) -> Headers {
    let mut out = Headers::new();

    if let Some(headers) = headers {
        for (name, values) in headers.iter() {
            out.entry(name.to_string())
                .or_default()
                .extend(values.iter().map(|v| v.to_string()));
        }
    }

    out
}
