//! Counters for the NATS jobs driver.

use metrics::{counter, gauge};

#[derive(Clone, Debug)]
pub struct JobsMetrics {
    stream: String,
    subject: String,
}

impl JobsMetrics {
    pub fn new(stream: &str, subject: &str) -> Self {
        Self {
            stream: stream.to_string(),
            subject: subject.to_string(),
        }
    }

    pub fn job_pushed(&self) {
        counter!(
            "nats_jobs_pushed_total",
            "stream" => self.stream.clone(),
            "subject" => self.subject.clone()
        )
        .increment(1);
    }

    pub fn job_requeued(&self) {
        counter!(
            "nats_jobs_requeued_total",
            "stream" => self.stream.clone(),
            "subject" => self.subject.clone()
        )
        .increment(1);
    }

    /// Record a message handed to the queue.
    pub fn message_received(&self) {
        counter!(
            "nats_jobs_messages_received_total",
            "stream" => self.stream.clone(),
            "subject" => self.subject.clone()
        )
        .increment(1);
    }

    /// Record a message that could not be turned into an item.
    pub fn message_dropped(&self, reason: &str) {
        counter!(
            "nats_jobs_messages_dropped_total",
            "stream" => self.stream.clone(),
            "subject" => self.subject.clone(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// 1 while a listener is consuming, 0 otherwise.
    pub fn listener_active(&self, active: bool) {
        gauge!(
            "nats_jobs_listener_active",
            "stream" => self.stream.clone()
        )
        .set(if active { 1.0 } else { 0.0 });
    }
}
