//! Integration tests for the NATS jobs driver
//!
//! These tests use a real NATS server with JetStream via testcontainers to
//! ensure:
//! - Jobs round-trip from push to the queue
//! - Lifecycle transitions behave as documented
//! - Items settle against the stream
//! - Stream provisioning and teardown work

use async_nats::HeaderMap;
use core_config::{ConfigTree, Environment};
use messaging::Headers;
use nats_jobs::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{assertions::*, CollectingQueue, TestDataBuilder, TestNats};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(500);

fn config(nats: &TestNats) -> ConfigTree {
    ConfigTree::new(json!({"nats": {"addr": nats.connection_string()}}))
}

fn pipeline(builder: &TestDataBuilder, name: &str) -> Pipeline {
    Pipeline::new(name, "nats")
        .with_option("stream", builder.stream("jobs"))
        .with_option("subject", builder.subject("jobs"))
}

async fn driver_for(
    nats: &TestNats,
    pipeline: Pipeline,
    queue: Arc<CollectingQueue>,
) -> NatsDriver {
    core_config::tracing::init_tracing(&Environment::from_env());

    match NatsDriver::from_pipeline(pipeline, &config(nats), queue).await {
        Ok(driver) => driver,
        Err(e) => panic!("failed to create driver: {e}"),
    }
}

/// Poll `state()` until the consumer reports `expected` unacked messages.
async fn wait_for_active(driver: &NatsDriver, expected: i64) -> bool {
    let poll = async {
        loop {
            if driver.state().await.unwrap().active == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    tokio::time::timeout(WAIT, poll).await.is_ok()
}

// ============================================================================
// Push / Run
// ============================================================================

#[tokio::test]
async fn test_push_then_run_delivers_job() {
    let nats = TestNats::new().await;
    let queue = CollectingQueue::new();
    let pipe = Pipeline::new("emails", "nats");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    assert_eq!(driver.config().stream, DEFAULT_STREAM);
    assert_eq!(driver.config().subject, DEFAULT_SUBJECT);
    assert_eq!(driver.config().prefetch, PIPELINE_DEFAULT_PREFETCH);

    driver
        .push(
            Job::new("send-email", r#"{"to":"ops@example.com"}"#)
                .with_id("job-1")
                .with_pipeline("emails"),
        )
        .await
        .unwrap();
    assert_eq!(nats.stream_messages(DEFAULT_STREAM).await, 1);

    driver.run(&pipe).await.unwrap();

    let item = assert_some(queue.next_item(WAIT).await, "pushed job should be delivered");
    assert_eq!(item.name(), "send-email");
    assert_eq!(item.id(), "job-1");
    assert_eq!(item.pipeline(), "emails");
    assert_eq!(item.payload(), br#"{"to":"ops@example.com"}"#);

    item.ack().await.unwrap();
    assert!(queue.next_item(QUIET).await.is_none());

    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_push_with_delay_is_rejected() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("push_with_delay");
    let queue = CollectingQueue::new();
    let driver = driver_for(&nats, pipeline(&builder, "emails"), queue).await;

    let err = driver
        .push(Job::new("send-email", "{}").with_delay(10))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    assert!(err.to_string().starts_with(PUSH_OP));
    assert_eq!(nats.stream_messages(&builder.stream("jobs")).await, 0);
}

#[tokio::test]
async fn test_run_is_idempotent() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("run_idempotent");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue).await;

    driver.run(&pipe).await.unwrap();
    driver.run(&pipe).await.unwrap();

    assert!(driver.state().await.unwrap().ready);
    assert_eq!(driver.status(), ListenerStatus::Active);
    assert_eq!(nats.stream_consumers(&builder.stream("jobs")).await, 1);
}

#[tokio::test]
async fn test_run_rejects_unknown_pipeline() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("run_unknown");
    let queue = CollectingQueue::new();
    let driver = driver_for(&nats, pipeline(&builder, "emails"), queue).await;

    let err = driver
        .run(&Pipeline::new("sms", "nats"))
        .await
        .unwrap_err();
    assert!(matches!(err, NatsJobsError::PipelineMismatch { .. }));

    let err = driver.pause("sms").await.unwrap_err();
    assert!(matches!(err, NatsJobsError::PipelineMismatch { .. }));

    assert_eq!(driver.status(), ListenerStatus::Idle);
}

// ============================================================================
// Pause / Resume
// ============================================================================

#[tokio::test]
async fn test_pause_while_idle_fails() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("pause_idle");
    let queue = CollectingQueue::new();
    let driver = driver_for(&nats, pipeline(&builder, "emails"), queue).await;

    let err = driver.pause("emails").await.unwrap_err();

    assert!(matches!(err, NatsJobsError::NothingToPause));
    assert!(!driver.state().await.unwrap().ready);
}

#[tokio::test]
async fn test_resume_while_active_fails() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("resume_active");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue).await;

    driver.run(&pipe).await.unwrap();
    let err = driver.resume("emails").await.unwrap_err();

    assert!(matches!(err, NatsJobsError::AlreadyActive));
    assert!(driver.state().await.unwrap().ready);
    assert_eq!(nats.stream_consumers(&builder.stream("jobs")).await, 1);
}

#[tokio::test]
async fn test_pause_stops_delivery_until_resume() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("pause_resume");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver.pause("emails").await.unwrap();
    assert!(!driver.state().await.unwrap().ready);
    assert_eq!(driver.status(), ListenerStatus::Paused);

    driver
        .push(Job::new("send-email", "{}").with_id("while-paused"))
        .await
        .unwrap();
    assert!(queue.next_item(QUIET).await.is_none());

    driver.resume("emails").await.unwrap();
    let item = assert_some(queue.next_item(WAIT).await, "job should arrive after resume");
    assert_eq!(item.id(), "while-paused");
    assert!(driver.state().await.unwrap().ready);
}

// ============================================================================
// Register / State
// ============================================================================

#[tokio::test]
async fn test_register_rebinds_pipeline() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("register");
    let queue = CollectingQueue::new();
    let old = pipeline(&builder, "emails");
    let driver = driver_for(&nats, old.clone(), queue).await;

    let new = pipeline(&builder, "emails-v2").with_priority(42);
    driver.register(new.clone()).await.unwrap();

    let state = driver.state().await.unwrap();
    assert_eq!(state.pipeline, "emails-v2");
    assert_eq!(state.priority, 42);
    assert_eq!(state.driver, "nats");
    assert_eq!(state.queue, builder.subject("jobs"));

    assert!(matches!(
        driver.run(&old).await.unwrap_err(),
        NatsJobsError::PipelineMismatch { .. }
    ));
    driver.run(&new).await.unwrap();
}

#[tokio::test]
async fn test_state_counts_unacked_items() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("state_unacked");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver.push(Job::new("a", "{}")).await.unwrap();
    driver.push(Job::new("b", "{}")).await.unwrap();

    let first = assert_some(queue.next_item(WAIT).await, "first job");
    let _second = assert_some(queue.next_item(WAIT).await, "second job");

    let state = driver.state().await.unwrap();
    assert!(state.ready);
    assert_eq!(state.active, 2);
    assert_eq!(state.delayed, 0);

    first.ack().await.unwrap();
}

#[tokio::test]
async fn test_state_query_does_not_block_lifecycle() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("state_unblocked");
    let pipe = pipeline(&builder, "emails").with_option("durable", "mailer");
    let driver = Arc::new(driver_for(&nats, pipe.clone(), CollectingQueue::new()).await);

    driver.run(&pipe).await.unwrap();

    // the consumer info request hangs while the server is frozen
    nats.pause().await;
    let query = tokio::spawn({
        let driver = driver.clone();
        async move { driver.state().await.map(|state| state.ready) }
    });
    tokio::time::sleep(QUIET).await;

    let paused = tokio::time::timeout(WAIT, driver.pause("emails")).await;
    assert!(matches!(paused, Ok(Ok(()))), "pause waited on the state query");
    assert_eq!(driver.status(), ListenerStatus::Paused);

    query.abort();
    nats.unpause().await;
}

// ============================================================================
// Item settlement
// ============================================================================

#[tokio::test]
async fn test_requeue_republishes_and_drops_original() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("requeue");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver
        .push(Job::new("send-email", "{}").with_id("job-1"))
        .await
        .unwrap();

    let mut item = assert_some(queue.next_item(WAIT).await, "job should be delivered");

    let err = item.requeue(Headers::new(), 5).await.unwrap_err();
    assert!(err.to_string().contains("doesn't support delayed messages"));

    let mut headers = Headers::new();
    headers.insert("attempt".into(), vec!["2".into()]);
    item.requeue(headers, 0).await.unwrap();

    let again = assert_some(queue.next_item(WAIT).await, "requeued job should be delivered");
    assert_eq!(again.id(), "job-1");
    assert_eq!(again.headers()["attempt"], vec!["2".to_string()]);
    assert_eq!(nats.stream_messages(&builder.stream("jobs")).await, 1);
}

#[tokio::test]
async fn test_delete_after_ack_removes_message() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("delete_after_ack");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails").with_option("delete_after_ack", true);
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver.push(Job::new("send-email", "{}")).await.unwrap();

    let item = assert_some(queue.next_item(WAIT).await, "job should be delivered");
    assert_eq!(nats.stream_messages(&builder.stream("jobs")).await, 1);

    item.ack().await.unwrap();
    assert_eq!(nats.stream_messages(&builder.stream("jobs")).await, 0);
}

#[tokio::test]
async fn test_auto_ack_settles_on_receipt() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("auto_ack");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver
        .push(Job::new("send-email", "{}").with_auto_ack(true))
        .await
        .unwrap();

    let item = assert_some(queue.next_item(WAIT).await, "job should be delivered");
    assert!(wait_for_active(&driver, 0).await, "auto-acked job should not stay pending");
    item.ack().await.unwrap();
}

#[tokio::test]
async fn test_nack_redelivers() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("nack");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver
        .push(Job::new("send-email", "{}").with_id("job-1"))
        .await
        .unwrap();

    let item = assert_some(queue.next_item(WAIT).await, "job should be delivered");
    item.nack().await.unwrap();

    let again = assert_some(queue.next_item(WAIT).await, "nacked job should be redelivered");
    assert_eq!(again.id(), "job-1");
}

// ============================================================================
// Inbound decoding
// ============================================================================

#[tokio::test]
async fn test_raw_mode_wraps_foreign_messages() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("raw_mode");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "events").with_option("consume_all", true);
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    let mut headers = HeaderMap::new();
    headers.insert("x-source", "billing");
    nats.jetstream()
        .publish_with_headers(builder.subject("jobs"), headers, "plain text".into())
        .await
        .unwrap()
        .await
        .unwrap();

    driver.run(&pipe).await.unwrap();

    let item = assert_some(queue.next_item(WAIT).await, "raw message should be delivered");
    assert_eq!(item.name(), AUTO);
    assert_eq!(item.pipeline(), AUTO);
    assert_eq!(item.id(), "1:1");
    assert_eq!(item.payload(), b"plain text");
    assert_eq!(item.headers()["x-source"], vec!["billing".to_string()]);
}

#[tokio::test]
async fn test_undecodable_message_is_dropped() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("undecodable");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    nats.jetstream()
        .publish(builder.subject("jobs"), "not json".into())
        .await
        .unwrap()
        .await
        .unwrap();
    driver
        .push(Job::new("send-email", "{}").with_id("valid"))
        .await
        .unwrap();

    driver.run(&pipe).await.unwrap();

    let item = assert_some(queue.next_item(WAIT).await, "valid job should be delivered");
    assert_eq!(item.id(), "valid");
    assert!(queue.next_item(QUIET).await.is_none());
}

// ============================================================================
// Stop
// ============================================================================

#[tokio::test]
async fn test_stop_is_terminal() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("stop_terminal");
    let queue = CollectingQueue::new();
    let pipe = pipeline(&builder, "emails");
    let driver = driver_for(&nats, pipe.clone(), queue.clone()).await;

    driver.run(&pipe).await.unwrap();
    driver.push(Job::new("send-email", "{}")).await.unwrap();
    let item = assert_some(queue.next_item(WAIT).await, "job should be delivered");

    driver.stop().await.unwrap();
    driver.stop().await.unwrap();

    assert_eq!(driver.status(), ListenerStatus::Stopped);
    assert!(!driver.state().await.unwrap().ready);
    assert!(matches!(
        driver.push(Job::new("late", "{}")).await.unwrap_err(),
        NatsJobsError::Stopped
    ));
    assert!(matches!(
        driver.run(&pipe).await.unwrap_err(),
        NatsJobsError::Stopped
    ));
    assert!(item.ack().await.is_err());
}

#[tokio::test]
async fn test_stop_deletes_stream_when_configured() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("stop_delete_stream");
    let stream = builder.stream("jobs");
    let pipe = pipeline(&builder, "emails").with_option("delete_stream_on_stop", true);
    let driver = driver_for(&nats, pipe.clone(), CollectingQueue::new()).await;

    driver.push(Job::new("send-email", "{}")).await.unwrap();
    driver.run(&pipe).await.unwrap();
    driver.stop().await.unwrap();
    assert!(!nats.stream_exists(&stream).await);

    let driver = driver_for(&nats, pipe, CollectingQueue::new()).await;
    assert!(nats.stream_exists(&stream).await);
    assert_eq!(nats.stream_messages(&stream).await, 0);
    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_stop_can_be_retried() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("stop_retry");
    let stream = builder.stream("jobs");
    let pipe = pipeline(&builder, "emails").with_option("delete_stream_on_stop", true);
    let driver = driver_for(&nats, pipe, CollectingQueue::new()).await;

    let jetstream = nats.jetstream();
    jetstream.delete_stream(&stream).await.unwrap();

    assert!(driver.stop().await.is_err());
    assert_eq!(driver.status(), ListenerStatus::Stopped);
    assert!(matches!(
        driver.push(Job::new("late", "{}")).await.unwrap_err(),
        NatsJobsError::Stopped
    ));

    jetstream
        .create_stream(async_nats::jetstream::stream::Config {
            name: stream.clone(),
            subjects: vec![builder.subject("jobs")],
            ..Default::default()
        })
        .await
        .unwrap();

    driver.stop().await.unwrap();
    assert!(!nats.stream_exists(&stream).await);
    driver.stop().await.unwrap();
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test]
async fn test_driver_from_config_key() {
    let nats = TestNats::new().await;
    let builder = TestDataBuilder::from_test_name("from_config_key");
    let cfg = Arc::new(ConfigTree::new(json!({
        "nats": {"addr": nats.connection_string()},
        "jobs": {"pipelines": {"emails": {
            "stream": builder.stream("jobs"),
            "subject": builder.subject("jobs"),
            "durable": "mailer"
        }}}
    })));

    let plugin = NatsJobsPlugin::init(cfg).unwrap();
    let queue = CollectingQueue::new();
    let pipe = Pipeline::new("emails", "nats");
    let driver = match plugin
        .driver_from_config("jobs.pipelines.emails", queue.clone(), pipe.clone())
        .await
    {
        Ok(driver) => driver,
        Err(e) => panic!("failed to create driver: {e}"),
    };

    assert_eq!(driver.config().prefetch, CONFIG_DEFAULT_PREFETCH);
    assert_eq!(driver.config().durable.as_deref(), Some("mailer"));

    driver.push(Job::new("send-email", "{}")).await.unwrap();
    driver.run(&pipe).await.unwrap();
    assert_some(queue.next_item(WAIT).await, "job should be delivered");

    // durable consumers survive a pause
    driver.pause("emails").await.unwrap();
    assert_eq!(nats.stream_consumers(&builder.stream("jobs")).await, 1);
}

#[tokio::test]
async fn test_connect_failure() {
    let cfg = ConfigTree::new(json!({"nats": {"addr": "nats://127.0.0.1:1"}}));

    let pipe = Pipeline::new("emails", "nats");

    let err = match NatsDriver::from_pipeline(pipe, &cfg, CollectingQueue::new()).await {
        Ok(_) => panic!("connect should fail"),
        Err(e) => e,
    };

    assert_eq!(err.kind(), ErrorKind::Connection);
}
