// End-to-end scenarios over the SQS-style polling source

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use conveyor_core::port::sqs_client::LocalSqsClient;
use conveyor_core::{Job, JobFailure, JobHandler, Manager};
use conveyor_integration_tests::{string_message, wait_until};

const SQS_CONFIG: &str = r#"[
    {
        "name": "queue-1",
        "queue_type": "sqs",
        "queue_concurrency": 3,
        "worker_concurrency": 100,
        "enabled": true,
        "sqs": {
            "queue_url": "http://localhost:4100/100010001000/integration-test",
            "use_local_sqs": true,
            "region": "us-east-1",
            "max_number_of_messages": 2,
            "wait_time_seconds": 2
        }
    }
]"#;

const QUEUE_URL: &str = "http://localhost:4100/100010001000/integration-test";
const JOB_TYPE: &str = "test-job-type-1";

struct Noop;

#[async_trait]
impl JobHandler for Noop {
    async fn run(&mut self, _job: &Job) -> anyhow::Result<()> {
        Ok(())
    }

    async fn done(&mut self, _job: &Job, _failure: Option<&JobFailure>) {}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sqs_100_jobs() {
    let total: u64 = 100;
    let client = Arc::new(LocalSqsClient::new());

    let mut manager = Manager::new().with_sqs_client(client.clone());
    manager.init_with_json_config(SQS_CONFIG).unwrap();
    manager
        .register_job_type("queue-1", JOB_TYPE, || Noop)
        .unwrap();
    let source = manager.get_queue_by_name("queue-1").unwrap();

    let manager = Arc::new(manager);
    let run_manager = Arc::clone(&manager);
    tokio::spawn(async move { run_manager.run().await.unwrap() });

    // concurrent producers, batched receives on the other side
    for i in 0..total {
        let source = Arc::clone(&source);
        tokio::spawn(async move {
            source.send(string_message(&i.to_string())).await.unwrap();
        });
    }

    let m = Arc::clone(&manager);
    assert!(wait_until(|| m.job_counter() == total, Duration::from_secs(30)).await);
    assert_eq!(manager.job_done_counter(), total);

    // every message was deleted from the source exactly once, after done
    let deletes_settled =
        wait_until(|| client.deleted_count() == total, Duration::from_secs(5)).await;
    assert!(deletes_settled, "expected {total} deletes");
    assert_eq!(client.sent_count(), total);
    assert_eq!(client.in_flight_len().await, 0);
    assert_eq!(client.queued_len(QUEUE_URL).await, 0);
}

// Done runs before the delete: a handler that observes its own message still
// in flight proves ack-after-done ordering.
struct InFlightProbe {
    client: Arc<LocalSqsClient>,
    tx: tokio::sync::mpsc::Sender<usize>,
}

#[async_trait]
impl JobHandler for InFlightProbe {
    async fn run(&mut self, _job: &Job) -> anyhow::Result<()> {
        Ok(())
    }

    async fn done(&mut self, _job: &Job, _failure: Option<&JobFailure>) {
        let _ = self.tx.send(self.client.in_flight_len().await).await;
    }
}

#[tokio::test]
async fn test_ack_happens_after_done() {
    let client = Arc::new(LocalSqsClient::new());
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);

    let mut manager = Manager::new().with_sqs_client(client.clone());
    manager.init_with_json_config(SQS_CONFIG).unwrap();
    let probe_client = Arc::clone(&client);
    manager
        .register_job_type("queue-1", JOB_TYPE, move || InFlightProbe {
            client: Arc::clone(&probe_client),
            tx: tx.clone(),
        })
        .unwrap();
    let source = manager.get_queue_by_name("queue-1").unwrap();

    let manager = Arc::new(manager);
    let run_manager = Arc::clone(&manager);
    tokio::spawn(async move { run_manager.run().await.unwrap() });

    source.send(string_message("foo")).await.unwrap();

    let in_flight_during_done = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for done")
        .expect("return channel closed");
    assert_eq!(in_flight_during_done, 1, "message must not be deleted before done");

    let m = Arc::clone(&manager);
    assert!(wait_until(|| m.job_done_counter() == 1, Duration::from_secs(5)).await);
    assert!(wait_until(|| client.deleted_count() == 1, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_shutdown_stops_sqs_polling() {
    let client = Arc::new(LocalSqsClient::new());

    let mut manager = Manager::new().with_sqs_client(client);
    manager.init_with_json_config(SQS_CONFIG).unwrap();
    manager
        .register_job_type("queue-1", JOB_TYPE, || Noop)
        .unwrap();

    let manager = Arc::new(manager);
    let run_manager = Arc::clone(&manager);
    let run_handle = tokio::spawn(async move { run_manager.run().await });

    // let the poll loop park in its long poll, then stop it
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("run did not return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}
