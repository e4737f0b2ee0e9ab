// Manager - owns queues, workers, and the shared done channel

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::application::metrics::JobCounters;
use crate::application::registry::HandlerRegistry;
use crate::application::worker::Worker;
use crate::domain::{EngineConfig, Job, QueueConfig, QueueType};
use crate::error::{EngineError, Result};
use crate::port::handler::JobHandler;
use crate::port::source::Source;
use crate::port::sqs_client::{LocalSqsClient, SqsClient};
use crate::source::{ChannelSource, SqsSource};

struct QueueRuntime {
    config: QueueConfig,
    source: Arc<dyn Source>,
}

/// The engine front door.
///
/// Init parses and validates configuration and instantiates one source per
/// enabled queue; `run` spawns one worker per queue plus the accounting loop
/// and blocks until `shutdown`. Registration and counter reads are safe from
/// any task at any time.
pub struct Manager {
    queues: HashMap<String, QueueRuntime>,
    registry: Arc<HandlerRegistry>,
    counters: Arc<JobCounters>,
    log_enabled: bool,
    sqs_client: Option<Arc<dyn SqsClient>>,
    shutdown_deadline: Option<Duration>,
    // watch pair flipped to true exactly once, on shutdown
    shutdown: Option<(watch::Sender<bool>, watch::Receiver<bool>)>,
    shutdown_fired: AtomicBool,
    done_channel: Mutex<Option<(mpsc::Sender<Job>, mpsc::Receiver<Job>)>>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            registry: Arc::new(HandlerRegistry::default()),
            counters: Arc::new(JobCounters::default()),
            log_enabled: true,
            sqs_client: None,
            shutdown_deadline: None,
            shutdown: None,
            shutdown_fired: AtomicBool::new(false),
            done_channel: Mutex::new(None),
        }
    }

    /// Inject the SQS transport used by SQS-backed queues. Without an
    /// injected client, `use_local_sqs = true` falls back to a fresh
    /// in-process emulation and `use_local_sqs = false` is a config error.
    pub fn with_sqs_client(mut self, client: Arc<dyn SqsClient>) -> Self {
        self.sqs_client = Some(client);
        self
    }

    /// Bound the shutdown drain: once elapsed, `run` returns and remaining
    /// handlers detach.
    pub fn set_shutdown_deadline(&mut self, deadline: Duration) {
        self.shutdown_deadline = Some(deadline);
    }

    /// Initialize from a JSON configuration document (object or bare array
    /// of queues).
    pub fn init_with_json_config(&mut self, text: &str) -> Result<()> {
        let config = EngineConfig::from_json(text)?;
        self.init_with_config(config)
    }

    /// Initialize from an already-built configuration.
    pub fn init_with_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        if self.done_channel.get_mut().is_none() && self.shutdown.is_some() {
            return Err(EngineError::InvalidState(
                "cannot reconfigure a running manager".to_string(),
            ));
        }

        let mut queues = HashMap::new();
        let mut total_worker_concurrency = 0;
        for queue_config in config.queues.iter().filter(|q| q.enabled) {
            let source = self.build_source(queue_config)?;
            total_worker_concurrency += queue_config.worker_concurrency;
            queues.insert(
                queue_config.name.clone(),
                QueueRuntime {
                    config: queue_config.clone(),
                    source,
                },
            );
        }

        // The done channel must absorb every in-flight handler without
        // stalling its publication.
        let (done_tx, done_rx) = mpsc::channel(total_worker_concurrency.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.queues = queues;
        self.log_enabled = config.log_enabled;
        self.shutdown = Some((shutdown_tx, shutdown_rx));
        self.shutdown_fired = AtomicBool::new(false);
        *self.done_channel.get_mut() = Some((done_tx, done_rx));
        Ok(())
    }

    fn build_source(&self, config: &QueueConfig) -> Result<Arc<dyn Source>> {
        match config.queue_type {
            QueueType::GoChannel => {
                let Some(go_channel) = config.go_channel.as_ref() else {
                    return Err(EngineError::Config(format!(
                        "queue '{}': go_channel block is required",
                        config.name
                    )));
                };
                Ok(Arc::new(ChannelSource::new(go_channel.size)))
            }
            QueueType::Sqs => {
                let Some(sqs) = config.sqs.as_ref() else {
                    return Err(EngineError::Config(format!(
                        "queue '{}': sqs block is required",
                        config.name
                    )));
                };
                let client: Arc<dyn SqsClient> = match (self.sqs_client.clone(), sqs.use_local_sqs)
                {
                    (Some(client), _) => client,
                    (None, true) => Arc::new(LocalSqsClient::new()),
                    (None, false) => {
                        return Err(EngineError::Config(format!(
                            "queue '{}': use_local_sqs is false and no SQS client was injected",
                            config.name
                        )))
                    }
                };
                Ok(Arc::new(SqsSource::new(client, sqs.clone())))
            }
        }
    }

    /// Register a handler constructor for `(queue_name, job_type)`.
    /// Replaces on duplicate; visible to subsequent dispatches even after
    /// `run` has started.
    pub fn register_job_type<F, H>(&self, queue_name: &str, job_type: &str, factory: F) -> Result<()>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: JobHandler + 'static,
    {
        if !self.queues.contains_key(queue_name) {
            return Err(EngineError::UnknownQueue(queue_name.to_string()));
        }
        self.registry.register(
            queue_name,
            job_type,
            Box::new(move || Box::new(factory()) as Box<dyn JobHandler>),
        );
        Ok(())
    }

    /// The source bound to a queue, for producers and tests.
    pub fn get_queue_by_name(&self, name: &str) -> Result<Arc<dyn Source>> {
        self.queues
            .get(name)
            .map(|runtime| Arc::clone(&runtime.source))
            .ok_or_else(|| EngineError::UnknownQueue(name.to_string()))
    }

    /// Send one raw message to a queue by name.
    pub async fn send(&self, queue_name: &str, body: Vec<u8>) -> Result<()> {
        let source = self.get_queue_by_name(queue_name)?;
        source.send(body).await?;
        Ok(())
    }

    /// Names of the enabled queues.
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    /// Registered job types per queue.
    pub fn job_types(&self) -> HashMap<String, Vec<String>> {
        self.registry.job_types()
    }

    /// Run the engine: one worker per queue plus the accounting loop.
    /// Blocks until `shutdown`, then drains (bounded by the deadline if one
    /// is set).
    pub async fn run(&self) -> Result<()> {
        let Some((_, shutdown_rx)) = self.shutdown.as_ref() else {
            return Err(EngineError::InvalidState(
                "manager is not initialized".to_string(),
            ));
        };
        let mut shutdown_rx = shutdown_rx.clone();
        let Some((done_tx, done_rx)) = self.done_channel.lock().await.take() else {
            return Err(EngineError::InvalidState(
                "manager is already running".to_string(),
            ));
        };

        let accounting = tokio::spawn(accounting_loop(
            done_rx,
            Arc::clone(&self.counters),
            self.log_enabled,
        ));

        let mut workers = JoinSet::new();
        for runtime in self.queues.values() {
            let worker = Worker::new(
                &runtime.config,
                Arc::clone(&runtime.source),
                Arc::clone(&self.registry),
                Arc::clone(&self.counters),
                done_tx.clone(),
            );
            let worker_shutdown = shutdown_rx.clone();
            workers.spawn(async move { worker.run(worker_shutdown).await });
        }
        drop(done_tx);
        info!(queues = self.queues.len(), "manager started");

        if !*shutdown_rx.borrow() {
            let _ = shutdown_rx.changed().await;
        }

        let drain = async move {
            while let Some(result) = workers.join_next().await {
                if let Err(err) = result {
                    error!(error = %err, "worker task failed");
                }
            }
            let _ = accounting.await;
        };
        match self.shutdown_deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, drain).await.is_err() {
                    warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "shutdown deadline exceeded, detaching in-flight handlers"
                    );
                }
            }
            None => drain.await,
        }
        info!("manager stopped");
        Ok(())
    }

    /// Close every source and signal the workers. Idempotent; in-flight
    /// handlers run to natural completion.
    pub async fn shutdown(&self) {
        if self.shutdown_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");
        for runtime in self.queues.values() {
            runtime.source.close().await;
        }
        if let Some((sender, _)) = self.shutdown.as_ref() {
            let _ = sender.send(true);
        }
    }

    pub fn job_counter(&self) -> u64 {
        self.counters.job_counter()
    }

    pub fn job_received_counter(&self) -> u64 {
        self.counters.received()
    }

    pub fn job_done_counter(&self) -> u64 {
        self.counters.done()
    }

    pub fn job_failed_counter(&self) -> u64 {
        self.counters.failed()
    }

    pub fn job_panicked_counter(&self) -> u64 {
        self.counters.panicked()
    }

    pub fn job_invalid_counter(&self) -> u64 {
        self.counters.invalid()
    }

    pub fn job_unknown_type_counter(&self) -> u64 {
        self.counters.unknown_type()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

// Single reader of the done channel; the counter moves here so job_counter
// observes the job only after ack and publication.
async fn accounting_loop(
    mut done_rx: mpsc::Receiver<Job>,
    counters: Arc<JobCounters>,
    log_enabled: bool,
) {
    while let Some(job) = done_rx.recv().await {
        counters.incr_done();
        if log_enabled {
            info!(
                queue = %job.queue_name,
                job_id = %job.desc.job_id,
                job_type = %job.desc.job_type,
                duration_ms = job.duration.map(|d| d.as_millis() as u64).unwrap_or(0),
                "job done"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Job;
    use crate::port::handler::{JobFailure, JobHandler};
    use async_trait::async_trait;

    const GO_CHANNEL_CONFIG: &str = r#"[
        {
            "name": "queue-1",
            "queue_type": "go_channel",
            "queue_concurrency": 3,
            "worker_concurrency": 100,
            "enabled": true,
            "go_channel": { "size": 0 }
        }
    ]"#;

    struct Noop;

    #[async_trait]
    impl JobHandler for Noop {
        async fn run(&mut self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }
        async fn done(&mut self, _job: &Job, _failure: Option<&JobFailure>) {}
    }

    #[tokio::test]
    async fn test_init_and_lookup() {
        let mut manager = Manager::new();
        manager.init_with_json_config(GO_CHANNEL_CONFIG).unwrap();

        assert!(manager.get_queue_by_name("queue-1").is_ok());
        assert!(matches!(
            manager.get_queue_by_name("missing"),
            Err(EngineError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn test_init_rejects_bad_json() {
        let mut manager = Manager::new();
        assert!(matches!(
            manager.init_with_json_config("not json"),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_register_unknown_queue_fails() {
        let mut manager = Manager::new();
        manager.init_with_json_config(GO_CHANNEL_CONFIG).unwrap();

        let result = manager.register_job_type("missing", "t", || Noop);
        assert!(matches!(result, Err(EngineError::UnknownQueue(_))));
    }

    #[tokio::test]
    async fn test_disabled_queue_has_no_source() {
        let config = r#"[
            {
                "name": "queue-off",
                "queue_type": "go_channel",
                "queue_concurrency": 1,
                "worker_concurrency": 1,
                "enabled": false,
                "go_channel": { "size": 0 }
            }
        ]"#;
        let mut manager = Manager::new();
        manager.init_with_json_config(config).unwrap();
        assert!(manager.get_queue_by_name("queue-off").is_err());
    }

    #[tokio::test]
    async fn test_remote_sqs_without_client_is_config_error() {
        let config = r#"[
            {
                "name": "queue-1",
                "queue_type": "sqs",
                "queue_concurrency": 1,
                "worker_concurrency": 1,
                "enabled": true,
                "sqs": {
                    "queue_url": "https://sqs.us-east-1.amazonaws.com/1/q",
                    "region": "us-east-1",
                    "use_local_sqs": false
                }
            }
        ]"#;
        let mut manager = Manager::new();
        let result = manager.init_with_json_config(config);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_before_init_fails() {
        let manager = Manager::new();
        assert!(matches!(
            manager.run().await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_job_types_reports_registrations() {
        let mut manager = Manager::new();
        manager.init_with_json_config(GO_CHANNEL_CONFIG).unwrap();
        manager
            .register_job_type("queue-1", "type-a", || Noop)
            .unwrap();
        manager
            .register_job_type("queue-1", "type-b", || Noop)
            .unwrap();

        let mut types = manager.job_types().remove("queue-1").unwrap();
        types.sort();
        assert_eq!(types, vec!["type-a".to_string(), "type-b".to_string()]);
    }
}
