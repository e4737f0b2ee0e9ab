// Worker - per-queue dispatch loop

mod panic_guard;

pub use panic_guard::{run_guarded, PanicGuardResult};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

use crate::application::metrics::JobCounters;
use crate::application::registry::HandlerRegistry;
use crate::domain::{Job, JobDesc, QueueConfig};
use crate::error::EngineError;
use crate::port::handler::{HandlerFactory, JobFailure};
use crate::port::source::{AckToken, Delivery, Source, SourceError};

// Shared by the poll loop and every task it spawns; everything here is a
// cheap clone.
#[derive(Clone)]
struct DispatchContext {
    queue_name: Arc<str>,
    source: Arc<dyn Source>,
    registry: Arc<HandlerRegistry>,
    counters: Arc<JobCounters>,
    done_tx: mpsc::Sender<Job>,
}

impl DispatchContext {
    async fn ack_rejected(&self, token: &AckToken) {
        // Poison-pill avoidance: rejected messages are removed from the
        // source so they are not redelivered forever.
        if let Err(err) = self.source.ack(token).await {
            warn!(queue = %self.queue_name, error = %err, "failed to ack rejected message");
        }
    }
}

/// Per-queue execution engine.
///
/// Owns the two bounding stages: the receive stage (capacity
/// `queue_concurrency`) bounds in-flight message batches between source and
/// decode, and the run stage (capacity `worker_concurrency`) bounds
/// concurrently executing handlers. A single poll task calls
/// `Source::receive`, so handoff to the run stage follows receive order;
/// completion order is unconstrained.
pub struct Worker {
    ctx: DispatchContext,
    queue_concurrency: usize,
    worker_concurrency: usize,
}

impl Worker {
    pub fn new(
        config: &QueueConfig,
        source: Arc<dyn Source>,
        registry: Arc<HandlerRegistry>,
        counters: Arc<JobCounters>,
        done_tx: mpsc::Sender<Job>,
    ) -> Self {
        Self {
            ctx: DispatchContext {
                queue_name: Arc::from(config.name.as_str()),
                source,
                registry,
                counters,
                done_tx,
            },
            queue_concurrency: config.queue_concurrency,
            worker_concurrency: config.worker_concurrency,
        }
    }

    /// Run the dispatch loop until the source closes or the manager flips
    /// the shutdown flag, then drain in-flight work.
    ///
    /// Per-job errors never terminate the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let receive_slots = Arc::new(Semaphore::new(self.queue_concurrency));
        let run_slots = Arc::new(Semaphore::new(self.worker_concurrency));
        info!(queue = %self.ctx.queue_name, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let Ok(receive_permit) = Arc::clone(&receive_slots).acquire_owned().await else {
                break;
            };
            let batch = tokio::select! {
                result = self.ctx.source.receive() => result,
                _ = shutdown.changed() => break,
            };
            let deliveries = match batch {
                Ok(deliveries) => deliveries,
                Err(SourceError::Closed) => break,
                Err(err) => {
                    warn!(queue = %self.ctx.queue_name, error = %err, "receive failed");
                    continue;
                }
            };
            if deliveries.is_empty() {
                continue;
            }
            let ctx = self.ctx.clone();
            let run_slots = Arc::clone(&run_slots);
            tokio::spawn(dispatch_batch(ctx, deliveries, receive_permit, run_slots));
        }

        // Drain: re-acquiring every receive permit waits for dispatched
        // batches, re-acquiring every run permit waits for in-flight
        // handlers. Run permits are released only after the done-channel
        // publication, so counters have settled once this returns.
        let _ = receive_slots
            .acquire_many(self.queue_concurrency as u32)
            .await;
        let _ = run_slots.acquire_many(self.worker_concurrency as u32).await;
        info!(queue = %self.ctx.queue_name, "worker stopped");
    }
}

// Decode and hand off one received batch. The receive permit is held until
// the last message has a run slot or was rejected, keeping
// queue_concurrency a faithful bound on in-flight batches.
async fn dispatch_batch(
    ctx: DispatchContext,
    deliveries: Vec<Delivery>,
    receive_permit: OwnedSemaphorePermit,
    run_slots: Arc<Semaphore>,
) {
    for Delivery { body, token } in deliveries {
        ctx.counters.incr_received();
        let desc = match JobDesc::decode(&body) {
            Ok(desc) => desc,
            Err(err) => {
                warn!(
                    queue = %ctx.queue_name,
                    error = %err,
                    body = %String::from_utf8_lossy(&body),
                    "dropping invalid message"
                );
                ctx.ack_rejected(&token).await;
                ctx.counters.incr_invalid();
                continue;
            }
        };
        let Some(factory) = ctx.registry.lookup(&ctx.queue_name, &desc.job_type) else {
            let err = EngineError::UnknownJobType {
                queue: ctx.queue_name.to_string(),
                job_type: desc.job_type.clone(),
            };
            warn!(
                queue = %ctx.queue_name,
                job_id = %desc.job_id,
                error = %err,
                "dropping message with no registered handler"
            );
            ctx.ack_rejected(&token).await;
            ctx.counters.incr_unknown_type();
            continue;
        };
        let job = Job::new(desc, ctx.queue_name.to_string(), body, token);
        let Ok(run_permit) = Arc::clone(&run_slots).acquire_owned().await else {
            break;
        };
        tokio::spawn(run_job(ctx.clone(), job, factory, run_permit));
    }
    drop(receive_permit);
}

// One job, one fresh handler instance, one task. Holds its run permit until
// after the done-channel publication.
async fn run_job(
    ctx: DispatchContext,
    mut job: Job,
    factory: Arc<HandlerFactory>,
    _run_permit: OwnedSemaphorePermit,
) {
    let mut handler = (*factory)();
    job.started_at = Some(std::time::Instant::now());

    let failure = match run_guarded(handler.run(&job)).await {
        PanicGuardResult::Completed(Ok(())) => None,
        PanicGuardResult::Completed(Err(err)) => {
            ctx.counters.incr_failed();
            warn!(
                queue = %ctx.queue_name,
                job_id = %job.desc.job_id,
                job_type = %job.desc.job_type,
                error = %err,
                "handler returned error"
            );
            Some(JobFailure::Failed(err))
        }
        PanicGuardResult::Panicked(payload) => {
            ctx.counters.incr_panicked();
            let err = EngineError::HandlerPanic(payload);
            error!(
                queue = %ctx.queue_name,
                job_id = %job.desc.job_id,
                job_type = %job.desc.job_type,
                error = %err,
                "handler panicked in run"
            );
            Some(JobFailure::Panicked(err))
        }
    };

    // done runs exactly once, panic or not; a panic here does not re-invoke
    // anything.
    if let PanicGuardResult::Panicked(payload) =
        run_guarded(handler.done(&job, failure.as_ref())).await
    {
        ctx.counters.incr_panicked();
        let err = EngineError::HandlerPanic(payload);
        error!(
            queue = %ctx.queue_name,
            job_id = %job.desc.job_id,
            job_type = %job.desc.job_type,
            error = %err,
            "handler panicked in done"
        );
    }

    let finished = std::time::Instant::now();
    job.finished_at = Some(finished);
    job.duration = job.started_at.map(|started| finished.duration_since(started));

    // Ack strictly after done: at-least-once on sources that redeliver.
    if let Err(err) = ctx.source.ack(&job.token).await {
        warn!(
            queue = %ctx.queue_name,
            job_id = %job.desc.job_id,
            error = %err,
            "failed to ack job"
        );
    }
    // Receiver gone means the manager is past its drain deadline.
    let _ = ctx.done_tx.send(job).await;
}
