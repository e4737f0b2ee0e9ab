// Handler port - the per-job contract user code implements

use std::fmt;

use async_trait::async_trait;

use crate::domain::Job;
use crate::error::EngineError;

/// Why a job's run did not succeed. Passed to `done` so handlers can react
/// to their own failures.
#[derive(Debug)]
pub enum JobFailure {
    /// `run` returned an error; carried through verbatim.
    Failed(anyhow::Error),
    /// `run` panicked; always an `EngineError::HandlerPanic` carrying the
    /// recovered payload.
    Panicked(EngineError),
}

impl JobFailure {
    pub fn is_panic(&self) -> bool {
        matches!(self, JobFailure::Panicked(_))
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Failed(err) => write!(f, "{err}"),
            JobFailure::Panicked(err) => write!(f, "{err}"),
        }
    }
}

/// User-supplied per-job handler.
///
/// Exactly one instance is constructed per job (via the registered factory),
/// used by exactly one task, and discarded afterwards. Instance fields are
/// therefore private to the job; no synchronization is needed inside a
/// handler.
///
/// `done` is invoked exactly once per decoded job, after `run` returns or
/// panics. A panic in `done` is contained the same way as a panic in `run`
/// and does not re-invoke either method.
#[async_trait]
pub trait JobHandler: Send {
    /// The job body.
    async fn run(&mut self, job: &Job) -> anyhow::Result<()>;

    /// Post-run hook; `failure` is `None` on success.
    async fn done(&mut self, job: &Job, failure: Option<&JobFailure>);
}

/// Producer of fresh handler instances, stored by the registry.
///
/// Registration takes a closure, not an instance: sharing one handler across
/// concurrent jobs would let them overwrite each other's fields, so the type
/// system only admits constructors.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn JobHandler> + Send + Sync>;
