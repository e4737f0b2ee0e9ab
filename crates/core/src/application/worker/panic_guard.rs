// Panic isolation around handler calls

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Result of a panic-guarded execution.
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// The future ran to completion.
    Completed(T),
    /// The future panicked; the payload, rendered to a string.
    Panicked(String),
}

/// Run a handler future with panic isolation.
///
/// A panic unwinds out of the future into the guard instead of tearing down
/// the worker task; the run slot held by the caller is released on every
/// exit path. The process panic hook still fires at unwind time, which is
/// where the stack trace lands in the logs.
pub async fn run_guarded<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => PanicGuardResult::Completed(value),
        Err(payload) => PanicGuardResult::Panicked(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_passes_through() {
        let result = run_guarded(async { 42 }).await;
        assert!(matches!(result, PanicGuardResult::Completed(42)));
    }

    #[tokio::test]
    async fn test_catches_str_panic() {
        let result = run_guarded(async { panic!("panic in Run") }).await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "panic in Run"),
            PanicGuardResult::Completed(()) => panic!("expected a caught panic"),
        }
    }

    #[tokio::test]
    async fn test_catches_string_panic() {
        let code = 7;
        let result = run_guarded(async move { panic!("failed with {code}") }).await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "failed with 7"),
            PanicGuardResult::Completed(()) => panic!("expected a caught panic"),
        }
    }

    #[tokio::test]
    async fn test_catches_panic_after_await() {
        let result = run_guarded(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            panic!("late panic")
        })
        .await;
        assert!(matches!(result, PanicGuardResult::Panicked(_)));
    }
}
