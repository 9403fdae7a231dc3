//! Fire-and-forget Task
//!
//! Runs a unit of work on its own tokio task. The caller gets control back
//! immediately and is never told how the job ended; failures are logged here.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Spawns `job` detached from the caller.
///
/// Dropping the caller's future does not cancel the job. The returned handle
/// is only useful to tests and shutdown code; callers normally ignore it.
///
/// # Arguments
/// * `description` - What the job does, used in log lines
/// * `job` - The work to run
pub fn fire_and_forget<F>(description: impl Into<String>, job: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let description = description.into();
    tokio::spawn(async move {
        match job.await {
            Ok(()) => debug!("Background job finished: {}", description),
            Err(e) => warn!("Background job failed: {}: {}", description, e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let handle = fire_and_forget("set flag", async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        handle.await.unwrap();

        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let handle = fire_and_forget("always fails", async {
            Err(CacheError::Store("unreachable".to_string()))
        });

        // The task itself completes normally
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_job_survives_dropped_caller() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let caller = async move {
            fire_and_forget("outlive caller", async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        let handle = caller.await;
        handle.await.unwrap();

        assert!(ran.load(Ordering::SeqCst));
    }
}
