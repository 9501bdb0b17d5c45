//! Runloop (spec §4.9 / C9): restarts a worker procedure forever, with
//! tight-loop protection and a cooperative-exit passthrough.

use std::future::Future;
use std::time::{Duration, Instant};

use dirt_core::DirtError;
use tracing::{info, warn};

/// What a runloop worker iteration can report.
pub enum WorkerOutcome {
    /// The sentinel "done" value (spec: "if the sentinel 'done' value is
    /// returned, stop").
    Done,
    /// Anything else: sleep and restart.
    Continue,
}

/// A worker iteration's failure mode. `CooperativeExit` is re-raised to the
/// runloop's own caller rather than swallowed and restarted (spec §4.9 "On
/// exception (except the cooperative-exit signal, which is re-raised)").
pub enum WorkerError {
    CooperativeExit,
    Failed(DirtError),
}

impl From<DirtError> for WorkerError {
    fn from(err: DirtError) -> Self {
        Self::Failed(err)
    }
}

const TIGHT_LOOP_THRESHOLD: Duration = Duration::from_secs(5);
const TIGHT_LOOP_SLEEP: Duration = Duration::from_secs(15);
const NORMAL_SLEEP: Duration = Duration::from_secs(1);

/// Runs `worker` forever until it returns [`WorkerOutcome::Done`] or fails
/// with [`WorkerError::CooperativeExit`] (Testable Property 9).
pub async fn run_loop<F, Fut>(name: &str, mut worker: F) -> Result<(), DirtError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WorkerOutcome, WorkerError>>,
{
    loop {
        let started = Instant::now();
        match worker().await {
            Ok(WorkerOutcome::Done) => {
                info!(worker = name, "runloop worker returned done, stopping");
                return Ok(());
            }
            Ok(WorkerOutcome::Continue) => {}
            Err(WorkerError::CooperativeExit) => {
                info!(worker = name, "runloop worker raised cooperative exit, re-raising");
                return Err(DirtError::configuration("cooperative exit"));
            }
            Err(WorkerError::Failed(err)) => {
                warn!(worker = name, %err, "runloop worker failed, restarting");
            }
        }

        let elapsed = started.elapsed();
        let sleep = if elapsed < TIGHT_LOOP_THRESHOLD {
            TIGHT_LOOP_SLEEP
        } else {
            NORMAL_SLEEP
        };
        tokio::time::sleep(sleep).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stops_after_one_call_on_done() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        run_loop("test", move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(WorkerOutcome::Done)
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_after_a_tight_loop_failure_with_the_long_sleep() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handle = tokio::spawn(async move {
            run_loop("test", move || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(WorkerError::Failed(DirtError::transport("boom")))
                    } else {
                        Ok(WorkerOutcome::Done)
                    }
                }
            })
            .await
        });

        tokio::time::advance(TIGHT_LOOP_SLEEP).await;
        handle.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cooperative_exit_is_re_raised_not_restarted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let err = run_loop("test", move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkerError::CooperativeExit)
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DirtError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
