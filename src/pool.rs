//! Bounded-concurrency worker pool with retry and fail-fast batch semantics
//!
//! A batch is the set of tasks belonging to one phase. Tasks run
//! concurrently up to a configurable limit, each retried individually with
//! exponential backoff; once any task exhausts its retry budget the whole
//! batch fails and sibling results are discarded. Results are returned in
//! submission order regardless of completion order.

use crate::config::PoolConfig;
use crate::error::{MapReduceError, MapReduceResult};
use crate::event::{EventLog, JobEvent};
use crate::job::{JobId, JobStatus, MapTask, ReduceTask};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{info, warn};

/// A unit of work the pool can dispatch.
///
/// Tasks are cloned for each retry attempt; they carry no references into
/// shared job state, so attempts never race.
pub trait BatchTask: Clone + Send + 'static {
    /// Stable identifier used in events and `Worker` errors.
    fn task_id(&self) -> String;
}

impl BatchTask for MapTask {
    fn task_id(&self) -> String {
        format!("map-{}", self.mapper_id)
    }
}

impl BatchTask for ReduceTask {
    fn task_id(&self) -> String {
        format!("reduce-{}", self.word)
    }
}

/// Executes batches of map or reduce tasks
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Dispatch a batch and await every task under a strict barrier.
    ///
    /// The executor may suspend (simulated latency or real I/O); callers
    /// must not assume synchronous completion. Flipping the `cancel` flag
    /// aborts in-flight tasks and fails the batch with `Cancelled`.
    pub async fn run_batch<T, R, F>(
        &self,
        job_id: JobId,
        phase: JobStatus,
        tasks: Vec<T>,
        executor: F,
        cancel: watch::Receiver<bool>,
        events: Arc<EventLog>,
    ) -> MapReduceResult<Vec<R>>
    where
        T: BatchTask,
        R: Send + 'static,
        F: Fn(T) -> BoxFuture<'static, MapReduceResult<R>> + Send + Sync + 'static,
    {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let permits = match self.config.max_parallel {
            Some(0) => {
                return Err(MapReduceError::InvalidConfig {
                    reason: "max_parallel must be at least 1".to_string(),
                })
            }
            Some(limit) => limit.min(total),
            None => total,
        };

        info!(
            %job_id,
            %phase,
            tasks = total,
            max_parallel = permits,
            "dispatching batch"
        );

        let semaphore = Arc::new(Semaphore::new(permits));
        let executor = Arc::new(executor);
        let mut in_flight = FuturesUnordered::new();
        let mut aborts = Vec::with_capacity(total);

        for (index, task) in tasks.into_iter().enumerate() {
            let handle = tokio::spawn(run_task(
                job_id,
                phase,
                index,
                task,
                semaphore.clone(),
                executor.clone(),
                self.config.clone(),
                cancel.clone(),
                events.clone(),
            ));
            aborts.push(handle.abort_handle());
            in_flight.push(handle);
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
        while let Some(joined) = in_flight.next().await {
            match joined {
                Ok((index, Ok(result))) => slots[index] = Some(result),
                Ok((_, Err(err))) => {
                    // Fail fast: siblings are aborted and their partial
                    // results discarded for this phase.
                    for abort in &aborts {
                        abort.abort();
                    }
                    return Err(err);
                }
                Err(join_err) => {
                    for abort in &aborts {
                        abort.abort();
                    }
                    return Err(MapReduceError::InvariantViolation {
                        reason: format!("worker task terminated abnormally: {join_err}"),
                    });
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| MapReduceError::InvariantViolation {
                    reason: format!("no result collected for task index {index}"),
                })
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_task<T, R, F>(
    job_id: JobId,
    phase: JobStatus,
    index: usize,
    task: T,
    semaphore: Arc<Semaphore>,
    executor: Arc<F>,
    config: PoolConfig,
    mut cancel: watch::Receiver<bool>,
    events: Arc<EventLog>,
) -> (usize, MapReduceResult<R>)
where
    T: BatchTask,
    R: Send + 'static,
    F: Fn(T) -> BoxFuture<'static, MapReduceResult<R>> + Send + Sync,
{
    let task_id = task.task_id();
    let cancelled = || MapReduceError::Cancelled { job_id };

    // A closed semaphore only happens when the batch is being torn down.
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return (index, Err(cancelled())),
    };

    let mut attempt: u32 = 0;
    loop {
        if *cancel.borrow() {
            return (index, Err(cancelled()));
        }

        events.record(JobEvent::TaskStarted {
            job_id,
            phase,
            task_id: task_id.clone(),
            attempt,
        });

        let work = executor(task.clone());
        let outcome = tokio::select! {
            result = work => result,
            _ = cancel.changed() => return (index, Err(cancelled())),
        };

        match outcome {
            Ok(result) => {
                events.record(JobEvent::TaskCompleted {
                    job_id,
                    phase,
                    task_id,
                });
                return (index, Ok(result));
            }
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let backoff = backoff_delay(config.retry_backoff_ms, attempt);
                warn!(
                    %job_id,
                    task_id = %task_id,
                    attempt,
                    "task failed, retrying after {backoff:?}: {err}"
                );
                events.record(JobEvent::TaskRetrying {
                    job_id,
                    phase,
                    task_id: task_id.clone(),
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                });
                tokio::select! {
                    _ = sleep(backoff) => {}
                    _ = cancel.changed() => return (index, Err(cancelled())),
                }
            }
            Err(err) => {
                events.record(JobEvent::TaskFailed {
                    job_id,
                    phase,
                    task_id,
                    error: err.to_string(),
                });
                return (index, Err(err));
            }
        }
    }
}

/// Exponential backoff: base × 2^(attempt-1), capped at 2^6 × base.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponent = (attempt.saturating_sub(1)).min(6);
    Duration::from_millis(base_ms.saturating_mul(1 << exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct TestTask {
        id: usize,
    }

    impl BatchTask for TestTask {
        fn task_id(&self) -> String {
            format!("test-{}", self.id)
        }
    }

    fn pool(max_parallel: Option<usize>) -> WorkerPool {
        WorkerPool::new(PoolConfig {
            max_parallel,
            max_retries: 2,
            retry_backoff_ms: 1,
            task_latency_ms: None,
        })
    }

    fn batch(n: usize) -> Vec<TestTask> {
        (0..n).map(|id| TestTask { id }).collect()
    }

    fn fixture() -> (JobId, watch::Sender<bool>, watch::Receiver<bool>, Arc<EventLog>) {
        let (tx, rx) = watch::channel(false);
        (JobId::new(), tx, rx, Arc::new(EventLog::new()))
    }

    #[tokio::test]
    async fn results_come_back_in_submission_order() {
        let (job_id, _tx, rx, events) = fixture();
        // Later tasks finish first; collection order must not leak through.
        let results = pool(None)
            .run_batch(
                job_id,
                JobStatus::Mapping,
                batch(4),
                |task: TestTask| {
                    async move {
                        sleep(Duration::from_millis(40 - 10 * task.id as u64)).await;
                        Ok(task.id)
                    }
                    .boxed()
                },
                rx,
                events,
            )
            .await
            .unwrap();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn concurrency_stays_within_limit() {
        let (job_id, _tx, rx, events) = fixture();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current_ref, peak_ref) = (current.clone(), peak.clone());

        pool(Some(2))
            .run_batch(
                job_id,
                JobStatus::Mapping,
                batch(8),
                move |task: TestTask| {
                    let current = current_ref.clone();
                    let peak = peak_ref.clone();
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(task.id)
                    }
                    .boxed()
                },
                rx,
                events,
            )
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn transient_failure_succeeds_within_retry_budget() {
        let (job_id, _tx, rx, events) = fixture();
        let failures = Arc::new(AtomicU32::new(0));
        let failures_ref = failures.clone();

        let results = pool(None)
            .run_batch(
                job_id,
                JobStatus::Mapping,
                batch(3),
                move |task: TestTask| {
                    let failures = failures_ref.clone();
                    async move {
                        // Task 1 fails exactly once, then succeeds.
                        if task.id == 1 && failures.fetch_add(1, Ordering::SeqCst) == 0 {
                            return Err(MapReduceError::Worker {
                                task_id: task.task_id(),
                                cause: "transient".to_string(),
                            });
                        }
                        Ok(task.id)
                    }
                    .boxed()
                },
                rx,
                events.clone(),
            )
            .await
            .unwrap();

        assert_eq!(results, vec![0, 1, 2]);
        let retried = events
            .snapshot()
            .iter()
            .filter(|entry| entry.message.contains("retrying"))
            .count();
        assert_eq!(retried, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_batch() {
        let (job_id, _tx, rx, events) = fixture();
        let err = pool(None)
            .run_batch(
                job_id,
                JobStatus::Mapping,
                batch(3),
                |task: TestTask| {
                    async move {
                        if task.id == 2 {
                            return Err(MapReduceError::Worker {
                                task_id: task.task_id(),
                                cause: "permanent".to_string(),
                            });
                        }
                        Ok(task.id)
                    }
                    .boxed()
                },
                rx,
                events.clone(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MapReduceError::Worker { ref task_id, .. } if task_id == "test-2"));
        // max_retries = 2 means three attempts in total.
        let attempts = events
            .snapshot()
            .iter()
            .filter(|entry| entry.message.contains("task test-2 started"))
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_batch() {
        let (job_id, tx, rx, events) = fixture();
        let pool = pool(None);

        let handle = tokio::spawn(async move {
            pool.run_batch(
                job_id,
                JobStatus::Mapping,
                batch(4),
                |task: TestTask| {
                    async move {
                        sleep(Duration::from_secs(30)).await;
                        Ok(task.id)
                    }
                    .boxed()
                },
                rx,
                events,
            )
            .await
        });

        sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MapReduceError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let (job_id, _tx, rx, events) = fixture();
        let results: Vec<usize> = pool(None)
            .run_batch(
                job_id,
                JobStatus::Mapping,
                Vec::<TestTask>::new(),
                |task: TestTask| async move { Ok(task.id) }.boxed(),
                rx,
                events,
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn zero_parallelism_is_rejected() {
        let (job_id, _tx, rx, events) = fixture();
        let err = pool(Some(0))
            .run_batch(
                job_id,
                JobStatus::Mapping,
                batch(1),
                |task: TestTask| async move { Ok(task.id) }.boxed(),
                rx,
                events,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MapReduceError::InvalidConfig { .. }));
    }

    #[test]
    fn backoff_doubles_per_attempt_and_caps() {
        assert_eq!(backoff_delay(50, 1), Duration::from_millis(50));
        assert_eq!(backoff_delay(50, 2), Duration::from_millis(100));
        assert_eq!(backoff_delay(50, 3), Duration::from_millis(200));
        assert_eq!(backoff_delay(50, 40), Duration::from_millis(3200));
    }
}
