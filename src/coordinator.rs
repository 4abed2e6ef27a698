//! Job coordinator: owns the job lifecycle from submission to terminal state
//!
//! The coordinator validates input, registers the job record, and drives the
//! phases on a spawned task: map (parallel, through the worker pool), shuffle
//! (synchronous), reduce (parallel), then final merge. It is the only owner
//! of job mutation; task results are handed back by value, so no task ever
//! holds a reference into a job's mutable state.

use crate::config::CoordinatorConfig;
use crate::error::{MapReduceError, MapReduceResult};
use crate::event::{EventLog, JobEvent, LogEntry};
use crate::job::{
    FinalCounts, Job, JobId, JobStatus, JobStatusReport, JobSummary, MapResult, MapTask,
    PhaseMetrics, ReduceResult, ReduceTask,
};
use crate::partition;
use crate::pool::WorkerPool;
use crate::shuffle;
use crate::wordcount;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

/// Orchestrates word-count MapReduce jobs
pub struct Coordinator {
    config: CoordinatorConfig,
    pool: Arc<WorkerPool>,
    jobs: RwLock<HashMap<JobId, Arc<JobHandle>>>,
}

/// Registry entry for one job: record, log, and cancellation signal
struct JobHandle {
    job: Mutex<Job>,
    events: Arc<EventLog>,
    cancel: watch::Sender<bool>,
}

impl JobHandle {
    fn with_job<T>(&self, f: impl FnOnce(&mut Job) -> T) -> T {
        let mut job = self.job.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut job)
    }
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let pool = Arc::new(WorkerPool::new(config.pool.clone()));
        Self {
            config,
            pool,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Validate the input, register a job, and start driving it.
    ///
    /// Validation errors (`EmptyInput`, `InvalidConfig`) surface here and no
    /// job is created. On success the job id returns immediately while the
    /// phases run on a spawned task; observe progress via
    /// [`get_status`](Self::get_status) or [`stream_log`](Self::stream_log).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_job(&self, text: &str, mapper_count: usize) -> MapReduceResult<JobId> {
        let chunks = partition::split(text, mapper_count, self.config.max_mappers)?;

        let job_id = JobId::new();
        let job = Job::new(job_id, text, mapper_count, chunks);
        let (cancel, _) = watch::channel(false);
        let handle = Arc::new(JobHandle {
            job: Mutex::new(job),
            events: Arc::new(EventLog::new()),
            cancel,
        });

        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, handle.clone());

        let (mapper_count, chunk_count) =
            handle.with_job(|job| (job.mapper_count, job.chunks.len()));
        handle.events.record(JobEvent::JobStarted {
            job_id,
            mapper_count,
            chunk_count,
        });
        info!(%job_id, chunks = chunk_count, "job submitted");

        let pool = self.pool.clone();
        let latency = self
            .config
            .pool
            .task_latency_ms
            .map(Duration::from_millis);
        tokio::spawn(drive(handle, pool, latency));

        Ok(job_id)
    }

    /// Non-blocking snapshot of whatever state the job has produced so far.
    pub fn get_status(&self, job_id: JobId) -> MapReduceResult<JobStatusReport> {
        let handle = self.handle(job_id)?;
        Ok(handle.with_job(|job| job.report()))
    }

    /// Request cancellation. No-op if the job is already terminal.
    ///
    /// In-flight tasks of the current phase are aborted and the job moves to
    /// `Failed`; no partial results from the aborted batch are published.
    pub fn cancel_job(&self, job_id: JobId) -> MapReduceResult<()> {
        let handle = self.handle(job_id)?;
        if handle.with_job(|job| job.status.is_terminal()) {
            return Ok(());
        }
        let _ = handle.cancel.send(true);
        Ok(())
    }

    /// Stream the job's log from the beginning: full history, then live
    /// entries. Finite once the job is terminal; restartable per call.
    pub fn stream_log(
        &self,
        job_id: JobId,
    ) -> MapReduceResult<Pin<Box<dyn Stream<Item = LogEntry> + Send>>> {
        let handle = self.handle(job_id)?;
        Ok(handle.events.stream())
    }

    /// Point-in-time copy of the job's log entries.
    pub fn log_snapshot(&self, job_id: JobId) -> MapReduceResult<Vec<LogEntry>> {
        let handle = self.handle(job_id)?;
        Ok(handle.events.snapshot())
    }

    /// Summaries for every registered job.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.values()
            .map(|handle| handle.with_job(|job| job.summary()))
            .collect()
    }

    /// Wait until the job reaches a terminal state and return its final
    /// report. Callers inspect the report's status to distinguish Done from
    /// Failed.
    pub async fn wait(&self, job_id: JobId) -> MapReduceResult<JobStatusReport> {
        let mut log = self.stream_log(job_id)?;
        while log.next().await.is_some() {}
        self.get_status(job_id)
    }

    fn handle(&self, job_id: JobId) -> MapReduceResult<Arc<JobHandle>> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(&job_id)
            .cloned()
            .ok_or(MapReduceError::JobNotFound { job_id })
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

/// Drive a job through its phases, recording the terminal outcome.
async fn drive(handle: Arc<JobHandle>, pool: Arc<WorkerPool>, latency: Option<Duration>) {
    let job_id = handle.with_job(|job| job.id);
    if let Err(err) = run_phases(&handle, &pool, latency).await {
        match err {
            MapReduceError::Cancelled { .. } => {
                handle.with_job(|job| job.fail("cancelled"));
                handle.events.record(JobEvent::JobCancelled { job_id });
                info!(%job_id, "job cancelled");
            }
            other => {
                let message = full_message(&other);
                handle.with_job(|job| job.fail(&message));
                handle.events.record(JobEvent::JobFailed {
                    job_id,
                    error: message.clone(),
                });
                error!(%job_id, "job failed: {message}");
            }
        }
    }
}

async fn run_phases(
    handle: &Arc<JobHandle>,
    pool: &WorkerPool,
    latency: Option<Duration>,
) -> MapReduceResult<()> {
    let (job_id, chunks) = handle.with_job(|job| (job.id, job.chunks.clone()));
    let events = handle.events.clone();
    let cancel = handle.cancel.subscribe();

    // Map phase: one task per chunk, strict barrier before shuffle.
    ensure_active(handle, job_id)?;
    begin_phase(handle, JobStatus::Mapping)?;
    let started = Instant::now();
    let map_tasks: Vec<MapTask> = chunks
        .into_iter()
        .map(|chunk| MapTask {
            mapper_id: chunk.index,
            chunk,
        })
        .collect();
    let map_results = pool
        .run_batch(
            job_id,
            JobStatus::Mapping,
            map_tasks,
            map_executor(latency),
            cancel.clone(),
            events.clone(),
        )
        .await
        .map_err(|err| phase_failure(job_id, JobStatus::Mapping, err))?;
    finish_phase(handle, JobStatus::Mapping, started, map_results.len());
    handle.with_job(|job| job.map_results = Some(map_results.clone()));

    // Shuffle: synchronous regrouping, the only merge point of mapper output.
    ensure_active(handle, job_id)?;
    begin_phase(handle, JobStatus::Shuffling)?;
    let started = Instant::now();
    let groups = shuffle::group(&map_results)?;
    finish_phase(handle, JobStatus::Shuffling, started, groups.len());
    handle.with_job(|job| job.groups = Some(groups.clone()));

    // Reduce phase: one task per distinct word, dispatched in sorted order
    // so results are deterministic.
    ensure_active(handle, job_id)?;
    begin_phase(handle, JobStatus::Reducing)?;
    let started = Instant::now();
    let mut words: Vec<String> = groups.keys().cloned().collect();
    words.sort();
    let reduce_tasks: Vec<ReduceTask> = words
        .into_iter()
        .map(|word| {
            let entries = groups.get(&word).cloned().unwrap_or_default();
            ReduceTask { word, entries }
        })
        .collect();
    let reduce_results = pool
        .run_batch(
            job_id,
            JobStatus::Reducing,
            reduce_tasks,
            reduce_executor(latency),
            cancel,
            events.clone(),
        )
        .await
        .map_err(|err| phase_failure(job_id, JobStatus::Reducing, err))?;
    finish_phase(handle, JobStatus::Reducing, started, reduce_results.len());

    let final_counts = merge_final_counts(&reduce_results)?;
    let distinct_words = final_counts.len();
    let total_words: u64 = final_counts.values().sum();

    handle.with_job(|job| {
        job.reduce_results = Some(reduce_results);
        job.final_counts = Some(final_counts);
        job.transition(JobStatus::Done)
    })?;
    events.record(JobEvent::JobCompleted {
        job_id,
        distinct_words,
        total_words,
    });
    Ok(())
}

/// Map executor: simulated remote-call latency, then pure per-chunk counting.
fn map_executor(
    latency: Option<Duration>,
) -> impl Fn(MapTask) -> BoxFuture<'static, MapReduceResult<MapResult>> + Send + Sync + 'static {
    move |task: MapTask| {
        async move {
            if let Some(delay) = latency {
                sleep(delay).await;
            }
            Ok(MapResult {
                mapper_id: task.mapper_id,
                counts: wordcount::map_chunk(&task.chunk),
            })
        }
        .boxed()
    }
}

/// Reduce executor: simulated latency, then pure per-word aggregation.
fn reduce_executor(
    latency: Option<Duration>,
) -> impl Fn(ReduceTask) -> BoxFuture<'static, MapReduceResult<ReduceResult>> + Send + Sync + 'static
{
    move |task: ReduceTask| {
        async move {
            if let Some(delay) = latency {
                sleep(delay).await;
            }
            Ok(wordcount::reduce_word(&task))
        }
        .boxed()
    }
}

/// Bail out between phases once cancellation has been requested.
fn ensure_active(handle: &JobHandle, job_id: JobId) -> MapReduceResult<()> {
    if *handle.cancel.borrow() {
        return Err(MapReduceError::Cancelled { job_id });
    }
    Ok(())
}

fn begin_phase(handle: &JobHandle, phase: JobStatus) -> MapReduceResult<()> {
    let job_id = handle.with_job(|job| {
        job.transition(phase)?;
        Ok::<JobId, MapReduceError>(job.id)
    })?;
    handle.events.record(JobEvent::PhaseStarted { job_id, phase });
    Ok(())
}

fn finish_phase(handle: &JobHandle, phase: JobStatus, started: Instant, items: usize) {
    let duration_ms = started.elapsed().as_millis() as u64;
    let job_id = handle.with_job(|job| {
        job.metrics.push(PhaseMetrics {
            phase,
            duration_ms,
            items_processed: items,
        });
        job.id
    });
    handle.events.record(JobEvent::PhaseCompleted {
        job_id,
        phase,
        duration_ms,
        items,
    });
}

/// Wrap a batch failure in its phase error; cancellation passes through.
fn phase_failure(job_id: JobId, phase: JobStatus, err: MapReduceError) -> MapReduceError {
    match (phase, err) {
        (_, cancelled @ MapReduceError::Cancelled { .. }) => cancelled,
        (JobStatus::Mapping, err) => MapReduceError::MapPhase {
            job_id,
            source: Box::new(err),
        },
        (_, err) => MapReduceError::ReducePhase {
            job_id,
            source: Box::new(err),
        },
    }
}

/// Merge reduce results into the final counts; a duplicate word means two
/// reduce tasks were built for one key, which is a defect.
fn merge_final_counts(reduce_results: &[ReduceResult]) -> MapReduceResult<FinalCounts> {
    let mut final_counts = FinalCounts::new();
    for result in reduce_results {
        if final_counts
            .insert(result.word.clone(), result.total)
            .is_some()
        {
            return Err(MapReduceError::InvariantViolation {
                reason: format!("duplicate reduce result for word {:?}", result.word),
            });
        }
    }
    Ok(final_counts)
}

fn full_message(err: &MapReduceError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
