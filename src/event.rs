//! Append-only event log for job observability
//!
//! Every phase transition and task event is recorded as a typed [`JobEvent`]
//! and rendered into a timestamped [`LogEntry`]. Appending never blocks and
//! never fails; history is never rewritten or deleted. Consumers either take
//! a point-in-time [`snapshot`](EventLog::snapshot) or [`stream`](EventLog::stream)
//! the full history followed by live entries.

use crate::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// All events emitted during a job's lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    JobStarted {
        job_id: JobId,
        mapper_count: usize,
        chunk_count: usize,
    },
    PhaseStarted {
        job_id: JobId,
        phase: JobStatus,
    },
    PhaseCompleted {
        job_id: JobId,
        phase: JobStatus,
        duration_ms: u64,
        items: usize,
    },
    TaskStarted {
        job_id: JobId,
        phase: JobStatus,
        task_id: String,
        attempt: u32,
    },
    TaskCompleted {
        job_id: JobId,
        phase: JobStatus,
        task_id: String,
    },
    TaskRetrying {
        job_id: JobId,
        phase: JobStatus,
        task_id: String,
        attempt: u32,
        backoff_ms: u64,
    },
    TaskFailed {
        job_id: JobId,
        phase: JobStatus,
        task_id: String,
        error: String,
    },
    JobCompleted {
        job_id: JobId,
        distinct_words: usize,
        total_words: u64,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },
    JobCancelled {
        job_id: JobId,
    },
}

impl JobEvent {
    /// The phase tag recorded alongside this event.
    pub fn phase(&self) -> JobStatus {
        use JobEvent::*;
        match self {
            JobStarted { .. } => JobStatus::Pending,
            PhaseStarted { phase, .. }
            | PhaseCompleted { phase, .. }
            | TaskStarted { phase, .. }
            | TaskCompleted { phase, .. }
            | TaskRetrying { phase, .. }
            | TaskFailed { phase, .. } => *phase,
            JobCompleted { .. } => JobStatus::Done,
            JobFailed { .. } | JobCancelled { .. } => JobStatus::Failed,
        }
    }

    pub fn job_id(&self) -> JobId {
        use JobEvent::*;
        match self {
            JobStarted { job_id, .. }
            | PhaseStarted { job_id, .. }
            | PhaseCompleted { job_id, .. }
            | TaskStarted { job_id, .. }
            | TaskCompleted { job_id, .. }
            | TaskRetrying { job_id, .. }
            | TaskFailed { job_id, .. }
            | JobCompleted { job_id, .. }
            | JobFailed { job_id, .. }
            | JobCancelled { job_id, .. } => *job_id,
        }
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use JobEvent::*;
        match self {
            JobStarted {
                job_id,
                mapper_count,
                chunk_count,
            } => write!(
                f,
                "job {job_id} started: {chunk_count} chunks for {mapper_count} requested mappers"
            ),
            PhaseStarted { job_id, phase } => write!(f, "job {job_id}: {phase} phase started"),
            PhaseCompleted {
                job_id,
                phase,
                duration_ms,
                items,
            } => write!(
                f,
                "job {job_id}: {phase} phase completed, {items} items in {duration_ms}ms"
            ),
            TaskStarted {
                task_id, attempt, ..
            } => write!(f, "task {task_id} started (attempt {attempt})"),
            TaskCompleted { task_id, .. } => write!(f, "task {task_id} completed"),
            TaskRetrying {
                task_id,
                attempt,
                backoff_ms,
                ..
            } => write!(
                f,
                "task {task_id} retrying (attempt {attempt}) after {backoff_ms}ms backoff"
            ),
            TaskFailed { task_id, error, .. } => write!(f, "task {task_id} failed: {error}"),
            JobCompleted {
                job_id,
                distinct_words,
                total_words,
            } => write!(
                f,
                "job {job_id} completed: {distinct_words} distinct words, {total_words} total"
            ),
            JobFailed { job_id, error } => write!(f, "job {job_id} failed: {error}"),
            JobCancelled { job_id } => write!(f, "job {job_id} cancelled"),
        }
    }
}

/// One timestamped record in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub phase: JobStatus,
    pub message: String,
}

impl LogEntry {
    /// Whether this entry closes the log (job reached Done or Failed).
    ///
    /// Only job-level terminal events carry a terminal phase tag, so this
    /// doubles as the end-of-stream marker for subscribers.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Append-only log of one job's events
pub struct EventLog {
    entries: Mutex<Vec<LogEntry>>,
    live: broadcast::Sender<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            entries: Mutex::new(Vec::new()),
            live,
        }
    }

    /// Append an event. Never blocks callers for long and never fails.
    pub fn record(&self, event: JobEvent) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            phase: event.phase(),
            message: event.to_string(),
        };
        debug!(job_id = %event.job_id(), phase = %entry.phase, "{}", entry.message);

        // Push and publish under the lock so stream subscribers observe
        // the same ordering as snapshot readers.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry.clone());
        let _ = self.live.send(entry);
    }

    /// Immutable ordered copy of all entries recorded so far.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    /// Full history followed by live entries.
    ///
    /// Each call restarts from the beginning. The stream ends after the
    /// terminal entry, so it is finite once the job reaches Done or Failed.
    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = LogEntry> + Send>> {
        // Subscribe while holding the lock so no entry lands in both (or
        // neither) the history and the live feed.
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let history: Vec<LogEntry> = entries.clone();
        let receiver = self.live.subscribe();
        drop(entries);

        if history.iter().any(LogEntry::is_terminal) {
            return stream::iter(history).boxed();
        }

        let live = BroadcastStream::new(receiver)
            .filter_map(|result| async move { result.ok() })
            .scan(false, |closed, entry| {
                let item = if *closed { None } else { Some(entry) };
                if let Some(entry) = &item {
                    *closed = entry.is_terminal();
                }
                futures::future::ready(item)
            });

        stream::iter(history).chain(live).boxed()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_job() -> (EventLog, JobId) {
        (EventLog::new(), JobId::new())
    }

    #[test]
    fn snapshot_preserves_emission_order() {
        let (log, job_id) = log_with_job();
        log.record(JobEvent::JobStarted {
            job_id,
            mapper_count: 3,
            chunk_count: 3,
        });
        log.record(JobEvent::PhaseStarted {
            job_id,
            phase: JobStatus::Mapping,
        });

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phase, JobStatus::Pending);
        assert_eq!(entries[1].phase, JobStatus::Mapping);
        assert!(entries[0].message.contains("started"));
    }

    #[tokio::test]
    async fn stream_replays_history_then_live_entries() {
        let (log, job_id) = log_with_job();
        log.record(JobEvent::PhaseStarted {
            job_id,
            phase: JobStatus::Mapping,
        });

        let mut stream = log.stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first.phase, JobStatus::Mapping);

        log.record(JobEvent::JobCompleted {
            job_id,
            distinct_words: 5,
            total_words: 7,
        });
        let second = stream.next().await.unwrap();
        assert!(second.is_terminal());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_is_finite_for_terminal_jobs() {
        let (log, job_id) = log_with_job();
        log.record(JobEvent::PhaseStarted {
            job_id,
            phase: JobStatus::Mapping,
        });
        log.record(JobEvent::JobFailed {
            job_id,
            error: "boom".to_string(),
        });

        let entries: Vec<LogEntry> = log.stream().collect().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_terminal());
    }

    #[test]
    fn task_events_carry_their_phase_tag() {
        let (_, job_id) = log_with_job();
        let event = JobEvent::TaskRetrying {
            job_id,
            phase: JobStatus::Reducing,
            task_id: "reduce-hello".to_string(),
            attempt: 1,
            backoff_ms: 50,
        };
        assert_eq!(event.phase(), JobStatus::Reducing);
        assert_eq!(event.job_id(), job_id);
    }
}
