//! Job record and the data flowing through a MapReduce run
//!
//! A [`Job`] owns everything produced on behalf of one submission: the input
//! chunks, per-mapper results, shuffled groups, reduce results, and the
//! final word counts. Status transitions are monotonic; `Failed` is the only
//! backward-reachable state and is absorbing.

use crate::error::{MapReduceError, MapReduceResult};
use crate::partition::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job
///
/// Transitions run Pending → Mapping → Shuffling → Reducing → Done.
/// `Failed` is reachable from any non-terminal state (batch failure or
/// cancellation) and is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Mapping,
    Shuffling,
    Reducing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether a transition to `next` respects the monotonic state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Mapping) => true,
            (Mapping, Shuffling) => true,
            (Shuffling, Reducing) => true,
            (Reducing, Done) => true,
            (s, Failed) => !s.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Pending => "pending",
            JobStatus::Mapping => "mapping",
            JobStatus::Shuffling => "shuffling",
            JobStatus::Reducing => "reducing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// A map task: one chunk assigned to one mapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTask {
    pub mapper_id: usize,
    pub chunk: Chunk,
}

/// Per-chunk word counts produced by one mapper
///
/// Invariant: every key is non-empty and lower-cased, every count is ≥ 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapResult {
    pub mapper_id: usize,
    pub counts: HashMap<String, u64>,
}

/// One mapper's contribution to a word's total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub mapper_id: usize,
    pub count: u64,
}

/// Word → contributions from every mapper that saw that word
pub type ShuffleGroup = HashMap<String, Vec<Contribution>>;

/// A reduce task: one distinct word and its shuffled contributions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceTask {
    pub word: String,
    pub entries: Vec<Contribution>,
}

/// Aggregated total for one word
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceResult {
    pub word: String,
    pub total: u64,
    pub mapper_ids: Vec<usize>,
}

/// Word → total count across the whole input
pub type FinalCounts = HashMap<String, u64>;

/// Timing and throughput collected for one completed phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub phase: JobStatus,
    pub duration_ms: u64,
    pub items_processed: usize,
}

/// The in-memory record for one submitted job
///
/// Owned exclusively by the coordinator for mutation; tasks never hold a
/// reference into it. Partial state is retained on failure for diagnostics,
/// but `final_counts` is only ever populated for a `Done` job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input: String,
    pub mapper_count: usize,
    pub status: JobStatus,
    pub chunks: Vec<Chunk>,
    pub map_results: Option<Vec<MapResult>>,
    pub groups: Option<ShuffleGroup>,
    pub reduce_results: Option<Vec<ReduceResult>>,
    pub final_counts: Option<FinalCounts>,
    pub error: Option<String>,
    pub metrics: Vec<PhaseMetrics>,
}

impl Job {
    pub fn new(id: JobId, input: impl Into<String>, mapper_count: usize, chunks: Vec<Chunk>) -> Self {
        Self {
            id,
            input: input.into(),
            mapper_count,
            status: JobStatus::Pending,
            chunks,
            map_results: None,
            groups: None,
            reduce_results: None,
            final_counts: None,
            error: None,
            metrics: Vec::new(),
        }
    }

    /// Advance the status, enforcing the monotonic state machine.
    ///
    /// Moving out of a terminal state is rejected with `JobAlreadyTerminal`;
    /// any other disallowed transition is a defect.
    pub fn transition(&mut self, next: JobStatus) -> MapReduceResult<()> {
        if self.status.is_terminal() {
            return Err(MapReduceError::JobAlreadyTerminal { job_id: self.id });
        }
        if !self.status.can_transition_to(next) {
            return Err(MapReduceError::InvariantViolation {
                reason: format!(
                    "illegal status transition {} -> {} for job {}",
                    self.status, next, self.id
                ),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move the job to `Failed`, recording the failure message.
    ///
    /// No-op if the job is already terminal; the first terminal state wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
    }

    /// Snapshot of whatever state is currently available.
    pub fn report(&self) -> JobStatusReport {
        JobStatusReport {
            job_id: self.id,
            status: self.status,
            chunks: if self.chunks.is_empty() {
                None
            } else {
                Some(self.chunks.clone())
            },
            map_results: self.map_results.clone(),
            reduce_results: self.reduce_results.clone(),
            final_counts: self.final_counts.clone(),
            error: self.error.clone(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            status: self.status,
            total_words: self
                .final_counts
                .as_ref()
                .map(|counts| counts.values().sum()),
        }
    }
}

/// Non-blocking view of a job returned by `get_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<Chunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_results: Option<Vec<MapResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_results: Option<Vec<ReduceResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_counts: Option<FinalCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: Vec<PhaseMetrics>,
}

/// One line in a job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_words: Option<u64>,
}
