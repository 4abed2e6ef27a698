//! Structured error types for MapReduce job execution
//!
//! Provides one taxonomy for the whole pipeline: input validation errors
//! that surface before a job exists, task-level failures the worker pool
//! retries internally, phase-level failures that move a job to `Failed`,
//! and internal consistency violations that indicate a defect.

use crate::job::JobId;
use thiserror::Error;

/// Result type for MapReduce operations
pub type MapReduceResult<T> = Result<T, MapReduceError>;

/// Main error type for MapReduce operations
#[derive(Debug, Error)]
pub enum MapReduceError {
    // Input validation errors. Surfaced synchronously; no job is created.
    #[error("input text is empty")]
    EmptyInput,

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // A single task failure. Retried by the worker pool; only surfaces
    // once the retry budget is exhausted.
    #[error("task {task_id} failed: {cause}")]
    Worker { task_id: String, cause: String },

    // Phase-level batch failures. The job transitions to Failed and the
    // underlying cause is preserved.
    #[error("map phase failed for job {job_id}")]
    MapPhase {
        job_id: JobId,
        #[source]
        source: Box<MapReduceError>,
    },

    #[error("reduce phase failed for job {job_id}")]
    ReducePhase {
        job_id: JobId,
        #[source]
        source: Box<MapReduceError>,
    },

    #[error("job {job_id} was cancelled")]
    Cancelled { job_id: JobId },

    // Internal consistency failure. Not retryable; indicates a defect.
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("job {job_id} is already in a terminal state")]
    JobAlreadyTerminal { job_id: JobId },

    #[error("job {job_id} not found")]
    JobNotFound { job_id: JobId },
}

impl MapReduceError {
    /// Whether the worker pool should retry the task that produced this error.
    ///
    /// Only single-task failures are retryable; cancellation and invariant
    /// violations must propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MapReduceError::Worker { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_errors_are_retryable() {
        let err = MapReduceError::Worker {
            task_id: "map-0".to_string(),
            cause: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn cancellation_is_not_retryable() {
        let err = MapReduceError::Cancelled {
            job_id: JobId::new(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn phase_errors_preserve_cause() {
        let job_id = JobId::new();
        let cause = MapReduceError::Worker {
            task_id: "map-3".to_string(),
            cause: "boom".to_string(),
        };
        let err = MapReduceError::MapPhase {
            job_id,
            source: Box::new(cause),
        };
        let source = std::error::Error::source(&err).expect("cause retained");
        assert!(source.to_string().contains("map-3"));
    }
}
