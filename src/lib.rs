//! # Tally
//!
//! An in-process MapReduce coordinator for word counting with genuine
//! concurrency and failure handling: job splitting, bounded-parallel worker
//! dispatch, shuffle, bounded-parallel reduction, retry with backoff,
//! fail-fast phase barriers, cancellation, and an append-only observable
//! event log.
//!
//! ## Modules
//!
//! - `config` - Coordinator and worker pool configuration
//! - `coordinator` - Job lifecycle orchestration and the caller-facing API
//! - `error` - The error taxonomy for the whole pipeline
//! - `event` - Append-only, streamable per-job event log
//! - `job` - Job record, status state machine, and the data model
//! - `partition` - Splitting input text into ordered chunks
//! - `pool` - Bounded-concurrency batch execution with retry
//! - `shuffle` - Regrouping per-mapper counts by word
//! - `wordcount` - The word-count map and reduce functions

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod job;
pub mod partition;
pub mod pool;
pub mod shuffle;
pub mod wordcount;

pub use config::{CoordinatorConfig, PoolConfig};
pub use coordinator::Coordinator;
pub use error::{MapReduceError, MapReduceResult};
pub use event::{EventLog, JobEvent, LogEntry};
pub use job::{FinalCounts, JobId, JobStatus, JobStatusReport, JobSummary};
