//! Control-context error types
//!
//! Errors raised on the real-time path never appear here: the output driver
//! turns them into silence plus a telemetry record. Everything below is
//! returned to the controlling collaborator from `initialize`, `tick` or
//! result handling.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ring::OverflowError;
use crate::types::{ChannelId, JobId, WorkerId};

/// Errors that can occur while running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fatal to startup: some workers never acknowledged `init`
    #[error("Workers failed to initialize: {unacknowledged:?} ({reason})")]
    Initialization {
        unacknowledged: Vec<WorkerId>,
        reason: String,
    },

    /// A result didn't fit in its channel's ring (scheduling bug)
    #[error("Result for {job} on {channel} overflowed the ring: {source}")]
    Overflow {
        channel: ChannelId,
        job: JobId,
        #[source]
        source: OverflowError,
    },

    /// Too many pending jobs; admission paused until the queue drains
    #[error("Render queue saturated ({pending}/{limit} pending jobs)")]
    QueueSaturated { pending: usize, limit: usize },

    /// A job failed on two workers; its block was replaced by silence
    #[error("Render failure for {job} on {channel}: {reason}")]
    RenderFailure {
        channel: ChannelId,
        job: JobId,
        reason: String,
    },

    /// A worker's channel closed unexpectedly
    #[error("{0} disconnected")]
    WorkerDisconnected(WorkerId),

    /// Configuration rejected by validation
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    /// A worker thread couldn't be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
