//! Render jobs and their results

use serde::{Deserialize, Serialize};

use super::messages::{HostMessage, WorkerMessage};
use crate::types::{BlockRange, ChannelId, JobId, Sample, WorkerId};

/// Parameters a worker renders a block against
///
/// Only a handle travels with the job: the worker resolves it against the
/// engine state it already owns. No audio or project data is copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderParams {
    /// Generation of the engine state snapshot to render from
    pub state_generation: u64,
}

/// A block of frames to render for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub id: JobId,
    pub channel: ChannelId,
    pub range: BlockRange,
    pub params: RenderParams,
    /// Worker currently rendering the job (set on dispatch)
    pub worker: Option<WorkerId>,
    /// 0 for the first attempt, 1 for the retry
    pub attempt: u8,
    /// Worker that already failed this job; the retry avoids it when possible
    pub excluded_worker: Option<WorkerId>,
}

impl RenderJob {
    pub fn new(id: JobId, channel: ChannelId, range: BlockRange, params: RenderParams) -> Self {
        Self {
            id,
            channel,
            range,
            params,
            worker: None,
            attempt: 0,
            excluded_worker: None,
        }
    }

    /// Whether this job has already been retried once
    #[inline]
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    /// Build the wire message sent to the worker
    pub fn to_message(&self) -> HostMessage {
        HostMessage::Job {
            job_id: self.id,
            channel_id: self.channel,
            start_frame: self.range.start_frame,
            block_size: self.range.frames,
            params: self.params,
        }
    }
}

/// Outcome reported by a worker
#[derive(Debug, Clone, PartialEq)]
pub enum RenderStatus {
    Ok,
    Failed(String),
}

/// A worker's answer to exactly one [`RenderJob`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub worker: WorkerId,
    pub job: JobId,
    pub channel: ChannelId,
    /// Rendered block (empty when the job failed)
    pub samples: Vec<Sample>,
    pub status: RenderStatus,
}

impl RenderResult {
    pub fn ok(worker: WorkerId, job: JobId, channel: ChannelId, samples: Vec<Sample>) -> Self {
        Self {
            worker,
            job,
            channel,
            samples,
            status: RenderStatus::Ok,
        }
    }

    pub fn failed(worker: WorkerId, job: JobId, channel: ChannelId, reason: impl Into<String>) -> Self {
        Self {
            worker,
            job,
            channel,
            samples: Vec::new(),
            status: RenderStatus::Failed(reason.into()),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self.status, RenderStatus::Ok)
    }

    /// Convert a `result` message; other message kinds return `None`
    ///
    /// A result carrying an error is a failure even if it also has samples.
    /// A result with neither is treated as a failure too.
    pub fn from_message(message: WorkerMessage) -> Option<Self> {
        match message {
            WorkerMessage::Result {
                worker_id,
                job_id,
                channel_id,
                samples,
                error,
            } => Some(match (samples, error) {
                (_, Some(error)) => Self::failed(worker_id, job_id, channel_id, error),
                (Some(samples), None) => Self::ok(worker_id, job_id, channel_id, samples),
                (None, None) => Self::failed(worker_id, job_id, channel_id, "result carried no samples"),
            }),
            _ => None,
        }
    }

    /// Convert into a `result` message
    pub fn into_message(self) -> WorkerMessage {
        let (samples, error) = match self.status {
            RenderStatus::Ok => (Some(self.samples), None),
            RenderStatus::Failed(reason) => (None, Some(reason)),
        };
        WorkerMessage::Result {
            worker_id: self.worker,
            job_id: self.job,
            channel_id: self.channel,
            samples,
            error,
        }
    }
}
