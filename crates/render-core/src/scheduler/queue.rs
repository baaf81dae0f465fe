//! Bounded FIFO of render jobs waiting for an idle worker

use std::collections::VecDeque;

use crate::error::{PipelineError, PipelineResult};
use crate::protocol::RenderJob;
use crate::types::{ChannelId, WorkerId};

/// Pending-job queue
///
/// New jobs go to the back and are refused once `limit` jobs are waiting.
/// Retries go to the front and are always accepted: they replace a job that
/// was already admitted, so they never grow the total work.
#[derive(Debug)]
pub struct JobQueue {
    jobs: VecDeque<RenderJob>,
    limit: usize,
}

impl JobQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            jobs: VecDeque::with_capacity(limit + 1),
            limit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether a new job would be refused
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.jobs.len() >= self.limit
    }

    /// Admit a new job at the back of the queue
    pub fn push_back(&mut self, job: RenderJob) -> PipelineResult<()> {
        if self.is_saturated() {
            return Err(PipelineError::QueueSaturated {
                pending: self.jobs.len(),
                limit: self.limit,
            });
        }
        self.jobs.push_back(job);
        Ok(())
    }

    /// Put a retry at the head of the queue
    pub fn push_front(&mut self, job: RenderJob) {
        self.jobs.push_front(job);
    }

    /// Remove the first job `worker` may take
    ///
    /// A retry is skipped for the worker that already failed it, unless
    /// `allow_excluded` is set (no other worker is left to try).
    pub fn take_for(&mut self, worker: WorkerId, allow_excluded: bool) -> Option<RenderJob> {
        let position = self
            .jobs
            .iter()
            .position(|job| allow_excluded || job.excluded_worker != Some(worker))?;
        self.jobs.remove(position)
    }

    /// Whether a job for `channel` is waiting
    pub fn contains_channel(&self, channel: ChannelId) -> bool {
        self.jobs.iter().any(|job| job.channel == channel)
    }

    /// Drop every pending job, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.jobs.len();
        self.jobs.clear();
        dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderJob> {
        self.jobs.iter()
    }
}
