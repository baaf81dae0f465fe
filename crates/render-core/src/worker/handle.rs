//! Coordinator-side proxy for one worker render unit

use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;

use super::engine::RenderEngine;
use super::thread::run_worker;
use crate::error::{PipelineError, PipelineResult};
use crate::protocol::{HostMessage, RenderJob, WorkerMessage};
use crate::types::{JobId, WorkerId};

/// What the coordinator believes a worker is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy(JobId),
    /// Shut down or disconnected; never dispatched to again
    Stopped,
}

/// Handle to a worker thread
///
/// Owned exclusively by the scheduler. Dropping it asks the worker to shut
/// down and joins the thread.
pub struct WorkerHandle {
    id: WorkerId,
    state: WorkerState,
    tx: Sender<HostMessage>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker thread hosting `engine`
    ///
    /// The worker replies on `completion_tx`, which all workers share.
    pub fn spawn(
        id: WorkerId,
        engine: Box<dyn RenderEngine>,
        completion_tx: Sender<WorkerMessage>,
    ) -> PipelineResult<Self> {
        let (tx, rx) = crossbeam::channel::unbounded();

        let thread = thread::Builder::new()
            .name(format!("render-worker-{}", id.0))
            .spawn(move || run_worker(id, engine, rx, completion_tx))
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            id,
            state: WorkerState::Idle,
            tx,
            thread: Some(thread),
        })
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    /// Job the worker is rendering, if any
    pub fn current_job(&self) -> Option<JobId> {
        match self.state {
            WorkerState::Busy(job) => Some(job),
            _ => None,
        }
    }

    /// Send a raw protocol message
    pub fn send(&self, message: HostMessage) -> PipelineResult<()> {
        self.tx
            .send(message)
            .map_err(|_| PipelineError::WorkerDisconnected(self.id))
    }

    /// Hand `job` to this worker and mark it busy
    ///
    /// On a closed channel the worker is marked stopped and the job stays
    /// with the caller.
    pub fn assign(&mut self, job: &RenderJob) -> PipelineResult<()> {
        debug_assert!(self.is_idle(), "{} assigned while {:?}", self.id, self.state);
        if let Err(e) = self.send(job.to_message()) {
            self.state = WorkerState::Stopped;
            return Err(e);
        }
        self.state = WorkerState::Busy(job.id);
        Ok(())
    }

    /// Mark the worker idle if it was busy with `job`
    ///
    /// Returns `false` for a result the worker's state doesn't account for
    /// (e.g. a late answer after the coordinator gave up on it).
    pub fn complete(&mut self, job: JobId) -> bool {
        if self.state == WorkerState::Busy(job) {
            self.state = WorkerState::Idle;
            true
        } else {
            false
        }
    }

    /// Mark the worker as gone
    pub fn mark_stopped(&mut self) {
        self.state = WorkerState::Stopped;
    }

    /// Check if the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the worker to exit and wait for its thread
    ///
    /// A job in progress is finished first; its result is never read.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(HostMessage::Shutdown);
        self.state = WorkerState::Stopped;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("{} panicked", self.id);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("running", &self.is_running())
            .finish()
    }
}
