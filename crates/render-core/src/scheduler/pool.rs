//! Worker pool startup and ownership

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventPublisher, PipelineEvent};
use crate::protocol::{HostMessage, RenderJob, WorkerMessage};
use crate::types::{JobId, WorkerId};
use crate::worker::{EngineFactory, WorkerHandle, WorkerState};

/// Every worker handle plus the completion channel they all reply on
///
/// Worker `n` is always at index `n`.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    completion_rx: Receiver<WorkerMessage>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers and bootstrap each one
    ///
    /// Returns once every worker has answered `worker_init`. If any worker
    /// reports `init_error`, or `config.init_timeout()` passes first, all
    /// spawned workers are shut down and the error names the workers that
    /// never acknowledged.
    pub fn initialize(
        config: &PipelineConfig,
        bootstrap: Arc<[u8]>,
        factory: &EngineFactory,
        events: &EventPublisher,
    ) -> PipelineResult<Self> {
        let (completion_tx, completion_rx) = crossbeam::channel::unbounded();

        let mut pool = Self {
            workers: Vec::with_capacity(config.worker_count as usize),
            completion_rx,
        };

        for n in 0..config.worker_count {
            let id = WorkerId(n);
            let handle = WorkerHandle::spawn(id, factory(id), completion_tx.clone())?;
            handle.send(HostMessage::Init {
                worker_id: id,
                bootstrap_data: bootstrap.clone(),
                render_ahead_seconds: config.timings.render_ahead_seconds,
                retention_seconds: config.timings.retention_seconds,
                sample_rate: config.sample_rate,
                block_size: config.block_size,
                num_workers: config.worker_count,
            })?;
            pool.workers.push(handle);
        }
        drop(completion_tx);

        let mut pending: BTreeSet<WorkerId> = pool.workers.iter().map(|w| w.id()).collect();
        let deadline = Instant::now() + config.init_timeout();

        let failure = loop {
            if pending.is_empty() {
                break None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match pool.completion_rx.recv_timeout(remaining) {
                Ok(WorkerMessage::WorkerInit { worker_id }) => {
                    if pending.remove(&worker_id) {
                        log::info!("{} ready", worker_id);
                        events.publish(PipelineEvent::WorkerReady { worker: worker_id });
                    }
                }
                Ok(WorkerMessage::InitError { worker_id, error }) => {
                    break Some(format!("{} failed to bootstrap: {}", worker_id, error));
                }
                Ok(other) => {
                    log::debug!("Ignoring '{}' during init", other.tag());
                }
                Err(RecvTimeoutError::Timeout) => {
                    break Some(format!(
                        "no acknowledgement within {}ms",
                        config.init_timeout_ms
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Some("all workers disconnected".to_string());
                }
            }
        };

        if let Some(reason) = failure {
            let unacknowledged: Vec<WorkerId> = pending.into_iter().collect();
            log::error!(
                "Worker pool initialization failed: {} ({:?} unacknowledged)",
                reason,
                unacknowledged
            );
            pool.shutdown();
            return Err(PipelineError::Initialization {
                unacknowledged,
                reason,
            });
        }

        log::info!("Worker pool ready with {} workers", pool.workers.len());
        Ok(pool)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn handles(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(id.index())
    }

    /// Workers that haven't stopped
    pub fn running_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state() != WorkerState::Stopped)
            .count()
    }

    pub fn idle_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_idle()).count()
    }

    /// Channel every worker replies on
    pub fn completions(&self) -> &Receiver<WorkerMessage> {
        &self.completion_rx
    }

    /// Hand `job` to worker `id`
    pub fn assign(&mut self, id: WorkerId, job: &RenderJob) -> PipelineResult<()> {
        match self.workers.get_mut(id.index()) {
            Some(worker) => worker.assign(job),
            None => Err(PipelineError::WorkerDisconnected(id)),
        }
    }

    /// Mark worker `id` idle if it was busy with `job`
    pub fn complete(&mut self, id: WorkerId, job: JobId) -> bool {
        self.workers
            .get_mut(id.index())
            .map(|worker| worker.complete(job))
            .unwrap_or(false)
    }

    pub fn mark_stopped(&mut self, id: WorkerId) {
        if let Some(worker) = self.workers.get_mut(id.index()) {
            worker.mark_stopped();
        }
    }

    /// Ask every worker to exit, then join them all
    pub fn shutdown(&mut self) {
        // Broadcast first so workers wind down in parallel
        for worker in &self.workers {
            let _ = worker.send(HostMessage::Shutdown);
        }
        for worker in &mut self.workers {
            worker.shutdown();
        }
        log::info!("Worker pool shut down");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}
