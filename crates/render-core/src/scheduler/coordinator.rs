//! Job admission, dispatch and result handling on the control context

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::RecvTimeoutError;

use super::pool::WorkerPool;
use super::queue::JobQueue;
use crate::channel::Channel;
use crate::config::{OverflowPolicy, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventPublisher, PipelineEvent};
use crate::output::{DeviceGate, RtTelemetry, TelemetryReceiver};
use crate::protocol::{RenderJob, RenderParams, RenderResult, RenderStatus, WorkerMessage};
use crate::ring::OverflowError;
use crate::types::{BlockRange, ChannelId, JobId, Sample, WorkerId};
use crate::worker::WorkerState;

/// Size of the job that tops a channel back up to `target` frames of headroom
///
/// Rounded up to whole engine blocks, then clamped to the ring's free space.
pub(crate) fn job_frames(target: u64, headroom: usize, free: usize, block_size: u32) -> u32 {
    let deficit = target.saturating_sub(headroom as u64);
    if deficit == 0 {
        return 0;
    }
    let block = block_size.max(1) as u64;
    let rounded = deficit.div_ceil(block) * block;
    rounded.min(free as u64).min(u32::MAX as u64) as u32
}

/// What one [`Scheduler::tick`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// New jobs admitted to the queue
    pub enqueued: usize,
    /// Jobs handed to workers
    pub dispatched: usize,
    /// In-flight jobs that passed their deadline
    pub timed_out: usize,
    /// Admission stopped early because the queue was full
    pub saturated: bool,
    /// Telemetry records drained from the output driver
    pub telemetry: usize,
}

#[derive(Debug)]
struct InFlight {
    job: RenderJob,
    worker: WorkerId,
    dispatched_at: Instant,
    /// Device epoch at dispatch; a result from an older epoch is stale
    epoch: u64,
}

#[derive(Debug)]
struct ChannelSlot {
    channel: Arc<Channel>,
    /// The one job this channel may have queued or in flight
    outstanding: Option<JobId>,
}

/// What to put in the ring for a finished job
#[derive(Debug, Clone, Copy)]
enum Fill<'a> {
    Samples(&'a [Sample]),
    Silence(usize),
}

/// Ring write outcome, computed under the lock and logged after it
enum Committed {
    Written(usize),
    Clamped { written: usize, source: OverflowError },
    OutOfOrder { cursor: u64 },
}

/// The control-context coordinator
///
/// Owns the worker pool and pending-job queue exclusively. Keeps every
/// channel's headroom near the render-ahead target, one job per channel at a
/// time, so results always land in block order.
pub struct Scheduler {
    pool: WorkerPool,
    queue: JobQueue,
    slots: Vec<ChannelSlot>,
    in_flight: HashMap<JobId, InFlight>,
    gate: Arc<DeviceGate>,
    events: EventPublisher,
    telemetry: TelemetryReceiver,
    next_job_id: u64,
    target_frames: u64,
    block_size: u32,
    job_timeout: Duration,
    overflow_policy: OverflowPolicy,
    params: RenderParams,
}

impl Scheduler {
    pub fn new(
        config: &PipelineConfig,
        pool: WorkerPool,
        channels: Vec<Arc<Channel>>,
        gate: Arc<DeviceGate>,
        events: EventPublisher,
        telemetry: TelemetryReceiver,
    ) -> Self {
        let slots = channels
            .into_iter()
            .map(|channel| ChannelSlot {
                channel,
                outstanding: None,
            })
            .collect();

        Self {
            pool,
            queue: JobQueue::new(config.max_pending_jobs),
            slots,
            in_flight: HashMap::new(),
            gate,
            events,
            telemetry,
            next_job_id: 0,
            target_frames: config.target_frames(),
            block_size: config.block_size,
            job_timeout: config.job_timeout(),
            overflow_policy: config.overflow_policy,
            params: RenderParams::default(),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn gate(&self) -> &Arc<DeviceGate> {
        &self.gate
    }

    /// Parameters attached to every job created from now on
    pub fn set_render_params(&mut self, params: RenderParams) {
        self.params = params;
    }

    /// Jobs waiting for a worker
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Jobs currently held by a worker
    pub fn in_flight_jobs(&self) -> usize {
        self.in_flight.len()
    }

    /// The job `channel` is waiting on, if any
    pub fn outstanding_for(&self, channel: ChannelId) -> Option<JobId> {
        self.slots.get(channel.index()).and_then(|slot| slot.outstanding)
    }

    /// Queued plus in-flight jobs for `channel`
    pub fn jobs_for(&self, channel: ChannelId) -> usize {
        let queued = self.queue.iter().filter(|job| job.channel == channel).count();
        let running = self
            .in_flight
            .values()
            .filter(|flight| flight.job.channel == channel)
            .count();
        queued + running
    }

    /// One control-loop step
    ///
    /// Drains real-time telemetry, then, while the device runs: fails jobs
    /// past their deadline, admits a job for every channel below the
    /// render-ahead target and hands queued jobs to idle workers.
    pub fn tick(&mut self) -> PipelineResult<TickSummary> {
        let mut summary = TickSummary {
            telemetry: self.drain_telemetry(),
            ..TickSummary::default()
        };

        if !self.gate.is_running() {
            return Ok(summary);
        }

        self.reap_workers()?;
        summary.timed_out = self.poll_timeouts(Instant::now())?;

        for index in 0..self.slots.len() {
            if self.slots[index].outstanding.is_some() {
                continue;
            }

            let channel = self.slots[index].channel.clone();
            let (start_frame, headroom, free) = channel
                .with_ring(|ring| (ring.write_cursor(), ring.headroom_frames(), ring.free_frames()));
            if headroom as u64 >= self.target_frames {
                continue;
            }
            let frames = job_frames(self.target_frames, headroom, free, self.block_size);
            if frames == 0 {
                continue;
            }

            debug_assert!(!self.queue.contains_channel(channel.id()));
            let id = JobId(self.next_job_id);
            let job = RenderJob::new(id, channel.id(), BlockRange::new(start_frame, frames), self.params);
            match self.queue.push_back(job) {
                Ok(()) => {
                    self.next_job_id += 1;
                    self.slots[index].outstanding = Some(id);
                    summary.enqueued += 1;
                    log::debug!(
                        "Enqueued {} for {}: {} frames from {} (headroom {})",
                        id,
                        channel.id(),
                        frames,
                        start_frame,
                        headroom
                    );
                }
                Err(PipelineError::QueueSaturated { pending, limit }) => {
                    log::warn!(
                        "Render queue saturated ({}/{}), deferring {}",
                        pending,
                        limit,
                        channel.id()
                    );
                    self.events
                        .publish(PipelineEvent::QueueSaturated { pending, limit });
                    summary.saturated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        summary.dispatched = self.dispatch();
        Ok(summary)
    }

    /// Hand queued jobs to idle workers, lowest worker id first
    ///
    /// A retry is never given to the worker that already failed it while
    /// any other worker is still running. Returns the number dispatched.
    pub fn dispatch(&mut self) -> usize {
        if !self.gate.is_running() || self.queue.is_empty() {
            return 0;
        }

        let allow_excluded = self.pool.running_count() <= 1;
        let epoch = self.gate.epoch();
        let mut dispatched = 0;

        for index in 0..self.pool.len() {
            if self.queue.is_empty() {
                break;
            }
            let worker = WorkerId(index as u32);
            if !self.pool.get(worker).is_some_and(|w| w.is_idle()) {
                continue;
            }
            let Some(mut job) = self.queue.take_for(worker, allow_excluded) else {
                continue;
            };

            match self.pool.assign(worker, &job) {
                Ok(()) => {
                    log::debug!(
                        "Dispatched {} ({} frames of {}) to {}",
                        job.id,
                        job.range.frames,
                        job.channel,
                        worker
                    );
                    job.worker = Some(worker);
                    self.in_flight.insert(
                        job.id,
                        InFlight {
                            job,
                            worker,
                            dispatched_at: Instant::now(),
                            epoch,
                        },
                    );
                    dispatched += 1;
                }
                Err(e) => {
                    log::warn!("Could not dispatch {} to {}: {}", job.id, worker, e);
                    self.queue.push_front(job);
                }
            }
        }

        dispatched
    }

    /// Wait up to `timeout` for worker messages and handle all that arrived
    ///
    /// Returns the number of messages handled.
    pub fn pump(&mut self, timeout: Duration) -> PipelineResult<usize> {
        let first = match self.pool.completions().recv_timeout(timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => return Ok(0),
            Err(RecvTimeoutError::Disconnected) => {
                // Every worker has exited; keep the caller's cadence
                std::thread::sleep(timeout);
                return Ok(0);
            }
        };
        self.handle_message(first)?;

        let mut handled = 1;
        while let Ok(message) = self.pool.completions().try_recv() {
            self.handle_message(message)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Route one worker message by its tag
    pub fn handle_message(&mut self, message: WorkerMessage) -> PipelineResult<()> {
        let tag = message.tag();
        match message {
            result @ WorkerMessage::Result { .. } => {
                if let Some(result) = RenderResult::from_message(result) {
                    self.on_result(result)?;
                }
            }
            WorkerMessage::WorkerInit { worker_id } => {
                log::debug!("Late worker_init from {}", worker_id);
                self.events
                    .publish(PipelineEvent::WorkerReady { worker: worker_id });
            }
            WorkerMessage::InitError { worker_id, error } => {
                log::error!("{} lost its engine: {}", worker_id, error);
                self.worker_lost(worker_id, error)?;
            }
            WorkerMessage::WorkerStopped { worker_id } => {
                log::info!("{} stopped", worker_id);
                self.events
                    .publish(PipelineEvent::WorkerStopped { worker: worker_id });
                self.worker_lost(worker_id, format!("{} stopped", worker_id))?;
            }
            WorkerMessage::Unrecognized => {
                log::warn!("Ignoring unrecognized worker message");
                self.events
                    .publish(PipelineEvent::UnrecognizedMessage { tag });
            }
        }
        Ok(())
    }

    /// Apply one worker result
    ///
    /// - `Ok` with the expected frame count: written to the channel's ring
    /// - `Failed` (or the wrong frame count): retried once on another worker,
    ///   then replaced by silence with a `RenderFailure` event
    /// - From a worker that no longer owns the job, or dispatched before the
    ///   device last left `Running`: discarded, ring untouched
    ///
    /// Errors only with `PipelineError::Overflow` under
    /// [`OverflowPolicy::Strict`].
    pub fn on_result(&mut self, result: RenderResult) -> PipelineResult<()> {
        let freed = self.pool.complete(result.worker, result.job);

        let owner = self.in_flight.get(&result.job).map(|flight| flight.worker);
        if owner != Some(result.worker) {
            log::debug!(
                "Discarding result for {} from {} (no longer in flight there)",
                result.job,
                result.worker
            );
            self.events.publish(PipelineEvent::ResultDiscarded {
                channel: result.channel,
                job: result.job,
            });
            if freed {
                self.dispatch();
            }
            return Ok(());
        }
        let Some(flight) = self.in_flight.remove(&result.job) else {
            return Ok(());
        };

        if !self.gate.is_running() || self.gate.epoch() != flight.epoch {
            log::debug!(
                "Device left Running while {} was in flight, discarding its result",
                flight.job.id
            );
            self.release(flight.job.channel);
            self.events.publish(PipelineEvent::ResultDiscarded {
                channel: flight.job.channel,
                job: flight.job.id,
            });
            return Ok(());
        }

        let expected = flight.job.range.len();
        let outcome = match result.status {
            RenderStatus::Ok if result.samples.len() == expected => {
                self.commit(&flight.job, Fill::Samples(&result.samples))
            }
            RenderStatus::Ok => {
                let reason = format!("returned {} frames, expected {}", result.samples.len(), expected);
                self.fail_job(flight.job, result.worker, reason)
            }
            RenderStatus::Failed(reason) => self.fail_job(flight.job, result.worker, reason),
        };

        self.dispatch();
        outcome
    }

    /// Fail every in-flight job older than the job timeout
    ///
    /// The worker stays busy: if it answers later, the answer is dropped
    /// unless the job was re-dispatched to that same worker.
    pub fn poll_timeouts(&mut self, now: Instant) -> PipelineResult<usize> {
        let timeout = self.job_timeout;
        let mut expired: Vec<JobId> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| now.saturating_duration_since(flight.dispatched_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        expired.sort();

        for id in &expired {
            if let Some(flight) = self.in_flight.remove(id) {
                log::warn!(
                    "{} on {} timed out after {}ms",
                    flight.job.id,
                    flight.worker,
                    timeout.as_millis()
                );
                let reason = format!("no result within {}ms", timeout.as_millis());
                self.fail_job(flight.job, flight.worker, reason)?;
            }
        }
        Ok(expired.len())
    }

    /// Turn queued real-time telemetry into events
    pub fn drain_telemetry(&mut self) -> usize {
        let events = &self.events;
        let count = self.telemetry.drain(|record| {
            let event = match record {
                RtTelemetry::Underrun { channel, frames } => PipelineEvent::Underrun {
                    channel,
                    frames: frames as u64,
                },
                RtTelemetry::Contended { channel, frames } => PipelineEvent::RingContended {
                    channel,
                    frames: frames as u64,
                },
            };
            events.publish(event);
        });

        let dropped = self.telemetry.take_dropped();
        if dropped > 0 {
            log::warn!("{} telemetry records dropped", dropped);
            events.publish(PipelineEvent::TelemetryDropped { count: dropped });
        }
        count
    }

    /// Drop every pending job and forget every in-flight one
    ///
    /// Workers finish what they're rendering; those results are discarded.
    /// Channels play out their headroom and then silence until the next
    /// `tick` admits new jobs.
    pub fn stop_all_processing(&mut self) {
        let dropped = self.queue.clear();
        let forgotten = self.in_flight.len();
        self.in_flight.clear();
        for slot in &mut self.slots {
            slot.outstanding = None;
        }
        log::info!(
            "Stopped all processing ({} pending dropped, {} in flight forgotten)",
            dropped,
            forgotten
        );
    }

    /// Stop processing and join every worker
    pub fn shutdown(&mut self) {
        self.stop_all_processing();
        self.pool.shutdown();
    }

    /// Retry a failed job once, then substitute silence
    fn fail_job(&mut self, mut job: RenderJob, worker: WorkerId, reason: String) -> PipelineResult<()> {
        if !job.is_retry() {
            log::warn!("{} for {} failed on {}: {}; retrying", job.id, job.channel, worker, reason);
            self.events.publish(PipelineEvent::JobRetried {
                channel: job.channel,
                job: job.id,
                failed_worker: worker,
                reason,
            });
            job.attempt += 1;
            job.excluded_worker = Some(worker);
            job.worker = None;
            self.queue.push_front(job);
            return Ok(());
        }

        let failure = PipelineError::RenderFailure {
            channel: job.channel,
            job: job.id,
            reason: reason.clone(),
        };
        log::error!("{}; substituting {} frames of silence", failure, job.range.frames);

        if let Some(slot) = self.slots.get(job.channel.index()) {
            slot.channel
                .atomics()
                .render_failures
                .fetch_add(1, Ordering::Relaxed);
        }
        self.events.publish(PipelineEvent::RenderFailure {
            channel: job.channel,
            job: job.id,
            frames: job.range.frames,
            reason,
        });

        self.commit(&job, Fill::Silence(job.range.len()))
    }

    /// Write a finished job into its channel's ring and free the channel
    fn commit(&mut self, job: &RenderJob, fill: Fill<'_>) -> PipelineResult<()> {
        let Some(slot) = self.slots.get_mut(job.channel.index()) else {
            return Ok(());
        };
        slot.outstanding = None;
        let channel = &slot.channel;
        let policy = self.overflow_policy;

        let committed = channel.with_ring(|ring| {
            if ring.write_cursor() != job.range.start_frame {
                return Ok(Committed::OutOfOrder {
                    cursor: ring.write_cursor(),
                });
            }
            let attempt = match fill {
                Fill::Samples(samples) => ring.write(samples),
                Fill::Silence(count) => ring.write_silence(count),
            };
            match (attempt, policy) {
                (Ok(()), _) => Ok(Committed::Written(job.range.len())),
                (Err(source), OverflowPolicy::Strict) => Err(source),
                (Err(source), OverflowPolicy::Clamp) => {
                    let written = match fill {
                        Fill::Samples(samples) => ring.write_clamped(samples),
                        Fill::Silence(count) => {
                            let n = count.min(ring.free_frames());
                            ring.write_silence(n).map_or(0, |()| n)
                        }
                    };
                    Ok(Committed::Clamped { written, source })
                }
            }
        });

        let written = match committed {
            Ok(Committed::Written(written)) => written,
            Ok(Committed::Clamped { written, source }) => {
                log::error!(
                    "{} overflowed {}: {}; kept {} frames",
                    job.id,
                    job.channel,
                    source,
                    written
                );
                written
            }
            Ok(Committed::OutOfOrder { cursor }) => {
                log::warn!(
                    "{} starts at frame {} but {} is at {}; discarding",
                    job.id,
                    job.range.start_frame,
                    job.channel,
                    cursor
                );
                0
            }
            Err(source) => {
                return Err(PipelineError::Overflow {
                    channel: job.channel,
                    job: job.id,
                    source,
                });
            }
        };

        channel
            .atomics()
            .written_frames
            .fetch_add(written as u64, Ordering::Relaxed);
        Ok(())
    }

    fn release(&mut self, channel: ChannelId) {
        if let Some(slot) = self.slots.get_mut(channel.index()) {
            slot.outstanding = None;
        }
    }

    /// A worker can no longer take jobs; fail whatever it was rendering
    ///
    /// A job the worker still holds after it timed out belongs to someone
    /// else by now and is left alone.
    fn worker_lost(&mut self, worker: WorkerId, reason: String) -> PipelineResult<()> {
        let orphan = self
            .pool
            .get(worker)
            .and_then(|handle| handle.current_job())
            .filter(|job| self.in_flight.get(job).is_some_and(|flight| flight.worker == worker));
        self.pool.mark_stopped(worker);
        if let Some(flight) = orphan.and_then(|id| self.in_flight.remove(&id)) {
            self.fail_job(flight.job, worker, reason)?;
        }
        self.dispatch();
        Ok(())
    }

    /// Notice worker threads that exited without saying so (e.g. an engine panic)
    fn reap_workers(&mut self) -> PipelineResult<()> {
        let dead: Vec<WorkerId> = self
            .pool
            .handles()
            .iter()
            .filter(|w| w.state() != WorkerState::Stopped && !w.is_running())
            .map(|w| w.id())
            .collect();
        for worker in dead {
            log::error!("{} exited unexpectedly", worker);
            self.events.publish(PipelineEvent::WorkerStopped { worker });
            self.worker_lost(worker, format!("{} exited unexpectedly", worker))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool", &self.pool)
            .field("pending", &self.queue.len())
            .field("in_flight", &self.in_flight.len())
            .field("target_frames", &self.target_frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferTimings;
    use crate::events::EventBus;
    use crate::output::{telemetry_channel, DeviceState, TelemetryProducer};
    use crate::worker::{engine_factory, EngineError, EngineFactory, EngineSetup, RenderEngine, SilenceEngine};
    use crossbeam::channel::{Receiver, Sender};
    use std::sync::Mutex;

    /// Fails every job, recording which worker was asked
    struct FailingEngine {
        worker: WorkerId,
        calls: Arc<Mutex<Vec<WorkerId>>>,
    }

    impl RenderEngine for FailingEngine {
        fn bootstrap(&mut self, _data: &[u8], setup: &EngineSetup) -> Result<(), EngineError> {
            self.worker = setup.worker_id;
            Ok(())
        }

        fn render_block(
            &mut self,
            _channel: ChannelId,
            _start_frame: u64,
            _params: &RenderParams,
            _out: &mut [Sample],
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(self.worker);
            Err(EngineError::Render("engine trap".to_string()))
        }
    }

    /// Renders ones, but only after the test releases it
    struct GatedEngine {
        release: Receiver<()>,
    }

    impl RenderEngine for GatedEngine {
        fn bootstrap(&mut self, _data: &[u8], _setup: &EngineSetup) -> Result<(), EngineError> {
            Ok(())
        }

        fn render_block(
            &mut self,
            _channel: ChannelId,
            _start_frame: u64,
            _params: &RenderParams,
            out: &mut [Sample],
        ) -> Result<(), EngineError> {
            self.release
                .recv_timeout(Duration::from_secs(10))
                .map_err(|_| EngineError::Render("never released".to_string()))?;
            out.fill(1.0);
            Ok(())
        }
    }

    struct Harness {
        scheduler: Scheduler,
        channels: Vec<Arc<Channel>>,
        gate: Arc<DeviceGate>,
        events: Receiver<PipelineEvent>,
        telemetry: TelemetryProducer,
    }

    fn harness(config: PipelineConfig, factory: EngineFactory) -> Harness {
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let pool = WorkerPool::initialize(&config, Arc::from(Vec::<u8>::new()), &factory, &bus.publisher()).unwrap();
        let channels: Vec<Arc<Channel>> = (0..config.channel_count)
            .map(|i| {
                Arc::new(Channel::new(ChannelId(i), config.sample_rate, &config.timings))
            })
            .collect();
        let gate = Arc::new(DeviceGate::new(DeviceState::Running));
        let (telemetry, receiver) = telemetry_channel(16);
        let scheduler = Scheduler::new(&config, pool, channels.clone(), gate.clone(), bus.publisher(), receiver);
        Harness {
            scheduler,
            channels,
            gate,
            events,
            telemetry,
        }
    }

    /// Small config where one job is exactly one engine block
    fn gated_config(workers: u32, channels: u32) -> PipelineConfig {
        PipelineConfig::default()
            .with_workers(workers)
            .with_channels(channels)
            .with_sample_rate(1000)
            .with_block_size(1000)
            .with_timings(BufferTimings::new(1.0, 4.0))
    }

    fn gated(config: PipelineConfig) -> (Harness, Sender<()>) {
        let (release_tx, release_rx) = crossbeam::channel::unbounded();
        let factory = engine_factory(move |_| GatedEngine {
            release: release_rx.clone(),
        });
        (harness(config, factory), release_tx)
    }

    fn pump_until(scheduler: &mut Scheduler, mut done: impl FnMut(&Scheduler) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            scheduler.pump(Duration::from_millis(10)).unwrap();
            if done(scheduler) {
                return true;
            }
        }
        false
    }

    fn drain(events: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        events.try_iter().collect()
    }

    #[test]
    fn test_job_frames() {
        assert_eq!(job_frames(48000, 0, 192000, 128), 48000);
        // 47900 rounds up to 375 blocks
        assert_eq!(job_frames(48000, 100, 191900, 128), 48000);
        assert_eq!(job_frames(48000, 48000, 144000, 128), 0);
        assert_eq!(job_frames(1000, 0, 500, 128), 500);
    }

    #[test]
    fn test_two_worker_scenario() {
        let config = PipelineConfig::default()
            .with_workers(2)
            .with_channels(1)
            .with_sample_rate(48000)
            .with_block_size(128)
            .with_timings(BufferTimings::new(1.0, 4.0));
        let mut h = harness(config, engine_factory(|_| SilenceEngine));

        let ready = drain(&h.events)
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::WorkerReady { .. }))
            .count();
        assert_eq!(ready, 2);

        let summary = h.scheduler.tick().unwrap();
        assert_eq!(summary.enqueued, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(
            h.scheduler.pool().get(WorkerId(0)).map(|w| w.state()),
            Some(WorkerState::Busy(JobId(0)))
        );
        assert!(h.scheduler.pool().get(WorkerId(1)).is_some_and(|w| w.is_idle()));

        assert!(pump_until(&mut h.scheduler, |s| s.in_flight_jobs() == 0));
        assert_eq!(h.channels[0].headroom_frames(), 48000);
        assert_eq!(h.channels[0].atomics().written_frames(), 48000);
        assert_eq!(h.scheduler.outstanding_for(ChannelId(0)), None);

        // At target: nothing to do
        let summary = h.scheduler.tick().unwrap();
        assert_eq!(summary.enqueued, 0);

        h.scheduler.shutdown();
    }

    #[test]
    fn test_failure_retried_on_other_worker_then_silenced() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let engine_calls = calls.clone();
        let factory = engine_factory(move |id| FailingEngine {
            worker: id,
            calls: engine_calls.clone(),
        });
        let config = PipelineConfig::default()
            .with_workers(2)
            .with_channels(1)
            .with_block_size(128);
        let mut h = harness(config, factory);
        // Put something in the ring so silence is distinguishable
        h.channels[0].with_ring(|r| r.write(&[1.0; 10]).unwrap());

        h.scheduler.tick().unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.outstanding_for(ChannelId(0)).is_none()));

        assert_eq!(*calls.lock().unwrap(), vec![WorkerId(0), WorkerId(1)]);
        // 47990 missing frames round up to 375 blocks of silence
        assert_eq!(h.channels[0].headroom_frames(), 48010);
        assert_eq!(h.channels[0].atomics().render_failures(), 1);

        let events = drain(&h.events);
        let retried: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::JobRetried { failed_worker, .. } => Some(*failed_worker),
                _ => None,
            })
            .collect();
        assert_eq!(retried, vec![WorkerId(0)]);
        let failures = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::RenderFailure { frames: 48000, .. }))
            .count();
        assert_eq!(failures, 1);

        let mut out = vec![9.0; 48010];
        h.channels[0].with_ring(|r| r.read(48010, &mut out));
        assert!(out[..10].iter().all(|&s| s == 1.0));
        assert!(out[10..].iter().all(|&s| s == 0.0));

        h.scheduler.shutdown();
    }

    #[test]
    fn test_suspend_mid_flight_discards_result() {
        let (mut h, release) = gated(gated_config(1, 1));

        assert_eq!(h.scheduler.tick().unwrap().dispatched, 1);
        h.gate.suspend();
        release.send(()).unwrap();

        assert!(pump_until(&mut h.scheduler, |s| s.in_flight_jobs() == 0));
        assert_eq!(h.channels[0].headroom_frames(), 0);
        assert_eq!(h.channels[0].atomics().written_frames(), 0);
        assert!(drain(&h.events)
            .iter()
            .any(|e| matches!(e, PipelineEvent::ResultDiscarded { job: JobId(0), .. })));

        // No new jobs while suspended
        assert_eq!(h.scheduler.tick().unwrap().enqueued, 0);

        // Restart picks up from the unchanged write cursor
        h.gate.start();
        assert_eq!(h.scheduler.tick().unwrap().dispatched, 1);
        release.send(()).unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.in_flight_jobs() == 0));
        assert_eq!(h.channels[0].headroom_frames(), 1000);

        h.scheduler.shutdown();
    }

    #[test]
    fn test_one_job_per_channel() {
        let (mut h, release) = gated(gated_config(2, 1));

        for _ in 0..5 {
            h.scheduler.tick().unwrap();
            assert_eq!(h.scheduler.jobs_for(ChannelId(0)), 1);
        }
        assert_eq!(h.scheduler.pool().idle_count(), 1);

        release.send(()).unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.in_flight_jobs() == 0));
        assert_eq!(h.scheduler.jobs_for(ChannelId(0)), 0);

        h.scheduler.shutdown();
    }

    #[test]
    fn test_queue_saturation() {
        let (mut h, release) = gated(gated_config(1, 2).with_max_pending_jobs(1));

        let summary = h.scheduler.tick().unwrap();
        assert!(summary.saturated);
        assert_eq!(summary.enqueued, 1);
        assert_eq!(summary.dispatched, 1);
        assert!(drain(&h.events)
            .iter()
            .any(|e| *e == PipelineEvent::QueueSaturated { pending: 1, limit: 1 }));

        // The queue drained into the worker, so channel 1 gets in now
        let summary = h.scheduler.tick().unwrap();
        assert!(!summary.saturated);
        assert_eq!(summary.enqueued, 1);
        assert_eq!(h.scheduler.pending_jobs(), 1);

        release.send(()).unwrap();
        release.send(()).unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.in_flight_jobs() == 0 && s.pending_jobs() == 0));
        assert_eq!(h.channels[0].headroom_frames(), 1000);
        assert_eq!(h.channels[1].headroom_frames(), 1000);

        h.scheduler.shutdown();
    }

    #[test]
    fn test_timed_out_job_retried_and_late_result_dropped() {
        let config = gated_config(2, 1).with_job_timeout(Duration::from_millis(20));
        let (mut h, release) = gated(config);

        h.scheduler.tick().unwrap();
        std::thread::sleep(Duration::from_millis(40));

        let summary = h.scheduler.tick().unwrap();
        assert_eq!(summary.timed_out, 1);
        // The retry went to worker 1; worker 0 is still busy with the original
        assert_eq!(summary.dispatched, 1);
        assert_eq!(h.scheduler.pool().idle_count(), 0);

        release.send(()).unwrap();
        release.send(()).unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.pool().idle_count() == 2));

        // Exactly one block landed
        assert_eq!(h.channels[0].headroom_frames(), 1000);
        assert_eq!(h.channels[0].atomics().written_frames(), 1000);
        assert!(drain(&h.events)
            .iter()
            .any(|e| matches!(e, PipelineEvent::ResultDiscarded { job: JobId(0), .. })));

        h.scheduler.shutdown();
    }

    #[test]
    fn test_stop_all_processing() {
        let (mut h, release) = gated(gated_config(1, 1));

        h.scheduler.tick().unwrap();
        h.scheduler.stop_all_processing();
        assert_eq!(h.scheduler.in_flight_jobs(), 0);
        assert_eq!(h.scheduler.outstanding_for(ChannelId(0)), None);

        release.send(()).unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.pool().idle_count() == 1));
        assert_eq!(h.channels[0].headroom_frames(), 0);

        h.scheduler.shutdown();
    }

    #[test]
    fn test_telemetry_becomes_events() {
        let mut h = harness(gated_config(1, 1), engine_factory(|_| SilenceEngine));
        drain(&h.events);

        h.telemetry.report(RtTelemetry::Underrun {
            channel: ChannelId(0),
            frames: 64,
        });
        h.telemetry.report(RtTelemetry::Contended {
            channel: ChannelId(0),
            frames: 32,
        });
        assert_eq!(h.scheduler.drain_telemetry(), 2);

        assert_eq!(
            drain(&h.events),
            vec![
                PipelineEvent::Underrun {
                    channel: ChannelId(0),
                    frames: 64
                },
                PipelineEvent::RingContended {
                    channel: ChannelId(0),
                    frames: 32
                },
            ]
        );

        h.scheduler.shutdown();
    }

    #[test]
    fn test_unrecognized_message_is_ignored() {
        let mut h = harness(gated_config(1, 1), engine_factory(|_| SilenceEngine));
        drain(&h.events);

        h.scheduler.handle_message(WorkerMessage::Unrecognized).unwrap();
        assert_eq!(
            drain(&h.events),
            vec![PipelineEvent::UnrecognizedMessage { tag: "unrecognized" }]
        );

        h.scheduler.shutdown();
    }

    /// Park a job at `start_frame` on worker 0 as if it had been dispatched
    fn in_flight_at(h: &mut Harness, id: JobId, start_frame: u64, frames: u32) {
        let job = RenderJob::new(id, ChannelId(0), BlockRange::new(start_frame, frames), RenderParams::default());
        h.scheduler.slots[0].outstanding = Some(id);
        h.scheduler.in_flight.insert(
            id,
            InFlight {
                job,
                worker: WorkerId(0),
                dispatched_at: Instant::now(),
                epoch: h.gate.epoch(),
            },
        );
    }

    #[test]
    fn test_strict_overflow_leaves_ring_unchanged() {
        let config = gated_config(1, 1).with_overflow_policy(OverflowPolicy::Strict);
        let mut h = harness(config, engine_factory(|_| SilenceEngine));
        h.channels[0].with_ring(|r| r.write(&[0.25; 3500]).unwrap());
        in_flight_at(&mut h, JobId(42), 3500, 1000);

        let result = h
            .scheduler
            .on_result(RenderResult::ok(WorkerId(0), JobId(42), ChannelId(0), vec![0.5; 1000]));
        match result {
            Err(PipelineError::Overflow { channel, job, source }) => {
                assert_eq!(channel, ChannelId(0));
                assert_eq!(job, JobId(42));
                assert_eq!(source, OverflowError { requested: 1000, available: 500 });
            }
            other => panic!("expected overflow, got {:?}", other),
        }

        assert_eq!(h.channels[0].headroom_frames(), 3500);
        assert_eq!(h.channels[0].with_ring(|r| r.write_cursor()), 3500);
        assert_eq!(h.channels[0].atomics().written_frames(), 0);
        // The channel is free for a correctly sized job
        assert_eq!(h.scheduler.outstanding_for(ChannelId(0)), None);

        h.scheduler.shutdown();
    }

    #[test]
    fn test_clamp_overflow_keeps_what_fits() {
        let config = gated_config(1, 1).with_overflow_policy(OverflowPolicy::Clamp);
        let mut h = harness(config, engine_factory(|_| SilenceEngine));
        h.channels[0].with_ring(|r| r.write(&[0.25; 3500]).unwrap());
        in_flight_at(&mut h, JobId(42), 3500, 1000);

        h.scheduler
            .on_result(RenderResult::ok(WorkerId(0), JobId(42), ChannelId(0), vec![0.5; 1000]))
            .unwrap();

        assert_eq!(h.channels[0].headroom_frames(), 4000);
        assert_eq!(h.channels[0].with_ring(|r| r.write_cursor()), 4000);
        assert_eq!(h.channels[0].atomics().written_frames(), 500);

        let mut out = vec![0.0; 4000];
        h.channels[0].with_ring(|r| r.read(4000, &mut out));
        assert!(out[..3500].iter().all(|&s| s == 0.25));
        assert!(out[3500..].iter().all(|&s| s == 0.5));

        h.scheduler.shutdown();
    }

    #[test]
    fn test_lost_worker_fails_only_its_own_job() {
        let (mut h, release) = gated(gated_config(2, 1).with_job_timeout(Duration::from_millis(20)));

        h.scheduler.tick().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        // Job 0 times out on worker 0 and its retry goes to worker 1
        assert_eq!(h.scheduler.tick().unwrap().dispatched, 1);
        drain(&h.events);

        // Worker 0 still holds job 0, but it is worker 1's now
        h.scheduler
            .handle_message(WorkerMessage::WorkerStopped { worker_id: WorkerId(0) })
            .unwrap();
        assert_eq!(h.scheduler.in_flight_jobs(), 1);
        assert!(!drain(&h.events)
            .iter()
            .any(|e| matches!(e, PipelineEvent::JobRetried { .. } | PipelineEvent::RenderFailure { .. })));

        release.send(()).unwrap();
        release.send(()).unwrap();
        assert!(pump_until(&mut h.scheduler, |s| s.in_flight_jobs() == 0));
        assert_eq!(h.channels[0].headroom_frames(), 1000);

        h.scheduler.shutdown();
    }
}
