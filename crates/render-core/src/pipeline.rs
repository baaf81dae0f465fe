//! Long-lived pipeline context
//!
//! [`RenderPipeline::initialize`] builds everything the pipeline needs: the
//! channels and their rings, the worker pool, the device gate, the event bus
//! and the telemetry queue. It hands back the context (kept by the control
//! collaborator) and the [`RealtimeOutputDriver`] (moved into the audio
//! callback). Nothing lives in globals; dropping or shutting down the
//! context tears the workers down.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::channel::Channel;
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::events::{EventBus, PipelineEvent};
use crate::output::{telemetry_channel, DeviceGate, DeviceState, RealtimeOutputDriver};
use crate::protocol::RenderParams;
use crate::scheduler::{Scheduler, TickSummary, WorkerPool};
use crate::types::{ChannelId, Sample};
use crate::worker::EngineFactory;

/// Point-in-time counters for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub channel: ChannelId,
    pub headroom_frames: usize,
    /// Read cursor as of the last output callback
    pub playhead_frames: u64,
    pub written_frames: u64,
    pub underrun_frames: u64,
    pub contended_frames: u64,
    pub render_failures: u64,
}

/// The render pipeline's control-side context
pub struct RenderPipeline {
    config: PipelineConfig,
    channels: Vec<Arc<Channel>>,
    gate: Arc<DeviceGate>,
    bus: EventBus,
    scheduler: Scheduler,
}

impl RenderPipeline {
    /// Validate `config`, bootstrap every worker and wire up the channels
    ///
    /// Returns only after every worker acknowledged `init`. The device gate
    /// starts in [`DeviceState::Running`].
    pub fn initialize(
        config: PipelineConfig,
        bootstrap: impl Into<Arc<[u8]>>,
        factory: EngineFactory,
    ) -> PipelineResult<(Self, RealtimeOutputDriver)> {
        config.validate()?;
        log::info!(
            "Initializing render pipeline: {} workers, {} channels, {}Hz, render-ahead {}s, look-back {}s",
            config.worker_count,
            config.channel_count,
            config.sample_rate,
            config.timings.render_ahead_seconds,
            config.timings.lookback_seconds()
        );

        let bus = EventBus::default();
        let pool = WorkerPool::initialize(&config, bootstrap.into(), &factory, &bus.publisher())?;

        let channels: Vec<Arc<Channel>> = (0..config.channel_count)
            .map(|n| {
                Arc::new(Channel::new(ChannelId(n), config.sample_rate, &config.timings))
            })
            .collect();
        let gate = Arc::new(DeviceGate::new(DeviceState::Running));
        let (producer, receiver) = telemetry_channel(config.telemetry_capacity);

        let driver = RealtimeOutputDriver::new(channels.clone(), gate.clone(), producer);
        let scheduler = Scheduler::new(
            &config,
            pool,
            channels.clone(),
            gate.clone(),
            bus.publisher(),
            receiver,
        );

        Ok((
            Self {
                config,
                channels,
                gate,
                bus,
                scheduler,
            },
            driver,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Arc<Channel>> {
        self.channels.get(id.index())
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Receiver for runtime events (underruns, saturation, render failures...)
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.bus.subscribe()
    }

    /// Admit and dispatch jobs; see [`Scheduler::tick`]
    pub fn tick(&mut self) -> PipelineResult<TickSummary> {
        self.scheduler.tick()
    }

    /// Handle worker messages for up to `timeout`; see [`Scheduler::pump`]
    pub fn pump(&mut self, timeout: Duration) -> PipelineResult<usize> {
        self.scheduler.pump(timeout)
    }

    /// One control-loop iteration: `tick`, then `pump` for up to `poll`
    pub fn step(&mut self, poll: Duration) -> PipelineResult<TickSummary> {
        let summary = self.tick()?;
        self.pump(poll)?;
        Ok(summary)
    }

    pub fn device_state(&self) -> DeviceState {
        self.gate.state()
    }

    /// Resume output and job dispatch
    pub fn start(&mut self) {
        let previous = self.gate.start();
        if previous != DeviceState::Running {
            log::info!("Device started (was {:?})", previous);
        }
        self.scheduler.dispatch();
    }

    /// Pause output; in-flight results will be discarded
    pub fn suspend(&mut self) {
        let previous = self.gate.suspend();
        log::info!("Device suspended (was {:?})", previous);
    }

    /// Stop output and drop all pending work
    pub fn stop(&mut self) {
        let previous = self.gate.stop();
        log::info!("Device stopped (was {:?})", previous);
        self.scheduler.stop_all_processing();
    }

    /// Drop pending work without touching the device state
    pub fn stop_all_processing(&mut self) {
        self.scheduler.stop_all_processing();
    }

    /// Parameters for jobs created from now on
    pub fn set_render_params(&mut self, params: RenderParams) {
        self.scheduler.set_render_params(params);
    }

    /// Copy already-played audio from `channel`, `delay` frames behind playback
    ///
    /// Returns `false` if the channel doesn't exist or the span is no longer
    /// (or not yet) in the ring.
    pub fn read_history(&self, channel: ChannelId, delay: usize, out: &mut [Sample]) -> bool {
        self.channel(channel)
            .map(|c| c.with_ring(|ring| ring.read_history(delay, out)))
            .unwrap_or(false)
    }

    /// Counters for every channel
    pub fn stats(&self) -> Vec<ChannelStats> {
        self.channels
            .iter()
            .map(|channel| {
                let atomics = channel.atomics();
                ChannelStats {
                    channel: channel.id(),
                    headroom_frames: channel.headroom_frames(),
                    playhead_frames: atomics.playhead_frames(),
                    written_frames: atomics.written_frames(),
                    underrun_frames: atomics.underrun_frames(),
                    contended_frames: atomics.contended_frames(),
                    render_failures: atomics.render_failures(),
                }
            })
            .collect()
    }

    /// Playback position of one channel in seconds
    pub fn playhead_seconds(&self, channel: ChannelId) -> Option<f64> {
        self.channel(channel).map(|c| c.playhead_seconds())
    }

    /// Stop the device and join every worker
    pub fn shutdown(mut self) {
        self.gate.stop();
        self.scheduler.shutdown();
        log::info!("Render pipeline shut down");
    }
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("channels", &self.channels.len())
            .field("device", &self.gate.state())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
