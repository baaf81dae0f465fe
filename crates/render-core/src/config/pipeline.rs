//! Pipeline configuration
//!
//! Defines worker pool sizing, channel layout, ring buffer timings and the
//! scheduler's limits.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::io::load_config;
use crate::types::{seconds_to_frames, DEFAULT_BLOCK_SIZE, SAMPLE_RATE};

/// Default number of worker render units
pub const DEFAULT_WORKER_COUNT: u32 = 2;

/// Default number of output channels (stereo)
pub const DEFAULT_CHANNEL_COUNT: u32 = 2;

/// Default bound on the pending-job queue
pub const DEFAULT_MAX_PENDING_JOBS: usize = 64;

/// How the scheduler reacts to a result that doesn't fit in the ring
///
/// An overflow means the scheduler sized a job wrongly. During development
/// that should surface immediately; in a release build the write is clamped
/// to the free space and the error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Return `PipelineError::Overflow` to the caller, ring unchanged
    Strict,
    /// Write what fits, drop the rest, log an error
    Clamp,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            OverflowPolicy::Strict
        } else {
            OverflowPolicy::Clamp
        }
    }
}

/// Ring buffer timing configuration
///
/// `retention_seconds` must cover the render-ahead window plus however much
/// already-played history feedback effects need. Everything beyond
/// `render_ahead_seconds` is look-back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferTimings {
    /// How far rendering tries to stay ahead of playback
    pub render_ahead_seconds: f64,
    /// Total audio each ring holds (prefetch + history)
    pub retention_seconds: f64,
}

impl Default for BufferTimings {
    fn default() -> Self {
        Self {
            render_ahead_seconds: 1.0,
            retention_seconds: 4.0,
        }
    }
}

impl BufferTimings {
    pub fn new(render_ahead_seconds: f64, retention_seconds: f64) -> Self {
        Self {
            render_ahead_seconds,
            retention_seconds,
        }
    }

    /// Headroom the scheduler tries to maintain, in frames
    pub fn target_frames(&self, sample_rate: u32) -> u64 {
        seconds_to_frames(self.render_ahead_seconds, sample_rate)
    }

    /// Ring capacity, in frames
    pub fn capacity_frames(&self, sample_rate: u32) -> u64 {
        seconds_to_frames(self.retention_seconds, sample_rate)
    }

    /// History available to feedback effects when headroom is at target
    pub fn lookback_seconds(&self) -> f64 {
        (self.retention_seconds - self.render_ahead_seconds).max(0.0)
    }
}

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("worker_count must be at least 1")]
    NoWorkers,

    #[error("channel_count must be at least 1")]
    NoChannels,

    #[error("sample_rate must be non-zero")]
    ZeroSampleRate,

    #[error("block_size must be non-zero")]
    ZeroBlockSize,

    #[error("max_pending_jobs must be at least 1")]
    ZeroQueueBound,

    #[error("render_ahead_seconds must cover at least one frame (got {0})")]
    InvalidRenderAhead(f64),

    #[error("retention ({retention}s) is shorter than the render-ahead window ({render_ahead}s)")]
    RetentionTooShort { retention: f64, render_ahead: f64 },
}

/// Configuration for the render pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker render units
    pub worker_count: u32,
    /// Number of output channels
    pub channel_count: u32,
    /// Sample rate shared by all channels
    pub sample_rate: u32,
    /// Engine quantum in frames; job sizes are rounded to multiples of it
    pub block_size: u32,
    /// Ring buffer timings
    pub timings: BufferTimings,
    /// Pending jobs beyond this bound are refused with `QueueSaturated`
    pub max_pending_jobs: usize,
    /// A job without a result after this long is treated as failed
    pub job_timeout_ms: u64,
    /// How long `initialize` waits for every `worker_init`
    pub init_timeout_ms: u64,
    /// Reaction to a result that would overflow the ring
    pub overflow_policy: OverflowPolicy,
    /// Slots in the real-time telemetry queue
    pub telemetry_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            channel_count: DEFAULT_CHANNEL_COUNT,
            sample_rate: SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            timings: BufferTimings::default(),
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
            job_timeout_ms: 2000,
            init_timeout_ms: 5000,
            overflow_policy: OverflowPolicy::default(),
            telemetry_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    /// Check that the values describe a pipeline that can run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.channel_count == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.max_pending_jobs == 0 {
            return Err(ConfigError::ZeroQueueBound);
        }
        let timings = &self.timings;
        if !(timings.render_ahead_seconds > 0.0) || self.target_frames() == 0 {
            return Err(ConfigError::InvalidRenderAhead(timings.render_ahead_seconds));
        }
        if timings.retention_seconds < timings.render_ahead_seconds {
            return Err(ConfigError::RetentionTooShort {
                retention: timings.retention_seconds,
                render_ahead: timings.render_ahead_seconds,
            });
        }
        Ok(())
    }

    /// Load from YAML, keeping the file's values only if they validate
    ///
    /// A file that parses but describes an unrunnable pipeline is logged and
    /// replaced by the defaults, the same as one that doesn't parse.
    pub fn load(path: &Path) -> Self {
        let config: Self = load_config(path);
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("Ignoring {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    /// Headroom target per channel, in frames
    pub fn target_frames(&self) -> u64 {
        self.timings.target_frames(self.sample_rate)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Set the number of worker render units
    pub fn with_workers(mut self, count: u32) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the number of output channels
    pub fn with_channels(mut self, count: u32) -> Self {
        self.channel_count = count;
        self
    }

    /// Set the sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the engine block quantum
    pub fn with_block_size(mut self, frames: u32) -> Self {
        self.block_size = frames;
        self
    }

    /// Set the ring buffer timings
    pub fn with_timings(mut self, timings: BufferTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Set the pending-job queue bound
    pub fn with_max_pending_jobs(mut self, limit: usize) -> Self {
        self.max_pending_jobs = limit;
        self
    }

    /// Set the per-job deadline
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the worker acknowledgement deadline
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the overflow policy
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_frames(), 48000);
        assert_eq!(config.timings.capacity_frames(config.sample_rate), 192000);
        assert_eq!(config.timings.lookback_seconds(), 3.0);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            PipelineConfig::default().with_workers(0).validate(),
            Err(ConfigError::NoWorkers)
        );
        assert_eq!(
            PipelineConfig::default().with_channels(0).validate(),
            Err(ConfigError::NoChannels)
        );
        assert_eq!(
            PipelineConfig::default().with_block_size(0).validate(),
            Err(ConfigError::ZeroBlockSize)
        );
        assert_eq!(
            PipelineConfig::default().with_max_pending_jobs(0).validate(),
            Err(ConfigError::ZeroQueueBound)
        );
        assert_eq!(
            PipelineConfig::default()
                .with_timings(BufferTimings::new(2.0, 1.0))
                .validate(),
            Err(ConfigError::RetentionTooShort {
                retention: 1.0,
                render_ahead: 2.0
            })
        );
        assert!(matches!(
            PipelineConfig::default()
                .with_timings(BufferTimings::new(0.0, 1.0))
                .validate(),
            Err(ConfigError::InvalidRenderAhead(_))
        ));
        // Positive, but rounds to zero frames at 48 kHz
        assert_eq!(
            PipelineConfig::default()
                .with_timings(BufferTimings::new(1e-6, 1.0))
                .validate(),
            Err(ConfigError::InvalidRenderAhead(1e-6))
        );
        assert!(PipelineConfig::default()
            .with_sample_rate(1_000_000)
            .with_timings(BufferTimings::new(1e-6, 1.0))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_load_rejects_unrunnable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        std::fs::write(&path, "worker_count: 0
channel_count: 6
").unwrap();
        assert_eq!(PipelineConfig::load(&path), PipelineConfig::default());

        std::fs::write(&path, "worker_count: 3
channel_count: 6
").unwrap();
        let config = PipelineConfig::load(&path);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.channel_count, 6);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str("worker_count: 4\ntimings:\n  render_ahead_seconds: 0.5\n").unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.timings.render_ahead_seconds, 0.5);
        assert_eq!(config.timings.retention_seconds, 4.0);
        assert_eq!(config.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn test_timeouts() {
        let config = PipelineConfig::default()
            .with_job_timeout(Duration::from_millis(250))
            .with_init_timeout(Duration::from_secs(1));
        assert_eq!(config.job_timeout(), Duration::from_millis(250));
        assert_eq!(config.init_timeout(), Duration::from_secs(1));
    }
}
