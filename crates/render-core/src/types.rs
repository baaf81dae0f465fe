//! Common types for the render pipeline
//!
//! Identifiers shared between the control context, the worker render units
//! and the real-time output driver.

use serde::{Deserialize, Serialize};

/// Default sample rate (48kHz - standard professional audio rate)
pub const SAMPLE_RATE: u32 = 48000;

/// Default engine block quantum in frames
pub const DEFAULT_BLOCK_SIZE: u32 = 128;

/// Largest frame count the output driver handles in one pass
///
/// Scratch buffers are allocated to this size up front; larger callbacks are
/// processed in several passes.
pub const MAX_CALLBACK_FRAMES: usize = 8192;

/// Audio sample type (32-bit float, one channel)
pub type Sample = f32;

/// Output channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

/// Worker render unit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

/// Render job identifier, unique for the lifetime of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl ChannelId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl WorkerId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel {}", self.0)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker {}", self.0)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job #{}", self.0)
    }
}

/// A contiguous span of frames `[start_frame, start_frame + frames)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    /// First logical frame of the block
    pub start_frame: u64,
    /// Number of frames in the block
    pub frames: u32,
}

impl BlockRange {
    pub fn new(start_frame: u64, frames: u32) -> Self {
        Self { start_frame, frames }
    }

    /// One past the last frame of the block
    #[inline]
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.frames as u64
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Convert a duration in seconds to whole frames at `sample_rate`
#[inline]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * sample_rate as f64).round().max(0.0) as u64
}
