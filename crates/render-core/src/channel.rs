//! Output channels shared between the control context and the output driver
//!
//! A [`Channel`] pairs a [`CircularAudioBuffer`] with lock-free counters.
//! The ring sits behind a mutex, but the two sides use it differently:
//!
//! - **Control context** (the only writer): [`Channel::with_ring`] takes the
//!   lock. Holding it costs at most one block copy.
//! - **Real-time context** (the only reader): [`Channel::try_with_ring`] never
//!   waits. If the writer holds the lock the callback treats the ring as
//!   unavailable and plays silence for that cycle.
//!
//! The counters in [`ChannelAtomics`] are written by whichever side observes
//! the event and can be read from any thread without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

use crate::config::BufferTimings;
use crate::ring::CircularAudioBuffer;
use crate::types::ChannelId;

/// Lock-free per-channel counters
#[derive(Debug, Default)]
pub struct ChannelAtomics {
    /// Total frames zero-filled because rendering fell behind playback
    pub underrun_frames: AtomicU64,
    /// Total frames of silence played because the ring was locked by the writer
    pub contended_frames: AtomicU64,
    /// Total frames written into the ring by the scheduler (including substituted silence)
    pub written_frames: AtomicU64,
    /// Jobs that failed twice and were replaced by silence
    pub render_failures: AtomicU64,
    /// Read cursor after the last callback: the frame the device plays next
    pub playhead_frames: AtomicU64,
}

impl ChannelAtomics {
    #[inline]
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn contended_frames(&self) -> u64 {
        self.contended_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn written_frames(&self) -> u64 {
        self.written_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn render_failures(&self) -> u64 {
        self.render_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn playhead_frames(&self) -> u64 {
        self.playhead_frames.load(Ordering::Acquire)
    }
}

/// One output audio channel
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    sample_rate: u32,
    ring: Mutex<CircularAudioBuffer>,
    atomics: ChannelAtomics,
}

impl Channel {
    /// Create a channel whose ring holds the whole retention window
    pub fn new(id: ChannelId, sample_rate: u32, timings: &BufferTimings) -> Self {
        let capacity = timings.capacity_frames(sample_rate) as usize;
        Self {
            id,
            sample_rate,
            ring: Mutex::new(CircularAudioBuffer::new(capacity)),
            atomics: ChannelAtomics::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn atomics(&self) -> &ChannelAtomics {
        &self.atomics
    }

    /// Playback position in seconds, from the last output callback
    pub fn playhead_seconds(&self) -> f64 {
        self.atomics.playhead_frames() as f64 / self.sample_rate as f64
    }

    /// Run `f` with exclusive access to the ring (control context)
    ///
    /// A poisoned lock is recovered: the ring upholds its invariants between
    /// method calls, so a panic elsewhere can't leave it inconsistent.
    pub fn with_ring<R>(&self, f: impl FnOnce(&mut CircularAudioBuffer) -> R) -> R {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut ring)
    }

    /// Run `f` with the ring if it is free right now (real-time context)
    ///
    /// Returns `None` without waiting when the writer holds the lock. A
    /// poisoned lock also counts as unavailable here.
    pub fn try_with_ring<R>(&self, f: impl FnOnce(&mut CircularAudioBuffer) -> R) -> Option<R> {
        match self.ring.try_lock() {
            Ok(mut ring) => Some(f(&mut ring)),
            Err(TryLockError::Poisoned(_)) | Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Current headroom in frames
    pub fn headroom_frames(&self) -> usize {
        self.with_ring(|ring| ring.headroom_frames())
    }
}
