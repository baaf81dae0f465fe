//! Ring buffer error types

use thiserror::Error;

/// A write would push unread frames out of the ring
///
/// This is a scheduling bug, not a runtime condition: the writer must check
/// [`headroom_frames`](super::CircularAudioBuffer::headroom_frames) before
/// writing. The ring's cursors are untouched when this is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("ring overflow: tried to write {requested} frames with only {available} free")]
pub struct OverflowError {
    /// Frames the caller tried to write
    pub requested: usize,
    /// Frames that could have been written without overwriting unread data
    pub available: usize,
}
