//! Fixed-capacity ring of rendered samples for one output channel

use super::error::OverflowError;
use crate::types::Sample;

/// What a [`CircularAudioBuffer::read`] call delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Frames copied from rendered data
    pub copied: usize,
    /// Frames zero-filled because rendering had not caught up
    pub underrun: usize,
}

impl ReadOutcome {
    #[inline]
    pub fn is_underrun(&self) -> bool {
        self.underrun > 0
    }
}

/// Single-writer / single-reader ring of mono samples
///
/// Invariants, upheld by every method:
/// - `read_cursor <= write_cursor`
/// - `write_cursor - read_cursor <= capacity`
///
/// No method allocates after construction.
#[derive(Debug, Clone)]
pub struct CircularAudioBuffer {
    samples: Box<[Sample]>,
    write_cursor: u64,
    read_cursor: u64,
}

impl CircularAudioBuffer {
    /// Create a ring holding `capacity` frames (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)].into_boxed_slice(),
            write_cursor: 0,
            read_cursor: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Logical index of the next frame to be written
    #[inline]
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    /// Logical index of the next frame to be played
    #[inline]
    pub fn read_cursor(&self) -> u64 {
        self.read_cursor
    }

    /// Rendered frames not yet read
    #[inline]
    pub fn headroom_frames(&self) -> usize {
        (self.write_cursor - self.read_cursor) as usize
    }

    /// Frames that can be written without overwriting unread data
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.capacity() - self.headroom_frames()
    }

    /// Already-played frames still present in the ring
    pub fn retained_history(&self) -> usize {
        let oldest = self.write_cursor.saturating_sub(self.capacity() as u64);
        (self.read_cursor - oldest.min(self.read_cursor)) as usize
    }

    /// Append `frames` at the write cursor
    ///
    /// Fails without touching the cursors if the frames don't fit in
    /// [`free_frames`](Self::free_frames).
    pub fn write(&mut self, frames: &[Sample]) -> Result<(), OverflowError> {
        self.check_fits(frames.len())?;
        self.copy_in(self.write_cursor, frames);
        self.write_cursor += frames.len() as u64;
        Ok(())
    }

    /// Append `count` frames of silence at the write cursor
    pub fn write_silence(&mut self, count: usize) -> Result<(), OverflowError> {
        self.check_fits(count)?;
        self.zero_range(self.write_cursor, count);
        self.write_cursor += count as u64;
        Ok(())
    }

    /// Append as many of `frames` as fit, returning how many were written
    pub fn write_clamped(&mut self, frames: &[Sample]) -> usize {
        let n = frames.len().min(self.free_frames());
        self.copy_in(self.write_cursor, &frames[..n]);
        self.write_cursor += n as u64;
        n
    }

    /// Copy up to `count` frames into `out`, zero-filling whatever is missing
    ///
    /// `count` is clamped to `out.len()`. The read cursor advances only by the
    /// frames actually copied, so an underrun never skips rendered audio.
    pub fn read(&mut self, count: usize, out: &mut [Sample]) -> ReadOutcome {
        let count = count.min(out.len());
        let copied = count.min(self.headroom_frames());

        self.copy_out(self.read_cursor, &mut out[..copied]);
        out[copied..count].fill(0.0);
        self.read_cursor += copied as u64;

        ReadOutcome {
            copied,
            underrun: count - copied,
        }
    }

    /// Copy frames starting `delay` frames before the read cursor into `out`
    ///
    /// Returns `false` (leaving `out` untouched) when the requested span has
    /// already been overwritten or reaches past the write cursor.
    pub fn read_history(&self, delay: usize, out: &mut [Sample]) -> bool {
        let delay = delay as u64;
        if delay > self.read_cursor {
            return false;
        }
        let start = self.read_cursor - delay;
        let oldest = self.write_cursor.saturating_sub(self.capacity() as u64);
        if start < oldest || start + out.len() as u64 > self.write_cursor {
            return false;
        }
        self.copy_out(start, out);
        true
    }

    fn check_fits(&self, requested: usize) -> Result<(), OverflowError> {
        let available = self.free_frames();
        if requested > available {
            return Err(OverflowError {
                requested,
                available,
            });
        }
        Ok(())
    }

    #[inline]
    fn slot(&self, cursor: u64) -> usize {
        (cursor % self.capacity() as u64) as usize
    }

    /// `src.len()` must not exceed capacity
    fn copy_in(&mut self, start: u64, src: &[Sample]) {
        let pos = self.slot(start);
        let first = (self.capacity() - pos).min(src.len());
        self.samples[pos..pos + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        self.samples[..rest].copy_from_slice(&src[first..]);
    }

    fn zero_range(&mut self, start: u64, count: usize) {
        let pos = self.slot(start);
        let first = (self.capacity() - pos).min(count);
        self.samples[pos..pos + first].fill(0.0);
        self.samples[..count - first].fill(0.0);
    }

    fn copy_out(&self, start: u64, dst: &mut [Sample]) {
        let pos = self.slot(start);
        let first = (self.capacity() - pos).min(dst.len());
        dst[..first].copy_from_slice(&self.samples[pos..pos + first]);
        let rest = dst.len() - first;
        dst[first..].copy_from_slice(&self.samples[..rest]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<Sample> {
        (start..start + len).map(|i| i as Sample).collect()
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = CircularAudioBuffer::new(192000);
        assert_eq!(ring.capacity(), 192000);
        assert_eq!(ring.headroom_frames(), 0);
        assert_eq!(ring.free_frames(), 192000);
        assert_eq!(CircularAudioBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn test_roundtrip_across_wraparound() {
        let mut ring = CircularAudioBuffer::new(10);
        let mut out = vec![0.0; 10];
        let mut expected_next = 0usize;
        let mut written = 0usize;

        // Uneven write/read sizes so the cursors wrap at different slots
        for (w, r) in [(7, 5), (6, 4), (5, 9), (8, 3), (2, 6)] {
            ring.write(&ramp(written, w)).unwrap();
            written += w;

            let outcome = ring.read(r, &mut out);
            assert_eq!(outcome.underrun, 0);
            assert_eq!(&out[..r], ramp(expected_next, r).as_slice());
            expected_next += r;
        }
        assert_eq!(ring.read_cursor() as usize, expected_next);
        assert_eq!(ring.write_cursor() as usize, written);
    }

    #[test]
    fn test_overflow_leaves_cursors_unchanged() {
        let mut ring = CircularAudioBuffer::new(8);
        ring.write(&ramp(0, 6)).unwrap();

        let err = ring.write(&ramp(6, 3)).unwrap_err();
        assert_eq!(
            err,
            OverflowError {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(ring.write_cursor(), 6);
        assert_eq!(ring.read_cursor(), 0);
        assert_eq!(ring.headroom_frames(), 6);

        // Exactly filling the ring is allowed
        ring.write(&ramp(6, 2)).unwrap();
        assert_eq!(ring.headroom_frames(), ring.capacity());
        assert!(ring.write_silence(1).is_err());
    }

    #[test]
    fn test_underrun_zero_fills_exact_deficit() {
        let mut ring = CircularAudioBuffer::new(16);
        ring.write(&[1.0, 2.0, 3.0]).unwrap();

        let mut out = vec![9.0; 8];
        let outcome = ring.read(8, &mut out);
        assert_eq!(outcome, ReadOutcome { copied: 3, underrun: 5 });
        assert!(outcome.is_underrun());
        assert_eq!(out, vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(ring.read_cursor(), 3);

        // Nothing left: whole request is silence
        let outcome = ring.read(4, &mut out);
        assert_eq!(outcome, ReadOutcome { copied: 0, underrun: 4 });
        assert_eq!(ring.read_cursor(), 3);
    }

    #[test]
    fn test_read_count_clamped_to_output() {
        let mut ring = CircularAudioBuffer::new(16);
        ring.write(&ramp(0, 10)).unwrap();
        let mut out = vec![0.0; 4];
        let outcome = ring.read(10, &mut out);
        assert_eq!(outcome, ReadOutcome { copied: 4, underrun: 0 });
        assert_eq!(ring.headroom_frames(), 6);
    }

    #[test]
    fn test_write_silence_and_clamped() {
        let mut ring = CircularAudioBuffer::new(6);
        ring.write(&[5.0, 5.0]).unwrap();
        ring.write_silence(2).unwrap();
        assert_eq!(ring.write_clamped(&[7.0, 7.0, 7.0, 7.0]), 2);
        assert_eq!(ring.headroom_frames(), 6);

        let mut out = vec![1.0; 6];
        ring.read(6, &mut out);
        assert_eq!(out, vec![5.0, 5.0, 0.0, 0.0, 7.0, 7.0]);
    }

    #[test]
    fn test_history_lookback() {
        let mut ring = CircularAudioBuffer::new(8);
        let mut scratch = vec![0.0; 8];
        ring.write(&ramp(0, 8)).unwrap();
        ring.read(5, &mut scratch);
        // Unread: 5,6,7. History: 0..5 (write cursor hasn't lapped yet)
        assert_eq!(ring.retained_history(), 5);

        let mut out = vec![0.0; 3];
        assert!(ring.read_history(5, &mut out));
        assert_eq!(out, vec![0.0, 1.0, 2.0]);

        // Writing 3 more frames reuses the slots of frames 0..3
        ring.write(&ramp(8, 3)).unwrap();
        assert_eq!(ring.retained_history(), 2);
        assert!(!ring.read_history(5, &mut out));
        let mut two = vec![0.0; 2];
        assert!(ring.read_history(2, &mut two));
        assert_eq!(two, vec![3.0, 4.0]);

        // Can't look further back than the start of time
        assert!(!ring.read_history(100, &mut two));
    }

    #[test]
    fn test_history_cannot_read_past_write_cursor() {
        let mut ring = CircularAudioBuffer::new(8);
        let mut scratch = vec![0.0; 8];
        ring.write(&ramp(0, 4)).unwrap();
        ring.read(4, &mut scratch);
        let mut out = vec![0.0; 6];
        assert!(!ring.read_history(2, &mut out));
    }

    #[test]
    fn test_headroom_never_exceeds_capacity() {
        let mut ring = CircularAudioBuffer::new(32);
        let mut out = vec![0.0; 32];
        for step in 0..200usize {
            let w = (step * 7) % 13;
            let _ = ring.write(&ramp(0, w));
            assert!(ring.headroom_frames() <= ring.capacity());
            assert!(ring.read_cursor() <= ring.write_cursor());
            ring.read((step * 5) % 11, &mut out);
        }
    }
}
