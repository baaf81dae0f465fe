//! Device-callback consumer of the channel rings

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::gate::DeviceGate;
use super::telemetry::{RtTelemetry, TelemetryProducer};
use crate::channel::Channel;
use crate::types::{Sample, MAX_CALLBACK_FRAMES};

/// Something an audio host calls on its fixed callback cadence
pub trait OutputProcessor: Send {
    /// Fill `output`, interleaved with `channels` samples per frame
    fn process(&mut self, output: &mut [Sample], channels: usize);
}

/// Pulls rendered frames out of the channel rings for the audio device
///
/// Owned by the real-time context. Every method is bounded-time and
/// allocation-free; scratch space is allocated in [`new`](Self::new).
pub struct RealtimeOutputDriver {
    channels: Vec<Arc<Channel>>,
    gate: Arc<DeviceGate>,
    telemetry: TelemetryProducer,
    /// One planar scratch buffer per channel, `MAX_CALLBACK_FRAMES` long
    scratch: Vec<Box<[Sample]>>,
}

impl RealtimeOutputDriver {
    pub fn new(channels: Vec<Arc<Channel>>, gate: Arc<DeviceGate>, telemetry: TelemetryProducer) -> Self {
        let scratch = channels
            .iter()
            .map(|_| vec![0.0; MAX_CALLBACK_FRAMES].into_boxed_slice())
            .collect();
        Self {
            channels,
            gate,
            telemetry,
            scratch,
        }
    }

    /// Number of pipeline channels this driver reads
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Fill one planar slice per device channel
    ///
    /// Slice `c` gets pipeline channel `c`. Slices beyond the pipeline's
    /// channels are silent, and pipeline channels without a slice are still
    /// read (and discarded) so every ring advances at the same rate. The
    /// frame count is the shortest slice; longer slices are zero-padded.
    pub fn render_planar(&mut self, outputs: &mut [&mut [Sample]]) {
        let n = outputs.iter().map(|o| o.len()).min().unwrap_or(0);

        for (index, out) in outputs.iter_mut().enumerate() {
            let (head, tail) = out.split_at_mut(n);
            match self.channels.get(index) {
                Some(channel) => Self::pull(channel, &self.gate, &mut self.telemetry, head),
                None => head.fill(0.0),
            }
            tail.fill(0.0);
        }

        for index in outputs.len()..self.channels.len() {
            let mut done = 0;
            while done < n {
                let chunk = (n - done).min(MAX_CALLBACK_FRAMES);
                let scratch = &mut self.scratch[index][..chunk];
                Self::pull(&self.channels[index], &self.gate, &mut self.telemetry, scratch);
                done += chunk;
            }
        }
    }

    /// Fill an interleaved device buffer
    ///
    /// Pipeline channel `c` maps to device channel `c`. Device channels beyond
    /// the pipeline's are silent.
    pub fn render_interleaved(&mut self, output: &mut [Sample], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        let total_frames = output.len() / device_channels;
        let mut frame_offset = 0;

        while frame_offset < total_frames {
            let n = (total_frames - frame_offset).min(MAX_CALLBACK_FRAMES);

            for index in 0..self.channels.len() {
                let scratch = &mut self.scratch[index][..n];
                Self::pull(&self.channels[index], &self.gate, &mut self.telemetry, scratch);
            }

            let block = &mut output[frame_offset * device_channels..(frame_offset + n) * device_channels];
            for (i, frame) in block.chunks_mut(device_channels).enumerate() {
                for (c, sample) in frame.iter_mut().enumerate() {
                    *sample = match self.scratch.get(c) {
                        Some(channel) => channel[i],
                        None => 0.0,
                    };
                }
            }

            frame_offset += n;
        }

        // Trailing partial frame, if the host handed us one
        output[total_frames * device_channels..].fill(0.0);
    }

    /// Read `out.len()` frames from one channel, degrading to silence
    ///
    /// Rendered frames are clamped to [-1, 1] before they reach the device,
    /// and the channel's playhead is published after every successful read.
    #[inline]
    fn pull(channel: &Channel, gate: &DeviceGate, telemetry: &mut TelemetryProducer, out: &mut [Sample]) {
        if !gate.is_running() {
            out.fill(0.0);
            return;
        }

        let frames = out.len();
        match channel.try_with_ring(|ring| (ring.read(frames, out), ring.read_cursor())) {
            Some((outcome, playhead)) => {
                for sample in &mut out[..outcome.copied] {
                    *sample = sample.clamp(-1.0, 1.0);
                }
                let atomics = channel.atomics();
                atomics.playhead_frames.store(playhead, Ordering::Release);
                if outcome.underrun > 0 {
                    atomics
                        .underrun_frames
                        .fetch_add(outcome.underrun as u64, Ordering::Relaxed);
                    telemetry.report(RtTelemetry::Underrun {
                        channel: channel.id(),
                        frames: outcome.underrun as u32,
                    });
                }
            }
            None => {
                out.fill(0.0);
                channel
                    .atomics()
                    .contended_frames
                    .fetch_add(frames as u64, Ordering::Relaxed);
                telemetry.report(RtTelemetry::Contended {
                    channel: channel.id(),
                    frames: frames as u32,
                });
            }
        }
    }
}

impl OutputProcessor for RealtimeOutputDriver {
    fn process(&mut self, output: &mut [Sample], channels: usize) {
        self.render_interleaved(output, channels);
    }
}
