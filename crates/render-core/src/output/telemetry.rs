//! Wait-free telemetry from the device callback to the control context
//!
//! The `rtrb` ringbuffer is fixed-size and allocated at startup; `push` and
//! `pop` are O(1) and never block. If the control context stops draining,
//! records are counted as dropped instead of waiting for space.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::ChannelId;

/// A record produced on the real-time path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtTelemetry {
    /// Rendering fell behind: `frames` of silence were substituted
    Underrun { channel: ChannelId, frames: u32 },
    /// The ring was locked by the writer: `frames` of silence were played
    Contended { channel: ChannelId, frames: u32 },
}

/// Real-time side of the telemetry queue
pub struct TelemetryProducer {
    producer: rtrb::Producer<RtTelemetry>,
    dropped: Arc<AtomicU64>,
}

impl TelemetryProducer {
    /// Queue a record (wait-free, no allocation)
    #[inline]
    pub fn report(&mut self, record: RtTelemetry) {
        if self.producer.push(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Control-context side of the telemetry queue
pub struct TelemetryReceiver {
    consumer: rtrb::Consumer<RtTelemetry>,
    dropped: Arc<AtomicU64>,
    dropped_seen: u64,
}

impl TelemetryReceiver {
    /// Pop every queued record, returning how many were handled
    pub fn drain(&mut self, mut handle: impl FnMut(RtTelemetry)) -> usize {
        let mut count = 0;
        while let Ok(record) = self.consumer.pop() {
            handle(record);
            count += 1;
        }
        count
    }

    /// Records dropped since the previous call
    pub fn take_dropped(&mut self) -> u64 {
        let total = self.dropped.load(Ordering::Relaxed);
        let fresh = total - self.dropped_seen;
        self.dropped_seen = total;
        fresh
    }
}

/// Create a telemetry queue with room for `capacity` records
pub fn telemetry_channel(capacity: usize) -> (TelemetryProducer, TelemetryReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        TelemetryProducer {
            producer,
            dropped: dropped.clone(),
        },
        TelemetryReceiver {
            consumer,
            dropped,
            dropped_seen: 0,
        },
    )
}
