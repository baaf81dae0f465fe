//! Structured events for the observability collaborator
//!
//! Events are notifications, not errors: the pipeline keeps running after
//! any of them. They are published on a bounded [`EventBus`]; when no one
//! drains the bus, new events are dropped instead of blocking the control
//! loop.

use crossbeam::channel::{Receiver, Sender, TrySendError};

use crate::types::{ChannelId, JobId, WorkerId};

/// Runtime events emitted by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A worker acknowledged `init`
    WorkerReady { worker: WorkerId },

    /// A worker left its message loop
    WorkerStopped { worker: WorkerId },

    /// The output callback played silence because rendering fell behind
    Underrun { channel: ChannelId, frames: u64 },

    /// The output callback found the ring locked and played silence
    RingContended { channel: ChannelId, frames: u64 },

    /// The pending-job queue is full; admission paused until it drains
    QueueSaturated { pending: usize, limit: usize },

    /// A job failed once and was re-queued
    JobRetried {
        channel: ChannelId,
        job: JobId,
        failed_worker: WorkerId,
        reason: String,
    },

    /// A job failed twice; its block was replaced by silence
    RenderFailure {
        channel: ChannelId,
        job: JobId,
        frames: u32,
        reason: String,
    },

    /// A result arrived after the device was stopped, or for a job no longer in flight
    ResultDiscarded { channel: ChannelId, job: JobId },

    /// A worker sent a message type this version doesn't handle
    UnrecognizedMessage { tag: &'static str },

    /// Real-time telemetry records were lost because the telemetry queue was full
    TelemetryDropped { count: u64 },
}

/// Event bus for broadcasting pipeline events to subscribers
pub struct EventBus {
    sender: Sender<PipelineEvent>,
    receiver: Receiver<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with bounded capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(capacity);
        Self { sender, receiver }
    }

    /// Get a publisher handle
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }

    /// Get a receiver for subscribing to events
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.receiver.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Non-blocking publishing side of an [`EventBus`]
#[derive(Clone)]
pub struct EventPublisher {
    sender: Sender<PipelineEvent>,
}

impl EventPublisher {
    /// Publish an event, dropping it if the bus is full
    ///
    /// Returns `false` when the event was dropped.
    pub fn publish(&self, event: PipelineEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::debug!("Event bus full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();

        assert!(bus.publisher().publish(PipelineEvent::WorkerReady {
            worker: WorkerId(0),
        }));

        match rx.recv().unwrap() {
            PipelineEvent::WorkerReady { worker } => assert_eq!(worker, WorkerId(0)),
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_full_bus_drops_instead_of_blocking() {
        let bus = EventBus::new(1);
        let publisher = bus.publisher();
        assert!(publisher.publish(PipelineEvent::TelemetryDropped { count: 1 }));
        assert!(!publisher.publish(PipelineEvent::TelemetryDropped { count: 2 }));

        let rx = bus.subscribe();
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::TelemetryDropped { count: 1 });
        assert!(rx.try_recv().is_err());
    }
}
