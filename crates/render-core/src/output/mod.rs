//! Real-time output side of the pipeline
//!
//! The [`RealtimeOutputDriver`] runs inside the audio device callback. It
//! only ever:
//!
//! - checks the [`DeviceGate`] (one atomic load)
//! - tries, without waiting, to lock each channel's ring and copy frames out
//! - zero-fills whatever it couldn't get
//! - pushes `Copy` telemetry records into a wait-free SPSC queue
//!
//! It never allocates, never blocks and never calls the scheduler. The
//! control context drains the telemetry queue and turns it into
//! [`PipelineEvent`](crate::events::PipelineEvent)s.
//!
//! ```text
//! ┌──────────────────┐  ring.write()   ┌──────────────┐  try_lock + read()  ┌───────────────────┐
//! │  Control context │ ──────────────► │   Channel    │ ◄────────────────── │  Device callback  │
//! │   (Scheduler)    │                 │    rings     │                     │ (OutputDriver)    │
//! └──────────────────┘                 └──────────────┘                     └─────────┬─────────┘
//!          ▲                                                                          │
//!          └───────────────── RtTelemetry (rtrb, lock-free SPSC) ◄────────────────────┘
//! ```

mod driver;
mod gate;
mod telemetry;

pub use driver::{OutputProcessor, RealtimeOutputDriver};
pub use gate::{DeviceGate, DeviceState};
pub use telemetry::{telemetry_channel, RtTelemetry, TelemetryProducer, TelemetryReceiver};
