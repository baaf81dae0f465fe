//! Render Core - Worker-pool block renderer for a real-time audio callback
//!
//! A pool of independently bootstrapped render engines produces audio blocks
//! ahead of playback. Results land in one circular buffer per channel, which
//! the device callback drains without ever waiting on the workers.
//!
//! - [`pipeline`]: the long-lived context and its lifecycle
//! - [`scheduler`]: job admission, dispatch, retry and timeouts
//! - [`worker`]: worker threads and the engine interface they host
//! - [`output`]: the real-time side (driver, device gate, telemetry)
//! - [`ring`]: circular sample storage with render-ahead and history
//! - [`audio`]: sound card output through CPAL (`cpal-output` feature)

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod output;
pub mod pipeline;
pub mod protocol;
pub mod ring;
pub mod scheduler;
pub mod types;
pub mod worker;

#[cfg(feature = "cpal-output")]
pub mod audio;

pub use error::{PipelineError, PipelineResult};
pub use events::PipelineEvent;
pub use output::{DeviceState, OutputProcessor, RealtimeOutputDriver};
pub use pipeline::{ChannelStats, RenderPipeline};
pub use types::*;
