//! Sound card output through CPAL (`cpal-output` feature)
//!
//! Opens an output device at the pipeline's sample rate and hands the
//! device callback to an [`OutputProcessor`](crate::output::OutputProcessor),
//! normally the pipeline's
//! [`RealtimeOutputDriver`](crate::output::RealtimeOutputDriver).
//!
//! # Example Usage
//!
//! ```ignore
//! use render_core::audio::{start_output, AudioConfig};
//!
//! let (mut pipeline, driver) = RenderPipeline::initialize(config, bootstrap, factory)?;
//! let handle = start_output(&AudioConfig::default(), pipeline.config().sample_rate, driver)?;
//!
//! loop {
//!     pipeline.step(Duration::from_millis(5))?;
//! }
//! ```

mod config;
mod device;
mod error;
mod stream;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use device::{default_output_device, find_device_by_id, list_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
pub use stream::{start_output, OutputHandle};
