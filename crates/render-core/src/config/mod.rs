//! Pipeline configuration
//!
//! - [`PipelineConfig`]: worker count, channel layout, buffer timings and
//!   scheduler limits, serializable to YAML
//! - Generic YAML config loading/saving
//! - Default config location
//!
//! # Usage
//!
//! ```ignore
//! use render_core::config::{default_config_path, PipelineConfig};
//!
//! // Falls back to defaults if the file is missing, malformed or invalid
//! let config = PipelineConfig::load(&default_config_path("pipeline.yaml"));
//! ```

mod io;
mod paths;
mod pipeline;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use pipeline::{BufferTimings, ConfigError, OverflowPolicy, PipelineConfig};
