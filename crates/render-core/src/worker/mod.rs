//! Worker render units
//!
//! Each worker runs on its own thread and exclusively owns one
//! [`RenderEngine`] instance. The coordinator talks to it only through
//! messages:
//!
//! ```text
//! ┌──────────────────┐   HostMessage (per-worker)   ┌──────────────────┐
//! │  Control context │ ───────────────────────────► │  Worker thread   │
//! │  (WorkerHandle)  │                              │  (owns engine)   │
//! │                  │ ◄─────────────────────────── │                  │
//! └──────────────────┘  WorkerMessage (shared       └──────────────────┘
//!                        completion channel)
//! ```
//!
//! A job is rendered in engine-quantum sub-blocks (`block_size` frames from
//! `init`), so a long job is a run of consecutive engine blocks.

mod engine;
mod handle;
mod thread;

pub use engine::{
    engine_factory, EngineError, EngineFactory, EngineSetup, RenderEngine, SilenceEngine, ToneEngine,
};
pub use handle::{WorkerHandle, WorkerState};
