//! Message protocol between the control context and worker render units
//!
//! Workers never share state with the coordinator. Everything crosses a
//! channel as one of two tagged unions:
//!
//! - [`HostMessage`]: coordinator → worker (`init`, `job`, `shutdown`)
//! - [`WorkerMessage`]: worker → coordinator (`worker_init`, `init_error`,
//!   `result`, `worker_stopped`)
//!
//! In-process workers receive the enums directly over crossbeam channels. The
//! same types serialize to JSON with a `type` tag field for workers hosted out
//! of process; see [`encode`] and [`decode_worker_message`].
//!
//! [`RenderJob`] and [`RenderResult`] are the scheduler's view of a unit of
//! work, converted to and from the wire messages at the worker boundary.

mod job;
mod messages;

pub use job::{RenderJob, RenderParams, RenderResult, RenderStatus};
pub use messages::{decode_worker_message, encode, HostMessage, ProtocolError, WorkerMessage};
