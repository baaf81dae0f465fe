//! Worker pool and job scheduling
//!
//! The [`Scheduler`] runs on the control context. Each [`tick`](Scheduler::tick)
//! compares every channel's headroom with the render-ahead target and admits
//! at most one job per channel into a bounded FIFO [`JobQueue`]. Idle workers
//! take jobs from the head of the queue. Results come back on the pool's
//! shared completion channel and are written into the rings by
//! [`pump`](Scheduler::pump).
//!
//! ```text
//!   tick()                    dispatch()                 pump()
//!  headroom < target ──► JobQueue ──► idle WorkerHandle ──► worker thread
//!                           ▲                                    │
//!                           └── retry (once, other worker) ◄─────┤ Failed
//!                                                                │ Ok
//!                                      Channel ring ◄── write ◄──┘
//! ```
//!
//! One job per channel at a time is what keeps results in block order: the
//! next job for a channel always starts at the ring's current write cursor.

mod coordinator;
mod pool;
mod queue;

pub use coordinator::{Scheduler, TickSummary};
pub use pool::WorkerPool;
pub use queue::JobQueue;
