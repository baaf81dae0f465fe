//! Circular sample storage between the render workers and the output callback
//!
//! Each output channel owns one [`CircularAudioBuffer`]. The same ring serves
//! two purposes at once:
//!
//! - **Prefetch**: frames in `[read_cursor, write_cursor)` are rendered but not
//!   yet played. Their count is the channel's *headroom*.
//! - **History**: frames just behind `read_cursor` stay in the ring until a
//!   write reuses their slot, so feedback-style effects can look back.
//!
//! ```text
//!            history            headroom             free
//!   ──────────────────────┬──────────────────┬──────────────────
//!   ... played frames ... │ rendered, unread │ (oldest history)
//!   ──────────────────────┴──────────────────┴──────────────────
//!                    read_cursor        write_cursor
//! ```
//!
//! Cursors are logical frame indices that only ever grow; the physical slot is
//! `cursor % capacity`.

mod circular;
mod error;

pub use circular::{CircularAudioBuffer, ReadOutcome};
pub use error::OverflowError;
