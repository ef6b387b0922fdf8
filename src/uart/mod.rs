//! # UART link protocol
//!
//! Two binary layers ride on the single write/notify pipe of an Amber device:
//!
//! ```text
//! notification:  [header][frame][frame]...
//! frame:         [length=4][opcode_lo][opcode_hi][channel][value]
//! ```
//!
//! - [`serial`] adds and strips the one-byte header.
//! - [`frame`] encodes and decodes the fixed 5-byte application frames.
//! - [`coalescer`] turns channel writes into debounced frame batches and
//!   reconciles them with the state the device reports back.

pub mod coalescer;
pub mod frame;
pub mod serial;

pub use coalescer::{CommandCoalescer, CHANNEL_COUNT};
pub use frame::Frame;
pub use serial::SerialChannel;
