//! Per-subscriber streaming loops.
//!
//! Both streamers share the same backpressure discipline: body chunks go
//! through a capacity-1 channel with a bounded `send_timeout`, so a peer that
//! stops draining is dropped within the deadline instead of accumulating
//! seconds of stale data in TCP send buffers.

pub mod mjpeg;
pub mod wav;

pub use mjpeg::mjpeg_body;
pub use wav::{streaming_wav_header, wav_body};
