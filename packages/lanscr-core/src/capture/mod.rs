//! Platform source traits and the capture pipeline.
//!
//! The engine never talks to the OS directly: it consumes a [`ScreenGrabber`]
//! (one BGRA bitmap per call, hardware cursor already composited), a
//! [`JpegEncoder`] (bitmap to JPEG at a requested quality), and a
//! [`LoopbackAudio`] (pull-based PCM packets in the endpoint's mix format).
//! The `lanscr-capture` crate provides the real implementations.

mod pipeline;

pub use pipeline::{spawn_capture_loop, CaptureConfig, FrameProducer};

use bytes::Bytes;

use crate::error::Result;
use crate::frame::JpegFrame;

/// One captured bitmap: tightly packed 32-bit BGRA, top-down rows.
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub bgra: Vec<u8>,
}

/// Captures the virtual screen. One bitmap per call, cursor included.
pub trait ScreenGrabber: Send {
    fn grab(&mut self) -> Result<Bitmap>;
}

/// Encodes a bitmap to JPEG bytes at the given quality (1-100).
pub trait JpegEncoder: Send {
    fn encode(&mut self, bitmap: &Bitmap, quality: u8) -> Result<JpegFrame>;
}

/// Interleaved sample encoding of a loopback endpoint's mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// 32-bit IEEE float, little-endian.
    Float32,
    /// 16-bit signed integer, little-endian.
    Int16,
    /// Anything else: packets carry a sample count only and are rendered as
    /// silence downstream.
    Unsupported,
}

/// The endpoint's mix format as reported by the loopback source.
#[derive(Debug, Clone, Copy)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub kind: SampleKind,
}

/// One pulled packet of interleaved samples.
pub struct AudioPacket {
    /// Raw sample bytes in the spec's encoding. Empty for `Unsupported`
    /// sources, which report only a count.
    pub data: Bytes,
    /// Number of interleaved samples (frames x channels) in this packet.
    pub samples: usize,
    /// The endpoint flagged this packet as silent.
    pub silent: bool,
}

/// A loopback capture session. Each audio subscriber owns its own session so
/// read positions never leak between subscribers.
pub trait LoopbackAudio: Send {
    /// The mix format this session captures in.
    fn spec(&self) -> AudioSpec;

    /// Pulls the next packet without blocking. `Ok(None)` means nothing is
    /// buffered yet; the caller sleeps a few milliseconds and retries.
    fn next_packet(&mut self) -> Result<Option<AudioPacket>>;
}

/// Opens a fresh [`LoopbackAudio`] session per subscriber.
pub trait AudioSourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn LoopbackAudio>>;
}
