//! LANSCR core - LAN screen and audio streaming engine.
//!
//! This crate implements the streaming engine behind LANSCR: a single screen
//! capture pipeline fanned out to any number of HTTP viewers (MJPEG video,
//! streaming WAV audio), plus a connectionless datagram mode that pushes
//! chunked JPEG frames at higher frame rates.
//!
//! # Architecture
//!
//! - [`capture`]: platform-source traits ([`ScreenGrabber`](capture::ScreenGrabber),
//!   [`JpegEncoder`](capture::JpegEncoder), [`LoopbackAudio`](capture::LoopbackAudio))
//!   and the demand-driven capture pipeline
//! - [`frame`]: the latest-frame slot shared between the producer and all
//!   video subscribers
//! - [`api`]: HTTP routing, Basic-Auth gating, and the `/control` endpoint
//! - [`stream`]: MJPEG and streaming-WAV subscriber loops with bounded writes
//! - [`udp`]: chunked-JPEG datagram server/client and the wire codec
//! - [`signal`]: the named per-port stop primitive used for admission,
//!   cross-process stop, and instance detection
//! - [`error`]: centralized error types
//!
//! Platform-specific capture implementations live in the `lanscr-capture`
//! crate; this crate only consumes the traits.

pub mod api;
pub mod auth;
pub mod capture;
pub mod constants;
pub mod control;
pub mod error;
pub mod frame;
pub mod landing;
pub mod server;
pub mod signal;
pub mod stream;
pub mod udp;

pub use auth::AuthConfig;
pub use capture::{
    AudioPacket, AudioSourceFactory, AudioSpec, Bitmap, JpegEncoder, LoopbackAudio, SampleKind,
    ScreenGrabber,
};
pub use error::{Error, Result};
pub use frame::{FrameCursor, FrameSlot, JpegFrame, SubscriberCount};
pub use server::{run_http_server, ServerOptions};
pub use udp::{run_udp_client, run_udp_server, FrameSink, UdpServerOptions};
