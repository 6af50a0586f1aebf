//! Fixed protocol constants that should NOT be changed.
//!
//! These values define the LANSCR wire behavior (multipart framing, datagram
//! header, liveness windows). Changing them breaks interoperability with
//! existing viewers.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name as it appears in served pages and the auth realm.
pub const APP_NAME: &str = "LANSCR";

/// Realm sent in `WWW-Authenticate` on 401 responses.
pub const AUTH_REALM: &str = "LANSCR";

// ─────────────────────────────────────────────────────────────────────────────
// HTTP / MJPEG
// ─────────────────────────────────────────────────────────────────────────────

/// Multipart boundary token for the MJPEG stream.
pub const MULTIPART_BOUNDARY: &str = "frame";

/// Deadline for each MJPEG segment write (part header, JPEG body, trailer).
///
/// A subscriber that cannot drain a segment within this window is dropped;
/// otherwise TCP send buffers accumulate seconds of stale frames.
pub const SEGMENT_SEND_DEADLINE: Duration = Duration::from_millis(500);

/// Deadline for the first body write of a response (WAV prefix).
pub const HEADER_SEND_DEADLINE: Duration = Duration::from_millis(1000);

/// Deadline for reading a request head before the connection is abandoned.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_millis(160);

/// How long a video subscriber waits for a newer frame before re-checking
/// the stop signal.
pub const FRAME_WAIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Per-connection send buffer for streaming sockets.
pub const STREAM_SEND_BUFFER: usize = 64 * 1024;

/// Default / maximum frame rates for the HTTP server.
pub const DEFAULT_HTTP_FPS: u32 = 10;
pub const MAX_HTTP_FPS: u32 = 60;

/// Default JPEG quality for the HTTP server.
pub const DEFAULT_HTTP_QUALITY: u8 = 92;

/// Sleep while no subscriber is connected (capture stays cold).
pub const IDLE_CAPTURE_POLL: Duration = Duration::from_millis(50);

// ─────────────────────────────────────────────────────────────────────────────
// Audio
// ─────────────────────────────────────────────────────────────────────────────

/// Size sentinel written into the RIFF and data chunk length fields of the
/// streaming WAV header. Marks the stream as unbounded for PCM consumers.
pub const WAV_STREAM_SIZE_MAX: u32 = u32::MAX;

/// Sleep when the loopback source has no frames ready.
pub const AUDIO_IDLE_POLL: Duration = Duration::from_millis(5);

// ─────────────────────────────────────────────────────────────────────────────
// Datagram Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Wire magic, little-endian `"LSU2"`.
pub const UDP_MAGIC: u32 = 0x3255_534C;

/// Maximum datagram payload. Chosen to stay under common path MTU.
pub const UDP_MAX_PAYLOAD: usize = 1200;

/// Fixed chunk header size on the wire.
pub const UDP_HEADER_LEN: usize = 16;

/// Socket buffer sizes for both datagram peers.
pub const UDP_SOCKET_BUFFER: usize = 4 * 1024 * 1024;

/// A datagram subscriber silent for longer than this is expired.
pub const UDP_SUBSCRIBER_TTL: Duration = Duration::from_millis(3000);

/// Interval between client keep-alive hellos.
pub const UDP_HELLO_INTERVAL: Duration = Duration::from_millis(500);

/// Sleep while the datagram subscriber set is empty.
pub const UDP_IDLE_POLL: Duration = Duration::from_millis(25);

/// Sleep after a failed capture tick on the datagram path.
pub const UDP_CAPTURE_RETRY: Duration = Duration::from_millis(10);

/// Default / maximum frame rates for the datagram server.
pub const DEFAULT_UDP_FPS: u32 = 60;
pub const MAX_UDP_FPS: u32 = 120;

/// Default JPEG quality for the datagram server.
pub const DEFAULT_UDP_QUALITY: u8 = 70;

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Filename prefix for the per-port stop-signal socket. The full name is
/// `lanscr-stop-<port>.sock` (the Unix rendering of the Windows named event
/// `Local\LANSCR_STOP_<port>`).
pub const STOP_SOCKET_PREFIX: &str = "lanscr-stop-";

/// Timeout for probe/stop operations against the stop socket.
pub const STOP_SIGNAL_TIMEOUT: Duration = Duration::from_millis(250);
