//! Centralized error types for the LANSCR core library.
//!
//! The engine reports failures through one `thiserror` enum. The only
//! variant that ever reaches an HTTP peer is [`Error::Unauthorized`], whose
//! [`IntoResponse`] rendering is the single 401 an unauthorized connection
//! receives; everything else is operator-facing.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::constants::AUTH_REALM;

/// Application-wide error type for the LANSCR engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Operator-supplied configuration is invalid (bad port, bad `--auth`).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The per-port stop signal already exists, so another server owns the port.
    #[error("A server is already running for port {0}")]
    AlreadyRunning(u16),

    /// Could not bind the listening socket.
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A screen grab or JPEG encode failed.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// The loopback audio endpoint could not be activated or died mid-stream.
    #[error("Audio capture failed: {0}")]
    Audio(String),

    /// Credentials were missing or wrong. Served as a 401 with the realm;
    /// never logged with the credentials themselves.
    #[error("Unauthorized (401). Use --auth user:pass")]
    Unauthorized,

    /// A remote control action was rejected by the server (HTTP error status,
    /// unreachable host, or no stop signal to open).
    #[error("Remote action refused: {0}")]
    RemoteRefused(String),

    /// The named stop-signal primitive is unavailable on this platform.
    #[error("Named stop signals are not supported on this platform")]
    Unsupported,

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header(
                    header::WWW_AUTHENTICATE,
                    format!("Basic realm=\"{AUTH_REALM}\""),
                )
                .header(header::CONNECTION, "close")
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Body::from("Unauthorized"))
                .expect("static response"),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
        }
    }
}

/// Convenient Result alias for engine-wide operations.
pub type Result<T> = std::result::Result<T, Error>;
