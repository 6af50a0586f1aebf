//! HTTP API layer: routing, auth gating, and the stream handlers.
//!
//! All requests pass the Basic-Auth gate before any response body is
//! produced. Dispatch is by path: landing page, WAV audio, JSON control, and
//! everything else (including `/mjpeg`) streams MJPEG.

mod http;

pub use http::create_router;

use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthConfig;
use crate::capture::AudioSourceFactory;
use crate::frame::{FrameSlot, SubscriberCount};

/// Remote peer address, attached per connection by the accept loop.
///
/// Extracting it never fails: requests served outside a real connection
/// (tests, health probes) see the unspecified address.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

impl ClientAddr {
    pub(crate) fn unknown() -> Self {
        Self(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
    }
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        Ok(parts
            .extensions
            .get::<ClientAddr>()
            .copied()
            .unwrap_or_else(ClientAddr::unknown))
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Latest-frame cell written by the capture loop.
    pub slot: Arc<FrameSlot>,
    /// Live video subscriber count, observed by the capture loop.
    pub subscribers: Arc<SubscriberCount>,
    /// Server-wide audio mute flag, toggled through `/control`.
    pub audio_muted: Arc<AtomicBool>,
    /// Basic-Auth credentials; `None` disables the gate.
    pub auth: Option<Arc<AuthConfig>>,
    /// Loopback session factory; `None` means audio is disabled.
    pub audio: Option<Arc<dyn AudioSourceFactory>>,
    /// The port this server is bound to (reported by `/control`).
    pub port: u16,
    /// Cancellation root observed by every subscriber loop.
    pub stop: CancellationToken,
}

impl AppState {
    pub fn new(
        port: u16,
        auth: Option<AuthConfig>,
        audio: Option<Arc<dyn AudioSourceFactory>>,
        start_muted: bool,
        stop: CancellationToken,
    ) -> Self {
        Self {
            slot: Arc::new(FrameSlot::new()),
            subscribers: Arc::new(SubscriberCount::default()),
            audio_muted: Arc::new(AtomicBool::new(start_muted)),
            auth: auth.map(Arc::new),
            audio,
            port,
            stop,
        }
    }
}
