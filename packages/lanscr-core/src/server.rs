//! HTTP server lifecycle.
//!
//! Start admission goes through the per-port stop signal, the capture loop
//! is spawned cold (it only runs while subscribers exist), and the accept
//! loop hands every connection to its own task. The stop signal is the
//! single cancellation root: the accept loop, the capture loop, and every
//! subscriber pump all observe the same token.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Extension;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::api::{create_router, AppState, ClientAddr};
use crate::auth::AuthConfig;
use crate::capture::{
    spawn_capture_loop, AudioSourceFactory, CaptureConfig, FrameProducer, JpegEncoder,
    ScreenGrabber,
};
use crate::constants::{REQUEST_READ_TIMEOUT, STREAM_SEND_BUFFER};
use crate::error::{Error, Result};
use crate::signal::StopSignal;

/// Operator-facing options for one HTTP server.
pub struct ServerOptions {
    pub port: u16,
    /// Requested frame rate; 0 falls back to the default, then clamps to [1, 60].
    pub fps: u32,
    /// Requested JPEG quality; clamps to [1, 100].
    pub quality: u32,
    /// Basic-Auth credentials; `None` serves openly.
    pub auth: Option<AuthConfig>,
    /// Start with the server-wide audio mute flag set.
    pub start_muted: bool,
    /// Loopback session factory; `None` disables the audio endpoint.
    pub audio: Option<Arc<dyn AudioSourceFactory>>,
}

/// Binds the listening socket with a reusable address.
fn bind_listener(port: u16) -> Result<TcpListener> {
    let bind = |port: u16| -> std::io::Result<TcpListener> {
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        socket.set_nonblocking(true)?;
        TcpListener::from_std(socket.into())
    };
    bind(port).map_err(|source| Error::Bind { port, source })
}

/// Runs the HTTP server until the stop signal fires.
///
/// Fails before admitting any subscriber when the port is already served
/// (live stop signal) or the bind fails.
pub async fn run_http_server(
    options: ServerOptions,
    grabber: Box<dyn ScreenGrabber>,
    encoder: Box<dyn JpegEncoder>,
) -> Result<()> {
    let signal = StopSignal::create(options.port)?;
    let stop = signal.token();

    let listener = bind_listener(options.port)?;

    // Ctrl+C funnels into the same cancellation root as a cross-process stop.
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.cancel();
            }
        }
    });

    let config = CaptureConfig::http(options.fps, options.quality);
    let state = AppState::new(
        options.port,
        options.auth,
        options.audio,
        options.start_muted,
        stop.clone(),
    );

    let capture = spawn_capture_loop(
        FrameProducer::new(grabber, encoder, config.quality),
        Arc::clone(&state.slot),
        Arc::clone(&state.subscribers),
        config,
        stop.clone(),
    );

    let app = create_router(state);

    log::info!(
        "LAN MJPEG server running on http://0.0.0.0:{}/",
        options.port
    );
    log::info!(
        "Stop with Ctrl+C or `lanscr stop {}` from any process.",
        options.port
    );

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::debug!("accept failed: {e}");
                        continue;
                    }
                };
                log::info!("Client connected: {remote}");
                let app = app.clone().layer(Extension(ClientAddr(remote)));
                tokio::spawn(serve_connection(stream, app, stop.clone(), remote));
            }
        }
    }

    log::info!("Server stopping, draining subscribers");
    drop(listener);
    let _ = capture.await;
    Ok(())
}

/// Serves one connection over HTTP/1 with keep-alive off (every response is
/// `Connection: close`) and the streaming-friendly socket options set.
async fn serve_connection(
    stream: TcpStream,
    app: axum::Router,
    stop: CancellationToken,
    remote: SocketAddr,
) {
    let _ = stream.set_nodelay(true);
    let sock = socket2::SockRef::from(&stream);
    let _ = sock.set_send_buffer_size(STREAM_SEND_BUFFER);

    let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
        let app = app.clone();
        async move { app.oneshot(request.map(axum::body::Body::new)).await }
    });

    let mut builder = http1::Builder::new();
    builder
        .keep_alive(false)
        .timer(TokioTimer::new())
        .header_read_timeout(REQUEST_READ_TIMEOUT);
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                log::debug!("Connection {remote} ended: {e}");
            }
        }
        _ = stop.cancelled() => {
            // Subscriber pumps end their bodies when the token fires; give
            // hyper the chance to flush and close cleanly.
            conn.as_mut().graceful_shutdown();
            let _ = conn.as_mut().await;
        }
    }
}
