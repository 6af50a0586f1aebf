//! Datagram server: any-packet subscriber liveness plus chunked fan-out.
//!
//! Two tasks share one socket. The receive task records every sender as a
//! live subscriber (payload ignored, any packet is a keep-alive). The send
//! task sweeps expired subscribers, skips the frame entirely when nobody is
//! listening, and otherwise drives capture itself - the datagram path
//! bypasses the frame slot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureConfig, FrameProducer, JpegEncoder, ScreenGrabber};
use crate::constants::{UDP_CAPTURE_RETRY, UDP_IDLE_POLL, UDP_SUBSCRIBER_TTL};
use crate::error::Result;
use crate::signal::StopSignal;
use crate::udp::bind_udp;
use crate::udp::wire::chunk_frame;

/// Operator-facing options for one datagram server.
pub struct UdpServerOptions {
    pub port: u16,
    /// Requested frame rate; 0 falls back to the default, then clamps to [1, 120].
    pub fps: u32,
    /// Requested JPEG quality; clamps to [1, 100].
    pub quality: u32,
}

type Subscribers = Arc<Mutex<HashMap<SocketAddr, Instant>>>;

/// Drops subscribers silent for longer than the liveness window and returns
/// a snapshot of the remainder.
fn sweep(subscribers: &Subscribers, now: Instant) -> Vec<SocketAddr> {
    let mut map = subscribers.lock();
    map.retain(|addr, last_seen| {
        let live = now.duration_since(*last_seen) <= UDP_SUBSCRIBER_TTL;
        if !live {
            log::debug!("UDP client expired: {addr}");
        }
        live
    });
    map.keys().copied().collect()
}

async fn recv_loop(socket: Arc<UdpSocket>, subscribers: Subscribers, stop: CancellationToken) {
    let mut buf = [0u8; 256];
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            res = socket.recv_from(&mut buf) => {
                let Ok((_, from)) = res else { continue };
                let mut map = subscribers.lock();
                if map.insert(from, Instant::now()).is_none() {
                    log::debug!("UDP client added: {from}");
                }
            }
        }
    }
}

/// Runs the datagram server until the stop signal fires.
pub async fn run_udp_server(
    options: UdpServerOptions,
    grabber: Box<dyn ScreenGrabber>,
    encoder: Box<dyn JpegEncoder>,
) -> Result<()> {
    let signal = StopSignal::create(options.port)?;
    let stop = signal.token();

    let socket = Arc::new(bind_udp(options.port)?);

    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.cancel();
            }
        }
    });

    let config = CaptureConfig::datagram(options.fps, options.quality);
    let delay = config.frame_delay();
    let producer = Arc::new(Mutex::new(FrameProducer::new(
        grabber,
        encoder,
        config.quality,
    )));
    let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(recv_loop(
        Arc::clone(&socket),
        Arc::clone(&subscribers),
        stop.clone(),
    ));

    log::info!(
        "UDP server on 0.0.0.0:{} (run udp-client to subscribe)",
        options.port
    );

    let mut frame_id: u32 = 0;
    while !stop.is_cancelled() {
        let targets = sweep(&subscribers, Instant::now());
        if targets.is_empty() {
            pause(&stop, UDP_IDLE_POLL).await;
            continue;
        }

        // Capture and encode off the async workers; the producer mutex is
        // uncontended (only this loop locks it).
        let shared = Arc::clone(&producer);
        let frame = match tokio::task::spawn_blocking(move || shared.lock().produce()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                log::debug!("Capture tick failed: {e}");
                pause(&stop, UDP_CAPTURE_RETRY).await;
                continue;
            }
            Err(_) => break,
        };

        frame_id = frame_id.wrapping_add(1);
        for packet in chunk_frame(frame_id, &frame.bytes) {
            for addr in &targets {
                let _ = socket.send_to(&packet, *addr).await;
            }
        }

        pause(&stop, delay).await;
    }

    log::info!("UDP server stopping");
    Ok(())
}

async fn pause(stop: &CancellationToken, duration: std::time::Duration) {
    tokio::select! {
        _ = stop.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn sweep_expires_silent_subscribers() {
        let now = Instant::now();
        let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));
        subscribers.lock().insert(addr(1000), now);
        subscribers
            .lock()
            .insert(addr(1001), now - Duration::from_millis(3500));

        let live = sweep(&subscribers, now);
        assert_eq!(live, vec![addr(1000)]);
        assert_eq!(subscribers.lock().len(), 1);
    }

    #[test]
    fn sweep_keeps_subscribers_inside_the_window() {
        let now = Instant::now();
        let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));
        subscribers
            .lock()
            .insert(addr(1000), now - Duration::from_millis(2999));
        assert_eq!(sweep(&subscribers, now).len(), 1);
    }
}
