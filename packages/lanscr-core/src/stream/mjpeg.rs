//! MJPEG subscriber loop.
//!
//! Each video subscriber owns a frame cursor and a pump task. On every new
//! slot version the pump emits one multipart part in three segments (part
//! header, JPEG body, trailing CRLF), each under a 500 ms deadline. A
//! deadline violation or a closed peer terminates that subscriber only.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::constants::{FRAME_WAIT_TIMEOUT, MULTIPART_BOUNDARY, SEGMENT_SEND_DEADLINE};
use crate::frame::{FrameCursor, SubscriberCount};

/// Part trailer terminating each JPEG body.
const PART_TRAILER: &[u8] = b"\r\n";

/// Builds the per-frame part header:
/// `--frame\r\nContent-Type: image/jpeg\r\nContent-Length: <n>\r\n\r\n`.
pub fn part_header(len: usize) -> Bytes {
    Bytes::from(format!(
        "--{MULTIPART_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n"
    ))
}

/// Creates the streaming body for one MJPEG subscriber and spawns its pump.
///
/// The subscriber counter is incremented for the pump's lifetime; the capture
/// loop observes it.
pub fn mjpeg_body(
    cursor: FrameCursor,
    subscribers: Arc<SubscriberCount>,
    stop: CancellationToken,
    remote: SocketAddr,
) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
    tokio::spawn(pump(cursor, tx, subscribers, stop, remote));
    Body::from_stream(ReceiverStream::new(rx))
}

async fn pump(
    mut cursor: FrameCursor,
    tx: mpsc::Sender<io::Result<Bytes>>,
    subscribers: Arc<SubscriberCount>,
    stop: CancellationToken,
    remote: SocketAddr,
) {
    let _guard = subscribers.register();
    log::info!("Streaming to {remote} (subscribers={})", subscribers.get());

    'stream: loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break 'stream,
            f = cursor.next_newer(FRAME_WAIT_TIMEOUT) => match f {
                Some(f) => f,
                // Timeout: loop around so the stop signal is re-checked.
                None => continue 'stream,
            },
        };

        let segments = [
            part_header(frame.bytes.len()),
            frame.bytes,
            Bytes::from_static(PART_TRAILER),
        ];
        for segment in segments {
            match tx.send_timeout(Ok(segment), SEGMENT_SEND_DEADLINE).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    log::debug!("Subscriber {remote} stalled, dropping");
                    break 'stream;
                }
                Err(SendTimeoutError::Closed(_)) => break 'stream,
            }
        }
    }

    drop(_guard);
    log::info!(
        "Client disconnected: {remote} (subscribers={})",
        subscribers.get()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameSlot, JpegFrame};
    use std::time::Duration;

    fn jpeg(tag: u8, len: usize) -> JpegFrame {
        JpegFrame {
            bytes: Bytes::from(vec![tag; len]),
            width: 8,
            height: 8,
        }
    }

    #[test]
    fn part_header_format() {
        let header = part_header(12345);
        assert_eq!(
            &header[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 12345\r\n\r\n".as_slice()
        );
    }

    async fn collect_one_part(rx: &mut mpsc::Receiver<io::Result<Bytes>>) -> Vec<Bytes> {
        let mut segments = Vec::new();
        for _ in 0..3 {
            segments.push(rx.recv().await.expect("segment").expect("ok"));
        }
        segments
    }

    #[tokio::test(start_paused = true)]
    async fn pump_emits_parts_in_slot_order() {
        let slot = FrameSlot::new();
        let subscribers = Arc::new(SubscriberCount::default());
        let stop = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let handle = tokio::spawn(pump(
            slot.subscribe(),
            tx,
            Arc::clone(&subscribers),
            stop.clone(),
            remote,
        ));

        slot.publish(jpeg(1, 100));
        let part = collect_one_part(&mut rx).await;
        assert_eq!(&part[0][..], &part_header(100)[..]);
        assert_eq!(part[1][0], 1);
        assert_eq!(&part[2][..], b"\r\n");

        slot.publish(jpeg(2, 50));
        let part = collect_one_part(&mut rx).await;
        assert_eq!(part[1][0], 2);

        stop.cancel();
        handle.await.unwrap();
        assert_eq!(subscribers.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pump_registers_subscriber_while_running() {
        let slot = FrameSlot::new();
        let subscribers = Arc::new(SubscriberCount::default());
        let stop = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let handle = tokio::spawn(pump(
            slot.subscribe(),
            tx,
            Arc::clone(&subscribers),
            stop.clone(),
            remote,
        ));

        tokio::task::yield_now().await;
        assert_eq!(subscribers.get(), 1);

        stop.cancel();
        handle.await.unwrap();
        assert_eq!(subscribers.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_subscriber_is_dropped_within_deadline() {
        let slot = FrameSlot::new();
        let subscribers = Arc::new(SubscriberCount::default());
        let stop = CancellationToken::new();
        // The receiver is held open but never drained: the channel fills and
        // the pump's bounded send must give up.
        let (tx, _rx) = mpsc::channel(1);
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let handle = tokio::spawn(pump(
            slot.subscribe(),
            tx,
            Arc::clone(&subscribers),
            stop.clone(),
            remote,
        ));

        slot.publish(jpeg(1, 100));

        // First segment occupies the channel slot; the second hits the 500 ms
        // send deadline and terminates the pump.
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pump must terminate on a stalled peer")
            .unwrap();
        assert_eq!(subscribers.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_peer_ends_pump() {
        let slot = FrameSlot::new();
        let subscribers = Arc::new(SubscriberCount::default());
        let stop = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let handle = tokio::spawn(pump(
            slot.subscribe(),
            tx,
            Arc::clone(&subscribers),
            stop.clone(),
            remote,
        ));

        drop(rx);
        slot.publish(jpeg(1, 10));

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pump must terminate when the peer closes")
            .unwrap();
        assert_eq!(subscribers.get(), 0);
    }
}
