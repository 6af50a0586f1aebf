//! Latest-frame slot shared between the capture pipeline and subscribers.
//!
//! The slot is a single-producer / many-consumer latest-value cell: the
//! capture loop publishes each encoded JPEG together with a strictly
//! monotonic sequence number, and every subscriber holds a cursor that only
//! ever yields frames newer than the last one it served. Subscribers that
//! fall behind skip intermediate sequences; they never see a frame twice and
//! never see frames out of order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;

/// One encoded frame as produced by the JPEG encoder.
#[derive(Debug, Clone, Default)]
pub struct JpegFrame {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default)]
struct Versioned {
    seq: u64,
    frame: JpegFrame,
}

/// The shared latest-frame cell.
///
/// Implemented over a watch channel, which is exactly the "wait until
/// `seq != last_seen`" contract: waiters are woken on every publish and
/// read the newest value, not a backlog.
pub struct FrameSlot {
    tx: watch::Sender<Versioned>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Versioned::default());
        Self { tx }
    }

    /// Publishes a new frame, bumping the sequence number and waking all
    /// subscribers. Only the capture loop calls this.
    pub fn publish(&self, frame: JpegFrame) {
        self.tx.send_modify(|v| {
            v.seq += 1;
            v.frame = frame;
        });
    }

    /// Current sequence number (0 until the first publish).
    pub fn seq(&self) -> u64 {
        self.tx.borrow().seq
    }

    /// Creates an independent subscriber cursor.
    pub fn subscribe(&self) -> FrameCursor {
        FrameCursor {
            rx: self.tx.subscribe(),
            last_seq: 0,
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-subscriber view of the frame slot.
pub struct FrameCursor {
    rx: watch::Receiver<Versioned>,
    last_seq: u64,
}

impl FrameCursor {
    /// Waits until the slot holds a non-empty frame strictly newer than the
    /// last one returned by this cursor, or `timeout` elapses.
    ///
    /// Returns `None` on timeout or when the slot has been dropped (server
    /// shutting down).
    pub async fn next_newer(&mut self, timeout: Duration) -> Option<JpegFrame> {
        let last = self.last_seq;
        let wait = self
            .rx
            .wait_for(|v| v.seq != last && !v.frame.bytes.is_empty());
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(v)) => {
                self.last_seq = v.seq;
                Some(v.frame.clone())
            }
            // Sender dropped or timeout: caller re-checks the stop signal.
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Sequence of the last frame returned by this cursor.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

/// Shared count of live video subscribers.
///
/// The capture loop polls this and stays cold at zero, so an idle server
/// never grabs or encodes.
#[derive(Debug, Default)]
pub struct SubscriberCount(AtomicUsize);

impl SubscriberCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Registers a subscriber; the guard decrements on every exit path.
    pub fn register(self: &Arc<Self>) -> SubscriberGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        SubscriberGuard(Arc::clone(self))
    }

    fn release(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII registration for one subscriber.
pub struct SubscriberGuard(Arc<SubscriberCount>);

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> JpegFrame {
        JpegFrame {
            bytes: Bytes::from(vec![tag; 16]),
            width: 4,
            height: 4,
        }
    }

    #[tokio::test]
    async fn publish_increments_sequence() {
        let slot = FrameSlot::new();
        assert_eq!(slot.seq(), 0);
        slot.publish(frame(1));
        slot.publish(frame(2));
        assert_eq!(slot.seq(), 2);
    }

    #[tokio::test]
    async fn cursor_only_yields_strictly_newer_frames() {
        let slot = FrameSlot::new();
        let mut cursor = slot.subscribe();

        slot.publish(frame(1));
        let first = cursor.next_newer(Duration::from_millis(100)).await.unwrap();
        assert_eq!(first.bytes[0], 1);
        assert_eq!(cursor.last_seq(), 1);

        // No new publish: times out instead of re-serving seq 1.
        assert!(cursor.next_newer(Duration::from_millis(20)).await.is_none());

        slot.publish(frame(2));
        let second = cursor.next_newer(Duration::from_millis(100)).await.unwrap();
        assert_eq!(second.bytes[0], 2);
        assert_eq!(cursor.last_seq(), 2);
    }

    #[tokio::test]
    async fn slow_cursor_skips_to_latest() {
        let slot = FrameSlot::new();
        let mut cursor = slot.subscribe();

        slot.publish(frame(1));
        slot.publish(frame(2));
        slot.publish(frame(3));

        let got = cursor.next_newer(Duration::from_millis(100)).await.unwrap();
        assert_eq!(got.bytes[0], 3, "intermediate frames are skipped");
        assert_eq!(cursor.last_seq(), 3);
    }

    #[tokio::test]
    async fn late_subscriber_sees_current_frame() {
        let slot = FrameSlot::new();
        slot.publish(frame(7));

        let mut cursor = slot.subscribe();
        let got = cursor.next_newer(Duration::from_millis(100)).await.unwrap();
        assert_eq!(got.bytes[0], 7);
    }

    #[tokio::test]
    async fn empty_slot_times_out() {
        let slot = FrameSlot::new();
        let mut cursor = slot.subscribe();
        assert!(cursor.next_newer(Duration::from_millis(20)).await.is_none());
    }

    #[test]
    fn subscriber_guard_tracks_count() {
        let count = Arc::new(SubscriberCount::default());
        assert_eq!(count.get(), 0);
        let a = count.register();
        let b = count.register();
        assert_eq!(count.get(), 2);
        drop(a);
        assert_eq!(count.get(), 1);
        drop(b);
        assert_eq!(count.get(), 0);
    }
}
