//! Demand-driven capture loop: the sole producer of the frame slot.
//!
//! Encoding dominates CPU, so the pipeline runs only while somebody is
//! watching: at zero subscribers it sleeps in short ticks without touching
//! the screen. This keeps an idle server invisible to the host (no capture
//! cost, no cursor interaction).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::{
    DEFAULT_HTTP_FPS, DEFAULT_UDP_FPS, IDLE_CAPTURE_POLL, MAX_HTTP_FPS, MAX_UDP_FPS,
};
use crate::error::Result;
use crate::frame::{FrameSlot, JpegFrame, SubscriberCount};

use super::{JpegEncoder, ScreenGrabber};

/// Clamped frame rate + quality for one capture pipeline.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    pub fps: u32,
    pub quality: u8,
}

impl CaptureConfig {
    /// Config for the HTTP server: fps 0 falls back to the default, then
    /// clamps to [1, 60]; quality clamps to [1, 100].
    pub fn http(fps: u32, quality: u32) -> Self {
        let fps = if fps == 0 { DEFAULT_HTTP_FPS } else { fps };
        Self {
            fps: fps.clamp(1, MAX_HTTP_FPS),
            quality: clamp_quality(quality),
        }
    }

    /// Config for the datagram server: fps 0 falls back to the default, then
    /// clamps to [1, 120]; quality clamps to [1, 100].
    pub fn datagram(fps: u32, quality: u32) -> Self {
        let fps = if fps == 0 { DEFAULT_UDP_FPS } else { fps };
        Self {
            fps: fps.clamp(1, MAX_UDP_FPS),
            quality: clamp_quality(quality),
        }
    }

    /// Delay between frames at the configured rate.
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps))
    }
}

fn clamp_quality(quality: u32) -> u8 {
    quality.clamp(1, 100) as u8
}

/// Grabber + encoder bundled into one producer of encoded frames.
///
/// Shared between the HTTP capture loop and the datagram send loop, which
/// drive it at their own cadence.
pub struct FrameProducer {
    grabber: Box<dyn ScreenGrabber>,
    encoder: Box<dyn JpegEncoder>,
    quality: u8,
}

impl FrameProducer {
    pub fn new(
        grabber: Box<dyn ScreenGrabber>,
        encoder: Box<dyn JpegEncoder>,
        quality: u8,
    ) -> Self {
        Self {
            grabber,
            encoder,
            quality,
        }
    }

    /// Grabs and encodes one frame.
    pub fn produce(&mut self) -> Result<JpegFrame> {
        let bitmap = self.grabber.grab()?;
        self.encoder.encode(&bitmap, self.quality)
    }
}

/// Spawns the capture loop on the blocking pool.
///
/// Loop body per tick: exit on stop; sleep while the subscriber count is
/// zero; otherwise grab, encode, publish to the slot, and sleep `1000/fps`.
/// A failed grab or encode logs at debug and skips the tick.
pub fn spawn_capture_loop(
    mut producer: FrameProducer,
    slot: Arc<FrameSlot>,
    subscribers: Arc<SubscriberCount>,
    config: CaptureConfig,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let delay = config.frame_delay();
    tokio::task::spawn_blocking(move || {
        log::debug!(
            "Capture loop started (fps={}, quality={})",
            config.fps,
            config.quality
        );
        while !stop.is_cancelled() {
            if subscribers.get() == 0 {
                std::thread::sleep(IDLE_CAPTURE_POLL);
                continue;
            }
            match producer.produce() {
                Ok(frame) => slot.publish(frame),
                Err(e) => log::debug!("Capture tick failed: {e}"),
            }
            std::thread::sleep(delay);
        }
        log::debug!("Capture loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Bitmap;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGrabber(Arc<AtomicUsize>);

    impl ScreenGrabber for CountingGrabber {
        fn grab(&mut self) -> Result<Bitmap> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Bitmap {
                width: 2,
                height: 2,
                bgra: vec![0; 16],
            })
        }
    }

    struct StubEncoder;

    impl JpegEncoder for StubEncoder {
        fn encode(&mut self, bitmap: &Bitmap, _quality: u8) -> Result<JpegFrame> {
            Ok(JpegFrame {
                bytes: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
                width: bitmap.width,
                height: bitmap.height,
            })
        }
    }

    #[test]
    fn http_config_clamps() {
        assert_eq!(CaptureConfig::http(0, 92).fps, DEFAULT_HTTP_FPS);
        assert_eq!(CaptureConfig::http(200, 92).fps, MAX_HTTP_FPS);
        assert_eq!(CaptureConfig::http(30, 0).quality, 1);
        assert_eq!(CaptureConfig::http(30, 500).quality, 100);
    }

    #[test]
    fn datagram_config_clamps() {
        assert_eq!(CaptureConfig::datagram(0, 70).fps, DEFAULT_UDP_FPS);
        assert_eq!(CaptureConfig::datagram(500, 70).fps, MAX_UDP_FPS);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idle_pipeline_never_grabs() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let producer = FrameProducer::new(
            Box::new(CountingGrabber(Arc::clone(&grabs))),
            Box::new(StubEncoder),
            92,
        );
        let slot = Arc::new(FrameSlot::new());
        let subscribers = Arc::new(SubscriberCount::default());
        let stop = CancellationToken::new();

        let handle = spawn_capture_loop(
            producer,
            Arc::clone(&slot),
            Arc::clone(&subscribers),
            CaptureConfig::http(60, 92),
            stop.clone(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(grabs.load(Ordering::SeqCst), 0, "no subscribers, no grabs");
        assert_eq!(slot.seq(), 0);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipeline_produces_while_subscribed() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let producer = FrameProducer::new(
            Box::new(CountingGrabber(Arc::clone(&grabs))),
            Box::new(StubEncoder),
            92,
        );
        let slot = Arc::new(FrameSlot::new());
        let subscribers = Arc::new(SubscriberCount::default());
        let stop = CancellationToken::new();

        let handle = spawn_capture_loop(
            producer,
            Arc::clone(&slot),
            Arc::clone(&subscribers),
            CaptureConfig::http(60, 92),
            stop.clone(),
        );

        let guard = subscribers.register();
        let mut cursor = slot.subscribe();
        let frame = cursor.next_newer(Duration::from_secs(2)).await;
        assert!(frame.is_some(), "a subscribed pipeline publishes frames");
        assert!(grabs.load(Ordering::SeqCst) >= 1);

        // Dropping the last subscriber sends the loop back to idle.
        drop(guard);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let seq_idle = slot.seq();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(slot.seq(), seq_idle, "idle loop publishes nothing");

        stop.cancel();
        handle.await.unwrap();
    }
}
