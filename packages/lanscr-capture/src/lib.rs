//! Platform capture sources for LANSCR.
//!
//! Implements the source traits defined by `lanscr-core`:
//!
//! - [`pattern::TestPatternGrabber`]: deterministic synthetic screen source,
//!   used on hosts without a native grabber and in tests
//! - `gdi::GdiGrabber` (Windows): virtual-screen blit with the hardware
//!   cursor composited at its hotspot
//! - [`jpeg::BitmapJpegEncoder`]: BGRA to JPEG at 4:4:4 chroma
//! - [`audio::SystemLoopbackFactory`]: cpal-backed loopback capture, one
//!   session per subscriber

pub mod audio;
#[cfg(windows)]
pub mod gdi;
pub mod jpeg;
pub mod pattern;

pub use audio::SystemLoopbackFactory;
pub use jpeg::BitmapJpegEncoder;
pub use pattern::TestPatternGrabber;

use lanscr_core::ScreenGrabber;

/// The native screen source for this host. Windows blits the real virtual
/// screen; other platforms fall back to the synthetic pattern source and
/// integrators plug their own grabber through the trait.
#[cfg(windows)]
pub fn platform_grabber() -> Box<dyn ScreenGrabber> {
    Box::new(gdi::GdiGrabber::new())
}

#[cfg(not(windows))]
pub fn platform_grabber() -> Box<dyn ScreenGrabber> {
    log::warn!("No native screen grabber on this platform, serving the test pattern");
    Box::new(TestPatternGrabber::default())
}
