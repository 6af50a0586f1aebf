//! Synthetic screen source.
//!
//! Produces an animated gradient with a moving cursor block. Deterministic
//! per tick, so tests can assert that consecutive grabs differ.

use lanscr_core::capture::Bitmap;
use lanscr_core::{Result, ScreenGrabber};

const CURSOR_SIZE: u32 = 8;

pub struct TestPatternGrabber {
    width: u32,
    height: u32,
    tick: u64,
}

impl TestPatternGrabber {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(CURSOR_SIZE),
            height: height.max(CURSOR_SIZE),
            tick: 0,
        }
    }
}

impl Default for TestPatternGrabber {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl ScreenGrabber for TestPatternGrabber {
    fn grab(&mut self) -> Result<Bitmap> {
        let (w, h) = (self.width, self.height);
        let t = self.tick;
        let mut bgra = vec![0u8; (w * h * 4) as usize];

        for y in 0..h {
            for x in 0..w {
                let i = ((y * w + x) * 4) as usize;
                bgra[i] = ((x * 255 / w) as u8).wrapping_add(t as u8);
                bgra[i + 1] = (y * 255 / h) as u8;
                bgra[i + 2] = (((x ^ y) & 0xFF) as u8).wrapping_add((t / 4) as u8);
                bgra[i + 3] = 0xFF;
            }
        }

        // A white block standing in for the cursor, drifting per tick. At the
        // minimum bitmap size the block covers the whole axis and stays put.
        let cx = (t * 7 % u64::from(w - CURSOR_SIZE).max(1)) as u32;
        let cy = (t * 3 % u64::from(h - CURSOR_SIZE).max(1)) as u32;
        for y in cy..cy + CURSOR_SIZE {
            for x in cx..cx + CURSOR_SIZE {
                let i = ((y * w + x) * 4) as usize;
                bgra[i..i + 4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
            }
        }

        self.tick += 1;
        Ok(Bitmap {
            width: w,
            height: h,
            bgra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grab_fills_the_full_bitmap() {
        let mut grabber = TestPatternGrabber::new(64, 32);
        let bitmap = grabber.grab().unwrap();
        assert_eq!(bitmap.width, 64);
        assert_eq!(bitmap.height, 32);
        assert_eq!(bitmap.bgra.len(), 64 * 32 * 4);
        // Alpha is opaque everywhere.
        assert!(bitmap.bgra.chunks_exact(4).all(|px| px[3] == 0xFF));
    }

    #[test]
    fn consecutive_grabs_differ() {
        let mut grabber = TestPatternGrabber::new(64, 32);
        let a = grabber.grab().unwrap();
        let b = grabber.grab().unwrap();
        assert_ne!(a.bgra, b.bgra);
    }

    #[test]
    fn minimum_size_grabs_do_not_panic() {
        // 1x1 clamps up to the cursor size, where the drift modulus would
        // otherwise divide by zero.
        for (w, h) in [(CURSOR_SIZE, CURSOR_SIZE), (1, 1)] {
            let mut grabber = TestPatternGrabber::new(w, h);
            for _ in 0..3 {
                let bitmap = grabber.grab().unwrap();
                assert_eq!(bitmap.width, CURSOR_SIZE);
                assert_eq!(bitmap.height, CURSOR_SIZE);
            }
        }
    }
}
