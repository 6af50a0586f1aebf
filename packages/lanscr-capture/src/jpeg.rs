//! Bitmap-to-JPEG encoding.
//!
//! Uses the `jpeg-encoder` crate so the chroma subsampling can be pinned to
//! 4:4:4: screen content is mostly text and hard edges, where subsampled
//! chroma smears badly.

use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use lanscr_core::capture::Bitmap;
use lanscr_core::{Error, JpegEncoder, JpegFrame, Result};

pub struct BitmapJpegEncoder;

impl BitmapJpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BitmapJpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegEncoder for BitmapJpegEncoder {
    fn encode(&mut self, bitmap: &Bitmap, quality: u8) -> Result<JpegFrame> {
        if bitmap.width == 0 || bitmap.height == 0 {
            return Err(Error::Capture("empty bitmap".into()));
        }
        if bitmap.width > u16::MAX as u32 || bitmap.height > u16::MAX as u32 {
            return Err(Error::Capture(format!(
                "bitmap {}x{} exceeds JPEG dimensions",
                bitmap.width, bitmap.height
            )));
        }
        let expected = bitmap.width as usize * bitmap.height as usize * 4;
        if bitmap.bgra.len() != expected {
            return Err(Error::Capture(format!(
                "bitmap byte length {} does not match {}x{} BGRA",
                bitmap.bgra.len(),
                bitmap.width,
                bitmap.height
            )));
        }

        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, quality);
        encoder.set_sampling_factor(SamplingFactor::F_1_1);
        encoder
            .encode(
                &bitmap.bgra,
                bitmap.width as u16,
                bitmap.height as u16,
                ColorType::Bgra,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        Ok(JpegFrame {
            bytes: Bytes::from(out),
            width: bitmap.width,
            height: bitmap.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::TestPatternGrabber;
    use lanscr_core::ScreenGrabber;

    #[test]
    fn encodes_a_valid_jpeg() {
        let mut grabber = TestPatternGrabber::new(64, 32);
        let bitmap = grabber.grab().unwrap();
        let frame = BitmapJpegEncoder::new().encode(&bitmap, 80).unwrap();
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 32);
        assert!(frame.bytes.starts_with(&[0xFF, 0xD8]), "SOI marker");
        assert!(frame.bytes.ends_with(&[0xFF, 0xD9]), "EOI marker");
    }

    #[test]
    fn higher_quality_produces_larger_output() {
        let mut grabber = TestPatternGrabber::new(128, 64);
        let bitmap = grabber.grab().unwrap();
        let mut encoder = BitmapJpegEncoder::new();
        let low = encoder.encode(&bitmap, 10).unwrap();
        let high = encoder.encode(&bitmap, 95).unwrap();
        assert!(high.bytes.len() > low.bytes.len());
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let bitmap = Bitmap {
            width: 10,
            height: 10,
            bgra: vec![0; 10],
        };
        assert!(BitmapJpegEncoder::new().encode(&bitmap, 80).is_err());
    }
}
