//! Streaming WAV subscriber loop.
//!
//! Each audio subscriber owns its own loopback session. The response body is
//! a 44-byte RIFF/WAVE header with sentinel sizes followed by an unbounded
//! S16LE sample stream converted from the endpoint's mix format.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::capture::{AudioPacket, LoopbackAudio, SampleKind};
use crate::constants::{
    AUDIO_IDLE_POLL, HEADER_SEND_DEADLINE, SEGMENT_SEND_DEADLINE, WAV_STREAM_SIZE_MAX,
};

/// Generates the 44-byte RIFF/WAVE header for an unbounded PCM16 stream.
///
/// The RIFF chunk size and data chunk size are both `0xFFFFFFFF` sentinels.
/// The header always declares integer PCM (`wFormatTag = 1`) at 16 bits:
/// float mix formats are converted upstream, so this is what consumers
/// actually receive.
pub fn streaming_wav_header(sample_rate: u32, channels: u16) -> Bytes {
    let bytes_per_sample: u16 = 2;
    let block_align = channels * bytes_per_sample;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut header = BytesMut::with_capacity(44);

    header.put_slice(b"RIFF");
    header.put_u32_le(WAV_STREAM_SIZE_MAX);
    header.put_slice(b"WAVE");

    header.put_slice(b"fmt ");
    header.put_u32_le(16); // fmt chunk size
    header.put_u16_le(1); // PCM
    header.put_u16_le(channels);
    header.put_u32_le(sample_rate);
    header.put_u32_le(byte_rate);
    header.put_u16_le(block_align);
    header.put_u16_le(16); // bits per sample

    header.put_slice(b"data");
    header.put_u32_le(WAV_STREAM_SIZE_MAX);

    header.freeze()
}

/// Converts one float sample to S16LE with clamping, rounded to nearest.
fn float_to_s16(f: f32) -> i16 {
    (f.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// All-zero S16LE buffer for `samples` interleaved samples.
fn silence(samples: usize) -> Bytes {
    Bytes::from(vec![0u8; samples * 2])
}

/// Renders one pulled packet as S16LE, honoring the mute flag, the source's
/// silent flag, and the unknown-format fallback.
fn render_packet(packet: &AudioPacket, kind: SampleKind, muted: bool) -> Bytes {
    if muted || packet.silent {
        return silence(packet.samples);
    }
    match kind {
        SampleKind::Int16 => packet.data.clone(),
        SampleKind::Float32 => {
            let mut out = BytesMut::with_capacity(packet.samples * 2);
            for chunk in packet.data.chunks_exact(4) {
                let f = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.put_i16_le(float_to_s16(f));
            }
            out.freeze()
        }
        SampleKind::Unsupported => silence(packet.samples),
    }
}

/// Creates the streaming body for one WAV subscriber and spawns its pump.
pub fn wav_body(
    source: Box<dyn LoopbackAudio>,
    muted: Arc<AtomicBool>,
    stop: CancellationToken,
    remote: SocketAddr,
) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
    tokio::spawn(pump(source, tx, muted, stop, remote));
    Body::from_stream(ReceiverStream::new(rx))
}

async fn pump(
    mut source: Box<dyn LoopbackAudio>,
    tx: mpsc::Sender<io::Result<Bytes>>,
    muted: Arc<AtomicBool>,
    stop: CancellationToken,
    remote: SocketAddr,
) {
    let spec = source.spec();
    log::info!(
        "Audio streaming to {remote} (rate={}, ch={})",
        spec.sample_rate,
        spec.channels
    );

    let header = streaming_wav_header(spec.sample_rate, spec.channels);
    if tx
        .send_timeout(Ok(header), HEADER_SEND_DEADLINE)
        .await
        .is_err()
    {
        return;
    }

    loop {
        if stop.is_cancelled() {
            break;
        }
        let packet = match source.next_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                tokio::time::sleep(AUDIO_IDLE_POLL).await;
                continue;
            }
            Err(e) => {
                log::debug!("Audio source for {remote} ended: {e}");
                break;
            }
        };

        // A mute toggled through /control takes effect on the next packet.
        let out = render_packet(&packet, spec.kind, muted.load(Ordering::SeqCst));
        match tx.send_timeout(Ok(out), SEGMENT_SEND_DEADLINE).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                log::debug!("Audio subscriber {remote} stalled, dropping");
                break;
            }
            Err(SendTimeoutError::Closed(_)) => break,
        }
    }

    log::info!("Audio client disconnected: {remote}");
}
