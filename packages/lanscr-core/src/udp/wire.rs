//! Datagram wire format: fixed 16-byte header plus up to 1200 payload bytes.
//!
//! All header fields are little-endian:
//!
//! ```text
//! magic: u32      0x3255534C ("LSU2")
//! frameId: u32
//! chunkIndex: u16
//! chunkCount: u16
//! payloadLen: u16
//! reserved: u16
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{UDP_HEADER_LEN, UDP_MAGIC, UDP_MAX_PAYLOAD};

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub frame_id: u32,
    pub chunk_index: u16,
    pub chunk_count: u16,
    pub payload_len: u16,
}

impl ChunkHeader {
    /// Writes the 16-byte wire header.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(UDP_MAGIC);
        buf.put_u32_le(self.frame_id);
        buf.put_u16_le(self.chunk_index);
        buf.put_u16_le(self.chunk_count);
        buf.put_u16_le(self.payload_len);
        buf.put_u16_le(0); // reserved
    }

    /// Parses a wire header; `None` on short input or bad magic.
    pub fn decode(datagram: &[u8]) -> Option<ChunkHeader> {
        if datagram.len() < UDP_HEADER_LEN {
            return None;
        }
        let magic = u32::from_le_bytes(datagram[0..4].try_into().ok()?);
        if magic != UDP_MAGIC {
            return None;
        }
        Some(ChunkHeader {
            frame_id: u32::from_le_bytes(datagram[4..8].try_into().ok()?),
            chunk_index: u16::from_le_bytes(datagram[8..10].try_into().ok()?),
            chunk_count: u16::from_le_bytes(datagram[10..12].try_into().ok()?),
            payload_len: u16::from_le_bytes(datagram[12..14].try_into().ok()?),
        })
    }
}

/// Splits one JPEG into ready-to-send datagrams sharing `frame_id`.
///
/// Empty input yields no packets, as does anything that would not fit the
/// u16 chunk count (not reachable with real JPEG sizes).
pub fn chunk_frame(frame_id: u32, jpeg: &[u8]) -> Vec<Bytes> {
    let chunks_needed = jpeg.len().div_ceil(UDP_MAX_PAYLOAD);
    if jpeg.is_empty() || chunks_needed > usize::from(u16::MAX) {
        return Vec::new();
    }
    let chunk_count = chunks_needed as u16;
    jpeg.chunks(UDP_MAX_PAYLOAD)
        .enumerate()
        .map(|(index, payload)| {
            let mut packet = BytesMut::with_capacity(UDP_HEADER_LEN + payload.len());
            ChunkHeader {
                frame_id,
                chunk_index: index as u16,
                chunk_count,
                payload_len: payload.len() as u16,
            }
            .encode(&mut packet);
            packet.put_slice(payload);
            packet.freeze()
        })
        .collect()
}

/// Reassembles frames chunk by chunk.
///
/// A chunk belonging to a new `frameId` resets the accumulator, abandoning
/// whatever was in flight. Invalid chunks (bad magic, zero or oversized
/// payload, truncated datagram, inconsistent `chunkCount`, out-of-range
/// `chunkIndex`, duplicates) are dropped without touching the accumulator.
pub struct FrameAssembler {
    frame_id: u32,
    chunk_count: u16,
    last_payload_len: u16,
    accum: Vec<u8>,
    got: Vec<bool>,
    received: u16,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            frame_id: 0,
            chunk_count: 0,
            last_payload_len: 0,
            accum: Vec::new(),
            got: Vec::new(),
            received: 0,
        }
    }

    /// Feeds one datagram. Returns the complete JPEG when every index in
    /// `[0, chunkCount)` of the current frame has been seen.
    pub fn ingest(&mut self, datagram: &[u8]) -> Option<Bytes> {
        let header = ChunkHeader::decode(datagram)?;
        if header.payload_len == 0 || header.payload_len as usize > UDP_MAX_PAYLOAD {
            return None;
        }
        if UDP_HEADER_LEN + header.payload_len as usize > datagram.len() {
            return None;
        }
        if header.chunk_count == 0 || header.chunk_index >= header.chunk_count {
            return None;
        }

        if header.frame_id != self.frame_id || self.chunk_count == 0 {
            self.frame_id = header.frame_id;
            self.chunk_count = header.chunk_count;
            self.last_payload_len = 0;
            self.accum = vec![0; header.chunk_count as usize * UDP_MAX_PAYLOAD];
            self.got = vec![false; header.chunk_count as usize];
            self.received = 0;
        }
        if header.chunk_count != self.chunk_count {
            return None;
        }
        let index = header.chunk_index as usize;
        if self.got[index] {
            return None;
        }

        let payload = &datagram[UDP_HEADER_LEN..UDP_HEADER_LEN + header.payload_len as usize];
        let offset = index * UDP_MAX_PAYLOAD;
        self.accum[offset..offset + payload.len()].copy_from_slice(payload);
        self.got[index] = true;
        self.received += 1;
        if header.chunk_index == self.chunk_count - 1 {
            self.last_payload_len = header.payload_len;
        }

        if self.received < self.chunk_count {
            return None;
        }

        let len =
            (self.chunk_count as usize - 1) * UDP_MAX_PAYLOAD + self.last_payload_len as usize;
        let jpeg = Bytes::copy_from_slice(&self.accum[..len]);
        // Arm for the next frame; a duplicate of this frame starts over
        // harmlessly instead of re-completing.
        self.got.iter_mut().for_each(|g| *g = false);
        self.received = 0;
        Some(jpeg)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn header_round_trips() {
        let header = ChunkHeader {
            frame_id: 7,
            chunk_index: 2,
            chunk_count: 5,
            payload_len: 1200,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), UDP_HEADER_LEN);
        assert_eq!(&buf[0..4], b"LSU2");
        assert_eq!(ChunkHeader::decode(&buf), Some(header));
    }

    #[test]
    fn decode_rejects_short_or_foreign_datagrams() {
        assert!(ChunkHeader::decode(b"LSU2").is_none());
        let mut buf = BytesMut::new();
        ChunkHeader {
            frame_id: 1,
            chunk_index: 0,
            chunk_count: 1,
            payload_len: 4,
        }
        .encode(&mut buf);
        buf[0] = b'X';
        assert!(ChunkHeader::decode(&buf).is_none());
    }

    #[test]
    fn chunking_matches_ceil_division() {
        for (len, expected) in [(1, 1), (1199, 1), (1200, 1), (1201, 2), (3600, 3), (3601, 4)] {
            assert_eq!(chunk_frame(1, &payload(len)).len(), expected, "len {len}");
        }
        assert!(chunk_frame(1, &[]).is_empty());
    }

    #[test]
    fn chunk_then_reassemble_round_trips() {
        for len in [1, 17, 1199, 1200, 1201, 2400, 5000] {
            let jpeg = payload(len);
            let mut assembler = FrameAssembler::new();
            let packets = chunk_frame(42, &jpeg);
            let mut result = None;
            for packet in &packets {
                result = assembler.ingest(packet).or(result);
            }
            assert_eq!(result.as_deref(), Some(&jpeg[..]), "len {len}");
        }
    }

    #[test]
    fn out_of_order_chunks_still_complete() {
        let jpeg = payload(3000);
        let mut packets = chunk_frame(9, &jpeg);
        packets.reverse();
        let mut assembler = FrameAssembler::new();
        let mut result = None;
        for packet in &packets {
            result = assembler.ingest(packet).or(result);
        }
        assert_eq!(result.as_deref(), Some(&jpeg[..]));
    }

    #[test]
    fn new_frame_abandons_partial_frame() {
        let old = chunk_frame(1, &payload(3000));
        let fresh = payload(900);
        let mut assembler = FrameAssembler::new();
        // Only part of frame 1 arrives before frame 2 starts.
        assert!(assembler.ingest(&old[0]).is_none());
        assert!(assembler.ingest(&old[2]).is_none());
        let packets = chunk_frame(2, &fresh);
        assert_eq!(assembler.ingest(&packets[0]).as_deref(), Some(&fresh[..]));
        // Leftover chunks of the abandoned frame reset the accumulator again
        // but never complete.
        assert!(assembler.ingest(&old[1]).is_none());
    }

    #[test]
    fn inconsistent_chunk_count_is_dropped() {
        let jpeg = payload(3000);
        let packets = chunk_frame(5, &jpeg);
        let mut assembler = FrameAssembler::new();
        assert!(assembler.ingest(&packets[0]).is_none());

        // Same frame id, different count: dropped without resetting.
        let mut rogue = BytesMut::new();
        ChunkHeader {
            frame_id: 5,
            chunk_index: 1,
            chunk_count: 7,
            payload_len: 8,
        }
        .encode(&mut rogue);
        rogue.put_slice(&[0u8; 8]);
        assert!(assembler.ingest(&rogue).is_none());

        let mut result = None;
        for packet in &packets[1..] {
            result = assembler.ingest(packet).or(result);
        }
        assert_eq!(result.as_deref(), Some(&jpeg[..]));
    }

    #[test]
    fn invalid_chunks_are_dropped_silently() {
        let mut assembler = FrameAssembler::new();

        // Out-of-range index.
        let mut buf = BytesMut::new();
        ChunkHeader {
            frame_id: 1,
            chunk_index: 3,
            chunk_count: 3,
            payload_len: 4,
        }
        .encode(&mut buf);
        buf.put_slice(&[0u8; 4]);
        assert!(assembler.ingest(&buf).is_none());

        // Truncated datagram: header claims more payload than present.
        let mut buf = BytesMut::new();
        ChunkHeader {
            frame_id: 1,
            chunk_index: 0,
            chunk_count: 1,
            payload_len: 100,
        }
        .encode(&mut buf);
        buf.put_slice(&[0u8; 10]);
        assert!(assembler.ingest(&buf).is_none());

        // Zero-length payload.
        let mut buf = BytesMut::new();
        ChunkHeader {
            frame_id: 1,
            chunk_index: 0,
            chunk_count: 1,
            payload_len: 0,
        }
        .encode(&mut buf);
        assert!(assembler.ingest(&buf).is_none());
    }

    #[test]
    fn duplicate_chunks_are_ignored() {
        let jpeg = payload(2000);
        let packets = chunk_frame(3, &jpeg);
        let mut assembler = FrameAssembler::new();
        assert!(assembler.ingest(&packets[0]).is_none());
        assert!(assembler.ingest(&packets[0]).is_none(), "duplicate dropped");
        assert_eq!(assembler.ingest(&packets[1]).as_deref(), Some(&jpeg[..]));
    }

    #[test]
    fn reported_length_matches_last_chunk_payload() {
        let len = 2 * UDP_MAX_PAYLOAD + 37;
        let jpeg = payload(len);
        let packets = chunk_frame(11, &jpeg);
        let mut assembler = FrameAssembler::new();
        let mut result = None;
        for packet in &packets {
            result = assembler.ingest(packet).or(result);
        }
        let out = result.unwrap();
        assert_eq!(out.len(), (3 - 1) * UDP_MAX_PAYLOAD + 37);
        assert_eq!(&out[..], &jpeg[..]);
    }
}
