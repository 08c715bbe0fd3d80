//! Byte-stream framing (C1): turn a TCP stream into discrete frames and back.
//!
//! Mirrors the incremental, peek-then-consume read loop of
//! `examples/Devolutions-IronRDP/crates/ironrdp-blocking::Framed`, generalized from one
//! length-prefixed envelope to the three incompatible envelope variants this protocol
//! actually uses.

use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};

use flexnet_core::{DecodeError, DecodeErrorExt, DecodeResult, WriteCursor};

use crate::crc;

pub const MODERN_PREFIX: u8 = 0x2F;
pub const LEGACY_CHUNK_PREFIX: u8 = 0x4C;
pub const LEGACY_TERMINATOR_PREFIX: u8 = 0x4E;

const MODERN_HEADER_LEN: usize = 20;
pub(crate) const LEGACY_CHUNK_LEN: usize = 147;
const LEGACY_CHUNK_META_LEN: usize = 13;
const LEGACY_CHUNK_PAYLOAD_LEN: usize = LEGACY_CHUNK_LEN - LEGACY_CHUNK_META_LEN;
const LEGACY_TERMINATOR_LEN: usize = 2;

/// One decoded envelope. `flexnet_proto::message` turns this into a typed [`crate::message::Message`].
#[derive(Debug, Clone)]
pub enum Frame {
    Modern {
        message_type: u16,
        timestamp: u32,
        /// The complete frame, prefix through body, since a few message types carry
        /// extra fields at fixed offsets beyond the common 20-byte preamble.
        raw: Bytes,
    },
    LegacyChunked {
        /// The first chunk's 13 bytes of metadata, preserved verbatim; only the
        /// decimal length at offset `2..13` is interpreted, per the open question
        /// about the rest of this header being undocumented.
        meta: [u8; LEGACY_CHUNK_META_LEN],
        payload: Bytes,
    },
    LegacyTerminator,
}

/// Buffered reader/writer over a socket, accumulating bytes until a full frame is
/// available before handing it back.
pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Framed<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub fn into_inner(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S> Framed<S>
where
    S: Read,
{
    fn fill(&mut self) -> DecodeResult<usize> {
        let mut tmp = [0_u8; 4096];
        let n = self
            .stream
            .read(&mut tmp)
            .map_err(|e| DecodeError::other("frame io", "read from socket failed").with_source(e))?;
        self.buf.extend_from_slice(&tmp[..n]);
        Ok(n)
    }

    fn require(&mut self, len: usize) -> DecodeResult<()> {
        while self.buf.len() < len {
            if self.fill()? == 0 {
                return Err(DecodeError::truncated_frame("frame io"));
            }
        }
        Ok(())
    }

    /// Peeks one byte and dispatches on the envelope prefix.
    pub fn read_frame(&mut self) -> DecodeResult<Frame> {
        self.require(1)?;
        match self.buf[0] {
            MODERN_PREFIX => self.read_modern_frame(),
            LEGACY_CHUNK_PREFIX => self.read_legacy_chunked_frame(),
            LEGACY_TERMINATOR_PREFIX => self.read_legacy_terminator_frame(),
            got => Err(DecodeError::unexpected_prefix("frame prefix", got)),
        }
    }

    fn read_modern_frame(&mut self) -> DecodeResult<Frame> {
        self.require(MODERN_HEADER_LEN)?;
        let total_len = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
        if total_len < MODERN_HEADER_LEN {
            return Err(DecodeError::invalid_field("modern frame", "length", "shorter than the header itself"));
        }

        self.require(total_len)?;
        let raw = self.buf.split_to(total_len).freeze();

        if !crc::verify(&raw[4..], [raw[1], raw[2], raw[3]]) {
            tracing::warn!(total_len, "modern frame failed checksum verification");
            return Err(DecodeError::bad_checksum("modern frame"));
        }

        let message_type = u16::from_be_bytes([raw[6], raw[7]]);
        let timestamp = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        tracing::trace!(message_type, timestamp, total_len, "read modern frame");

        Ok(Frame::Modern {
            message_type,
            timestamp,
            raw,
        })
    }

    fn read_legacy_chunked_frame(&mut self) -> DecodeResult<Frame> {
        self.require(LEGACY_CHUNK_LEN)?;
        let first = self.buf.split_to(LEGACY_CHUNK_LEN).freeze();

        let meta: [u8; LEGACY_CHUNK_META_LEN] = first[..LEGACY_CHUNK_META_LEN]
            .try_into()
            .expect("chunk is at least META_LEN bytes long");
        let mut payload = BytesMut::from(&first[LEGACY_CHUNK_META_LEN..]);

        let mut remaining = decimal_field(&first[2..13])?;
        while remaining > LEGACY_CHUNK_PAYLOAD_LEN {
            self.require(LEGACY_CHUNK_LEN)?;
            let chunk = self.buf.split_to(LEGACY_CHUNK_LEN).freeze();
            payload.extend_from_slice(&chunk[LEGACY_CHUNK_META_LEN..]);
            remaining = decimal_field(&chunk[2..13])?;
        }

        Ok(Frame::LegacyChunked {
            meta,
            payload: payload.freeze(),
        })
    }

    fn read_legacy_terminator_frame(&mut self) -> DecodeResult<Frame> {
        self.require(LEGACY_TERMINATOR_LEN)?;
        self.buf.split_to(LEGACY_TERMINATOR_LEN);
        Ok(Frame::LegacyTerminator)
    }
}

impl<S> Framed<S>
where
    S: Write,
{
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }
}

fn decimal_field(bytes: &[u8]) -> DecodeResult<usize> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| DecodeError::invalid_field("legacy chunk", "length", "not ASCII"))?;
    text.trim()
        .parse::<usize>()
        .map_err(|_| DecodeError::invalid_field("legacy chunk", "length", "not a decimal integer"))
}

/// Builds a modern (`0x2F`) frame: a 16-byte header (length, type, timestamp,
/// null-padded), a check byte, and a CRC, ahead of `body`.
pub fn write_frame(message_type: u16, timestamp: u32, body: &[u8]) -> Bytes {
    let total_len = (body.len() + MODERN_HEADER_LEN) as u16;

    let mut header = [0_u8; 16];
    let mut cursor = WriteCursor::new(&mut header);
    cursor.write_u16_be(total_len);
    cursor.write_u16_be(message_type);
    cursor.write_u32_be(timestamp);

    let mut header_and_body = BytesMut::with_capacity(header.len() + body.len());
    header_and_body.extend_from_slice(&header);
    header_and_body.extend_from_slice(body);

    let (check_byte, crc_bytes) = crc::checkbytes(&header_and_body);

    let mut frame = BytesMut::with_capacity(4 + header_and_body.len());
    frame.extend_from_slice(&[MODERN_PREFIX, check_byte, crc_bytes[0], crc_bytes[1]]);
    frame.extend_from_slice(&header_and_body);
    frame.freeze()
}

/// Wraps a 147-byte legacy vendor request: `prefix || check_byte || body`, null-padded
/// to the fixed chunk length. Used for the LEGACY-dialect feature query and status
/// query, which bypass the modern envelope entirely.
pub fn write_legacy_request(prefix: u8, check_byte: u8, body: &[u8]) -> [u8; LEGACY_CHUNK_LEN] {
    let mut packet = [0_u8; LEGACY_CHUNK_LEN];
    packet[0] = prefix;
    packet[1] = check_byte;
    let n = body.len().min(LEGACY_CHUNK_LEN - 2);
    packet[2..2 + n].copy_from_slice(&body[..n]);
    packet
}

/// Null-pads an already-built legacy request blob out to the fixed chunk length, with
/// no prefix/check-byte framing of its own. Used for the LEGACY-dialect feature query,
/// whose request is a fixed opaque magic rather than a checksummed envelope.
pub fn pad_legacy_blob(bytes: &[u8]) -> [u8; LEGACY_CHUNK_LEN] {
    let mut packet = [0_u8; LEGACY_CHUNK_LEN];
    let n = bytes.len().min(LEGACY_CHUNK_LEN);
    packet[..n].copy_from_slice(&bytes[..n]);
    packet
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    #[test]
    fn write_then_read_modern_frame_round_trips() {
        let body = b"\x01\x04hello\0world\0";
        let packet = write_frame(0x0108, 0x6162_6364, body);

        let mut framed = Framed::new(Cursor::new(packet.to_vec()));
        let frame = framed.read_frame().unwrap();

        match frame {
            Frame::Modern { message_type, timestamp, raw } => {
                assert_eq!(message_type, 0x0108);
                assert_eq!(timestamp, 0x6162_6364);
                assert_eq!(&raw[20..], &body[..]);
            }
            other => panic!("expected modern frame, got {other:?}"),
        }
    }

    #[test]
    fn modern_frame_with_tampered_byte_fails_checksum() {
        let packet = write_frame(0x010E, 0, b"hostname\0daemon\0");
        let mut tampered = packet.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xFF;

        let mut framed = Framed::new(Cursor::new(tampered));
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err.kind(), flexnet_core::DecodeErrorKind::BadChecksum));
    }

    #[rstest]
    #[case(0x00)]
    #[case(0x99)]
    #[case(0xFF)]
    #[case(0x4D)]
    fn unknown_prefix_byte_is_rejected(#[case] prefix: u8) {
        let mut framed = Framed::new(Cursor::new(vec![prefix, 0, 0, 0]));
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err.kind(), flexnet_core::DecodeErrorKind::UnexpectedPrefix { got } if *got == prefix));
    }

    #[test]
    fn legacy_chunk_with_one_chunk_payload_stops_at_134() {
        let mut chunk = vec![0_u8; LEGACY_CHUNK_LEN];
        chunk[0] = LEGACY_CHUNK_PREFIX;
        chunk[2..5].copy_from_slice(b"134");
        chunk[13..13 + 5].copy_from_slice(b"hello");

        let mut framed = Framed::new(Cursor::new(chunk));
        let frame = framed.read_frame().unwrap();
        match frame {
            Frame::LegacyChunked { payload, .. } => assert_eq!(&payload[..5], b"hello"),
            other => panic!("expected legacy chunk, got {other:?}"),
        }
    }

    #[test]
    fn legacy_chunk_reassembles_two_frames() {
        let mut chunk1 = vec![0_u8; LEGACY_CHUNK_LEN];
        chunk1[0] = LEGACY_CHUNK_PREFIX;
        chunk1[2..5].copy_from_slice(b"268");
        chunk1[13..13 + 9].copy_from_slice(b"dlist foo");

        let mut chunk2 = vec![0_u8; LEGACY_CHUNK_LEN];
        chunk2[0] = LEGACY_CHUNK_PREFIX;
        chunk2[2..5].copy_from_slice(b"134");
        chunk2[13..13 + 8].copy_from_slice(b" bar baz");

        let mut stream = chunk1;
        stream.extend_from_slice(&chunk2);

        let mut framed = Framed::new(Cursor::new(stream));
        let frame = framed.read_frame().unwrap();
        match frame {
            Frame::LegacyChunked { payload, .. } => {
                let text: String = payload.iter().filter(|&&b| b != 0).map(|&b| b as char).collect();
                assert_eq!(text, "dlist foo bar baz");
            }
            other => panic!("expected legacy chunk, got {other:?}"),
        }
    }

    #[test]
    fn legacy_terminator_consumes_exactly_two_bytes() {
        let mut stream = vec![LEGACY_TERMINATOR_PREFIX, 0x00];
        stream.extend_from_slice(b"leftover");

        let mut framed = Framed::new(Cursor::new(stream));
        let frame = framed.read_frame().unwrap();
        assert!(matches!(frame, Frame::LegacyTerminator));

        let (_, leftover) = framed.into_inner();
        assert_eq!(&leftover[..], b"leftover");
    }
}
