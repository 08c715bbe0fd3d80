//! Typed encode/decode between frames and message values (C2).
//!
//! Each modern (`0x2F`) frame's common 20-byte preamble is extended by a few more
//! type-specific fields before the null-separated text payload begins; `HEADERLENS`
//! below is `examples/original_source/client.py`'s `HEADERLENS` table, renamed to a
//! method on [`MessageType`].

use flexnet_core::{DecodeError, DecodeErrorExt, DecodeResult, ReadCursor, WriteBuf};

use crate::frame::Frame;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    /// client -> manager: a command (empty, `dlist`, `getpaths`).
    Req = 0x0108,
    /// server -> client: greeting with server version, hostname, daemon name.
    Hello = 0x010E,
    /// vendor-manager -> client: redirect to a vendor daemon's host and port.
    Stubr = 0x0113,
    /// vendor -> client: one usage record (checkout or group reservation).
    ReqLic2 = 0x0114,
    /// client -> vendor: request the vendor's license catalog.
    LicSet = 0x0127,
    /// vendor -> client: license catalog payload.
    Stub2 = 0x0128,
    /// client -> vendor: generic vendor request (feature list).
    Stub = 0x013B,
    /// client -> vendor: license status query by feature + signature.
    ReqLic = 0x013C,
    /// manager -> client: generic response to `Req`.
    Resp = 0x0146,
    /// vendor -> client: license status (usage counters + timestamp).
    ReqLic1 = 0x004E,
}

impl MessageType {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0x0108 => Some(Self::Req),
            0x010E => Some(Self::Hello),
            0x0113 => Some(Self::Stubr),
            0x0114 => Some(Self::ReqLic2),
            0x0127 => Some(Self::LicSet),
            0x0128 => Some(Self::Stub2),
            0x013B => Some(Self::Stub),
            0x013C => Some(Self::ReqLic),
            0x0146 => Some(Self::Resp),
            0x004E => Some(Self::ReqLic1),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Bytes preceding the text payload in a modern frame of this type, counted from
    /// the start of the frame (including the 4-byte prefix).
    pub fn header_len(self) -> usize {
        match self {
            Self::ReqLic1 | Self::Stubr | Self::ReqLic2 | Self::Stub2 | Self::ReqLic | Self::LicSet => 20,
            Self::Req => 22,
            Self::Hello | Self::Stub | Self::Resp => 24,
        }
    }
}

/// Wire-level shape of a `0x0114` usage record. `flexnet-client`'s domain model
/// re-exports this directly as its `UsageRecord` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageRecord {
    GroupReservation {
        name: String,
    },
    Checkout {
        user: String,
        host: String,
        tty: String,
        version: String,
        start_time: u32,
        opaque: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello {
        hostname: String,
        daemon: String,
        server_version: (u8, u8),
    },
    Stubr {
        vendor_hostname: String,
        vendor_port: u32,
    },
    Stub2 {
        fields: Vec<String>,
    },
    ReqLic1 {
        used: u32,
        total: u32,
        timestamp: u32,
    },
    ReqLic2(UsageRecord),
    /// Decoded output for everything else: `REQ`'s `RESP`, `STUB`'s feature list,
    /// legacy (`0x4C`) text, and any other modern type with no special-cased fields.
    Text {
        fields: Vec<String>,
    },
    /// The `0x4E` sentinel that closes a legacy exchange.
    Terminator,
}

pub fn decode_message(frame: &Frame) -> DecodeResult<Message> {
    match frame {
        Frame::LegacyTerminator => Ok(Message::Terminator),
        Frame::LegacyChunked { payload, .. } => Ok(Message::Text {
            fields: legacy_text_fields(payload),
        }),
        Frame::Modern { message_type, raw, .. } => {
            let kind = MessageType::from_u16(*message_type).ok_or_else(|| {
                tracing::warn!(message_type, "no decoding rule for this message type");
                DecodeError::unknown_message_type("message decode", *message_type)
            })?;

            let header_len = kind.header_len();
            if raw.len() < header_len {
                return Err(DecodeError::truncated_frame("message decode"));
            }
            let body = &raw[header_len..];

            match kind {
                MessageType::Hello => decode_hello(raw, body),
                MessageType::Stubr => decode_stubr(body),
                MessageType::Stub2 => Ok(Message::Stub2 { fields: stub2_fields(body) }),
                MessageType::ReqLic1 => decode_reqlic1(body),
                MessageType::ReqLic2 => decode_reqlic2(body).map(Message::ReqLic2),
                _ => Ok(Message::Text {
                    fields: strip_and_split_nulls(body),
                }),
            }
        }
    }
}

fn decode_hello(raw: &[u8], body: &[u8]) -> DecodeResult<Message> {
    if raw.len() < 24 {
        return Err(DecodeError::truncated_frame("HELLO header"));
    }
    let server_version = (raw[20], raw[21]);

    let fields = strip_and_split_nulls(body);
    if fields.len() < 2 {
        return Err(DecodeError::invalid_field("HELLO", "body", "expected hostname and daemon fields"));
    }

    Ok(Message::Hello {
        hostname: fields[0].clone(),
        daemon: fields[1].clone(),
        server_version,
    })
}

fn decode_stubr(body: &[u8]) -> DecodeResult<Message> {
    let null_pos = body
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| DecodeError::invalid_field("STUBR", "body", "missing hostname terminator"))?;
    let vendor_hostname = String::from_utf8_lossy(&body[..null_pos]).into_owned();

    let mut cursor = ReadCursor::new(&body[null_pos + 1..]);
    let vendor_port = cursor
        .try_read_u32_be()
        .map_err(|_| DecodeError::invalid_field("STUBR", "vendor_port", "truncated port field"))?;

    Ok(Message::Stubr { vendor_hostname, vendor_port })
}

fn decode_reqlic1(body: &[u8]) -> DecodeResult<Message> {
    if body.len() < 2 {
        return Err(DecodeError::not_enough_bytes("REQLIC1", body.len(), 2));
    }
    let fields = strip_and_split_nulls(&body[2..]);
    if fields.len() < 3 {
        return Err(DecodeError::invalid_field("REQLIC1", "body", "expected used/total/timestamp fields"));
    }

    let used = fields[0]
        .parse::<u32>()
        .map_err(|_| DecodeError::invalid_field("REQLIC1", "used", "not a decimal integer"))?;
    let total = fields[1]
        .parse::<u32>()
        .map_err(|_| DecodeError::invalid_field("REQLIC1", "total", "not a decimal integer"))?;
    let timestamp = fields[2]
        .parse::<u32>()
        .map_err(|_| DecodeError::invalid_field("REQLIC1", "timestamp", "not a decimal integer"))?;

    Ok(Message::ReqLic1 { used, total, timestamp })
}

fn decode_reqlic2(body: &[u8]) -> DecodeResult<UsageRecord> {
    let marker_pos = body
        .iter()
        .position(|&b| b == 0x01)
        .ok_or_else(|| DecodeError::invalid_field("REQLIC2", "body", "missing 0x01 marker"))?;

    let before = &body[..marker_pos];
    let after = &body[marker_pos + 1..];
    let text = strip_and_split_nulls(before);

    let after_is_all_zero = after.iter().all(|&b| b == 0);
    if after_is_all_zero && text.first().is_some_and(|s| s.starts_with('G')) {
        return Ok(UsageRecord::GroupReservation {
            name: text[0][1..].to_owned(),
        });
    }

    if text.len() < 4 {
        return Err(DecodeError::invalid_field("REQLIC2", "text", "expected user/host/tty/version fields"));
    }
    if after.len() < 16 {
        return Err(DecodeError::not_enough_bytes("REQLIC2", after.len(), 16));
    }

    let mut cursor = ReadCursor::new(&after[4..16]);
    let start_time = cursor.read_u32_be();
    let opaque = cursor.read_u64_be();

    Ok(UsageRecord::Checkout {
        user: text[0].clone(),
        host: text[1].clone(),
        tty: text[2].clone(),
        version: text[3].clone(),
        start_time,
        opaque,
    })
}

/// `STUB2` fields: null-separated, with `0x01`/`0x07` bytes trimmed off each one.
fn stub2_fields(body: &[u8]) -> Vec<String> {
    body.split(|&b| b == 0)
        .map(|segment| trim_byte_set(segment, &[0x01, 0x07]))
        .filter(|segment| !segment.is_empty())
        .map(|segment| String::from_utf8_lossy(segment).into_owned())
        .collect()
}

/// Trims leading/trailing null bytes, splits interior nulls into fields, drops empties.
/// Matches the generic `else` branch of the upstream response parser.
fn strip_and_split_nulls(body: &[u8]) -> Vec<String> {
    trim_byte_set(body, &[0])
        .split(|&b| b == 0)
        .filter(|segment| !segment.is_empty())
        .map(|segment| String::from_utf8_lossy(segment).into_owned())
        .collect()
}

/// Legacy chunked payloads pad each 134-byte segment with trailing nulls; those nulls
/// are chunk padding, not field separators, so every null byte in the reassembled
/// payload is removed rather than treated as a split point.
fn legacy_text_fields(payload: &[u8]) -> Vec<String> {
    let text: String = payload.iter().filter(|&&b| b != 0).map(|&b| b as char).collect();
    if text.is_empty() {
        Vec::new()
    } else {
        vec![text]
    }
}

fn trim_byte_set<'a>(bytes: &'a [u8], set: &[u8]) -> &'a [u8] {
    let start = bytes.iter().position(|b| !set.contains(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !set.contains(b)).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

/// Fixed-width, null-padded HELLO identity fields, sent outside of C1's modern
/// envelope framing (the HELLO prefix is its own 4-byte, non-`0x2F` scheme).
#[derive(Debug, Clone, Copy)]
pub struct HelloFields<'a> {
    pub user: &'a str,
    pub host: &'a str,
    pub vendor: &'a str,
    pub tty: &'a str,
    pub pid: &'a str,
    pub arch: &'a str,
    pub version: (u8, u8),
}

const HELLO_MARKER_BYTE: u8 = 0x84;
const HELLO_TRAILER: &[u8] = b"78\x0014\x00";
const HELLO_PREFIX_MAGIC: (u8, u8, u8) = (0x68, 0x31, 0x33);

/// Builds the complete HELLO packet (4-byte prefix + body), ready to write directly
/// to the socket without going through [`crate::frame::write_frame`].
pub fn encode_hello(fields: &HelloFields<'_>) -> Vec<u8> {
    let mut body = WriteBuf::new();
    for chunk in [
        pad_null(fields.user.as_bytes(), 20),
        pad_null(fields.host.as_bytes(), 32),
        pad_null(fields.vendor.as_bytes(), 10),
        pad_null(fields.tty.as_bytes(), 32),
        pad_null(&[HELLO_MARKER_BYTE], 12),
        pad_null(fields.pid.as_bytes(), 10),
        pad_null(fields.arch.as_bytes(), 12),
    ] {
        body.write_slice(&chunk);
        body.write_slice(&[0]);
    }
    body.write_slice(&[fields.version.0, fields.version.1]);
    body.write_slice(HELLO_TRAILER);

    let body = body.filled();
    let check_byte = (body[..body.len() - 2].iter().map(|&b| u32::from(b)).sum::<u32>() % 256) as u8;

    let mut packet = WriteBuf::new();
    packet.write_slice(&[HELLO_PREFIX_MAGIC.0, check_byte, HELLO_PREFIX_MAGIC.1, HELLO_PREFIX_MAGIC.2]);
    packet.write_slice(body);
    packet.filled().to_vec()
}

fn pad_null(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut v = bytes.to_vec();
    if v.len() < width {
        v.resize(width, 0);
    }
    v
}

/// Builds a `REQ` body: `0x01 0x04 || user\0 || host\0 || server_daemon\0 || tty\0 || command\0`.
/// Framed by [`crate::frame::write_frame`] with `message_type = MessageType::Req`.
pub fn encode_req_body(user: &str, host: &str, server_daemon: &str, tty: &str, command: &str) -> Vec<u8> {
    let mut body = WriteBuf::new();
    body.write_slice(&[0x01, 0x04]);
    for field in [user, host, server_daemon, tty, command] {
        body.write_slice(field.as_bytes());
        body.write_slice(&[0]);
    }
    body.filled().to_vec()
}

/// Fixed magic bytes a MODERN-dialect vendor connection sends for a generic feature
/// query (`STUB`, no particular feature named).
pub const STUB_DEFAULT_BODY: [u8; 4] = [0x31, 0x00, 0x30, 0x00];

/// Fixed magic bytes the LEGACY-dialect feature query sends in place of a `STUB` frame.
pub const LEGACY_FEATURE_QUERY_MAGIC: [u8; 4] = [0x3D, 0xDA, 0x6C, 0x31];

/// Catalog request body for `LICSET`, a fixed 5-byte marker with no per-query fields.
pub const LICSET_REQUEST_BODY: [u8; 5] = [0x01, 0x00, 0x00, 0x00, 0x00];

/// Builds a `REQLIC` status-query body: `feature\0` || `sign` truncated to 20 bytes ||
/// four reserved zero bytes || the `0x01` request marker.
pub fn encode_reqlic_body(feature: &str, sign: &str) -> Vec<u8> {
    let mut body = WriteBuf::new();
    body.write_slice(feature.as_bytes());
    body.write_slice(&[0]);
    let truncated_sign: Vec<u8> = sign.bytes().take(20).collect();
    body.write_slice(&truncated_sign);
    body.write_slice(&[0, 0, 0, 0, 0x01]);
    body.filled().to_vec()
}

/// Builds the 147-byte LEGACY-dialect status-query packet: a `0x6C` prefix, a
/// modular-sum check byte over the fixed-width feature/sign/flag body (a different,
/// simpler checksum than the modern envelope's CRC), null-padded to the chunk length.
pub fn encode_legacy_status_request(feature: &str, sign: &str) -> [u8; crate::frame::LEGACY_CHUNK_LEN] {
    let mut body = pad_null(feature.as_bytes(), 31);
    body.extend_from_slice(&pad_null(sign.as_bytes(), 21));
    body.push(b'1');

    let check_byte = legacy_status_check_byte(&body);
    crate::frame::write_legacy_request(0x6C, check_byte, &body)
}

fn legacy_status_check_byte(body: &[u8]) -> u8 {
    (body.iter().map(|&b| u32::from(b)).sum::<u32>().wrapping_add(108) % 256) as u8
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::frame::{write_frame, MODERN_PREFIX};

    #[test]
    fn hello_packet_matches_known_length_and_prefix() {
        let fields = HelloFields {
            user: "alice",
            host: "work",
            vendor: "",
            tty: "/dev/pts/1",
            pid: "4242",
            arch: "x64_lsb",
            version: (11, 11),
        };
        let packet = encode_hello(&fields);

        assert_eq!(packet[0], 0x68);
        assert_eq!(packet[2], 0x31);
        assert_eq!(packet[3], 0x33);

        let expected_check = (packet[4..packet.len() - 2].iter().map(|&b| u32::from(b)).sum::<u32>() % 256) as u8;
        assert_eq!(packet[1], expected_check);
    }

    #[test]
    fn stubr_decodes_hostname_and_port() {
        let mut body = b"licserver2\0".to_vec();
        body.extend_from_slice(&[0x00, 0x00, 0x6E, 0x1C]);

        match decode_stubr(&body).unwrap() {
            Message::Stubr { vendor_hostname, vendor_port } => {
                assert_eq!(vendor_hostname, "licserver2");
                assert_eq!(vendor_port, 28188);
            }
            other => panic!("expected STUBR, got {other:?}"),
        }
    }

    #[test]
    fn reqlic2_group_reservation_strips_leading_marker() {
        let mut body = b"GroupA\0\0\0\0\0\0".to_vec();
        body.push(0x01);
        body.extend_from_slice(&[0u8; 11]);

        match decode_reqlic2(&body).unwrap() {
            UsageRecord::GroupReservation { name } => assert_eq!(name, "roupA"),
            other => panic!("expected group reservation, got {other:?}"),
        }
    }

    #[test]
    fn reqlic2_checkout_reads_start_time_and_opaque() {
        let mut body = Vec::new();
        for field in ["bob", "host1", "pts/3", "11.11"] {
            body.extend_from_slice(field.as_bytes());
            body.push(0);
        }
        body.push(0x01);
        body.extend_from_slice(&[0u8; 4]); // reserved
        body.extend_from_slice(&0x0102_0304u32.to_be_bytes());
        body.extend_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());

        match decode_reqlic2(&body).unwrap() {
            UsageRecord::Checkout {
                user,
                host,
                tty,
                version,
                start_time,
                opaque,
            } => {
                assert_eq!(user, "bob");
                assert_eq!(host, "host1");
                assert_eq!(tty, "pts/3");
                assert_eq!(version, "11.11");
                assert_eq!(start_time, 0x0102_0304);
                assert_eq!(opaque, 0x1122_3344_5566_7788);
            }
            other => panic!("expected checkout, got {other:?}"),
        }
    }

    #[rstest]
    #[case(&[0xAB, 0xCD])]
    #[case(&[0x00, 0x00])]
    #[case(&[0xFF, 0xFE])] // not valid UTF-8 on its own; must not shift the digit offsets
    fn reqlic1_decodes_used_total_timestamp_past_opaque_prefix(#[case] opaque_prefix: &[u8]) {
        let mut body = opaque_prefix.to_vec();
        body.extend_from_slice(b"3\x0010\x001700000000");

        match decode_message(&Frame::Modern {
            message_type: MessageType::ReqLic1.as_u16(),
            timestamp: 0,
            raw: {
                let mut raw = vec![0u8; MessageType::ReqLic1.header_len()];
                raw.extend_from_slice(&body);
                raw.into()
            },
        })
        .unwrap()
        {
            Message::ReqLic1 { used, total, timestamp } => {
                assert_eq!(used, 3);
                assert_eq!(total, 10);
                assert_eq!(timestamp, 1_700_000_000);
            }
            other => panic!("expected REQLIC1, got {other:?}"),
        }
    }

    #[rstest]
    #[case(b"\0\0dlist\0\0foo\0\0", vec!["dlist", "foo"])]
    #[case(b"dlist", vec!["dlist"])]
    #[case(b"\0\0\0", vec![])]
    #[case(b"a\0\0\0b", vec!["a", "b"])]
    fn generic_text_decode_strips_edges_and_drops_empty_fields(#[case] body: &[u8], #[case] expected: Vec<&str>) {
        let expected: Vec<String> = expected.into_iter().map(str::to_owned).collect();
        assert_eq!(strip_and_split_nulls(body), expected);
    }

    #[test]
    fn reqlic_body_truncates_sign_to_twenty_bytes() {
        let body = encode_reqlic_body("solver", &"x".repeat(30));
        let null_pos = body.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&body[..null_pos], b"solver");
        let sign_field = &body[null_pos + 1..null_pos + 1 + 20];
        assert_eq!(sign_field, "x".repeat(20).as_bytes());
        assert_eq!(*body.last().unwrap(), 0x01);
    }

    #[test]
    fn legacy_status_request_check_byte_matches_modular_sum() {
        let packet = encode_legacy_status_request("solver", "abc123");
        assert_eq!(packet[0], 0x6C);

        let body = &packet[2..2 + 53];
        let expected = (body.iter().map(|&b| u32::from(b)).sum::<u32>() + 108) % 256;
        assert_eq!(packet[1], expected as u8);
        assert_eq!(packet.len(), 147);
    }

    #[test]
    fn resp_round_trips_through_write_frame_and_decode_message() {
        let body = encode_req_body("alice", "work", "lmgrd", "/dev/pts/1", "dlist");
        let packet = write_frame(MessageType::Req.as_u16(), 0, &body);
        assert_eq!(packet[0], MODERN_PREFIX);

        let frame = Frame::Modern {
            message_type: MessageType::Req.as_u16(),
            timestamp: 0,
            raw: packet,
        };
        let message = decode_message(&frame).unwrap();
        match message {
            Message::Text { fields } => assert!(fields.iter().any(|f| f == "dlist")),
            other => panic!("expected generic text, got {other:?}"),
        }
    }
}
