use core::fmt;

pub type DecodeResult<T> = Result<T, DecodeError>;
pub type DecodeError = flexnet_error::Error<DecodeErrorKind>;

/// Decode failures shared by the framing codec (C1) and the message parser (C2).
///
/// This enum doubles as the `ProtocolError` taxonomy from the specification:
/// `UnexpectedPrefix`, `BadChecksum`, `TruncatedFrame` and `UnknownMessageType`
/// are all decode-time failures, so they live here rather than in a separate type.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum DecodeErrorKind {
    NotEnoughBytes { received: usize, expected: usize },
    InvalidField { field: &'static str, reason: &'static str },
    /// First byte of a frame is not one of `{0x2F, 0x4C, 0x4E}`.
    UnexpectedPrefix { got: u8 },
    /// Check byte or CRC recomputed over a frame disagrees with the value on the wire.
    BadChecksum,
    /// Stream ended before the number of bytes declared by the frame header were received.
    TruncatedFrame,
    /// No decoding rule exists for this 16-bit message type code.
    UnknownMessageType { got: u16 },
    Other { description: &'static str },
}

impl std::error::Error for DecodeErrorKind {}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnoughBytes { received, expected } => write!(
                f,
                "not enough bytes provided to decode: received {received} bytes, expected {expected} bytes"
            ),
            Self::InvalidField { field, reason } => write!(f, "invalid `{field}`: {reason}"),
            Self::UnexpectedPrefix { got } => write!(f, "unexpected frame prefix byte (0x{got:02X})"),
            Self::BadChecksum => write!(f, "check byte or CRC mismatch"),
            Self::TruncatedFrame => write!(f, "stream ended before the declared frame length"),
            Self::UnknownMessageType { got } => write!(f, "unknown message type (0x{got:04X})"),
            Self::Other { description } => write!(f, "{description}"),
        }
    }
}

pub trait DecodeErrorExt {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self;
    fn invalid_field(context: &'static str, field: &'static str, reason: &'static str) -> Self;
    fn unexpected_prefix(context: &'static str, got: u8) -> Self;
    fn bad_checksum(context: &'static str) -> Self;
    fn truncated_frame(context: &'static str) -> Self;
    fn unknown_message_type(context: &'static str, got: u16) -> Self;
    fn other(context: &'static str, description: &'static str) -> Self;
}

impl DecodeErrorExt for DecodeError {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self {
        Self::new(context, DecodeErrorKind::NotEnoughBytes { received, expected })
    }

    fn invalid_field(context: &'static str, field: &'static str, reason: &'static str) -> Self {
        Self::new(context, DecodeErrorKind::InvalidField { field, reason })
    }

    fn unexpected_prefix(context: &'static str, got: u8) -> Self {
        Self::new(context, DecodeErrorKind::UnexpectedPrefix { got })
    }

    fn bad_checksum(context: &'static str) -> Self {
        Self::new(context, DecodeErrorKind::BadChecksum)
    }

    fn truncated_frame(context: &'static str) -> Self {
        Self::new(context, DecodeErrorKind::TruncatedFrame)
    }

    fn unknown_message_type(context: &'static str, got: u16) -> Self {
        Self::new(context, DecodeErrorKind::UnknownMessageType { got })
    }

    fn other(context: &'static str, description: &'static str) -> Self {
        Self::new(context, DecodeErrorKind::Other { description })
    }
}

impl From<crate::NotEnoughBytesError> for DecodeError {
    fn from(e: crate::NotEnoughBytesError) -> Self {
        Self::not_enough_bytes("cursor", e.received(), e.expected())
    }
}
