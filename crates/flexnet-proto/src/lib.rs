//! Wire framing (C1) and message parsing/serializing (C2) for the FlexNet license
//! protocol: three envelope variants, a custom 14-bit CRC, and the version-straddling
//! message layout that changed around server version 11.10.

mod crc;
mod frame;
mod message;

pub use crc::{checkbytes, verify};
pub use frame::{
    pad_legacy_blob, write_frame, write_legacy_request, Frame, Framed, LEGACY_CHUNK_PREFIX, LEGACY_TERMINATOR_PREFIX,
    MODERN_PREFIX,
};
pub use message::{
    decode_message, encode_hello, encode_legacy_status_request, encode_req_body, encode_reqlic_body, HelloFields,
    Message, MessageType, UsageRecord, LEGACY_FEATURE_QUERY_MAGIC, LICSET_REQUEST_BODY, STUB_DEFAULT_BODY,
};
