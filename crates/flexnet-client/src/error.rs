//! Error type for the conversation state machine, following the same generic-wrapper
//! shape as `ironrdp-connector`'s `ConnectorErrorKind`/`ConnectorError`.

use core::fmt;

pub type ClientResult<T> = Result<T, ClientError>;
pub type ClientError = flexnet_error::Error<ClientErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum ClientErrorKind {
    Decode(flexnet_core::DecodeError),
    Parse(flexnet_license_file::ParseError),
    Io(std::io::Error),
    /// A response arrived that isn't the kind the current conversation step expects.
    UnexpectedMessage { expected: &'static str },
    General,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(_) => write!(f, "decode error"),
            Self::Parse(_) => write!(f, "license-file parse error"),
            Self::Io(_) => write!(f, "I/O error"),
            Self::UnexpectedMessage { expected } => write!(f, "expected {expected}"),
            Self::General => write!(f, "general error"),
        }
    }
}

impl std::error::Error for ClientErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::UnexpectedMessage { .. } | Self::General => None,
        }
    }
}

pub trait ClientErrorExt {
    fn decode(error: flexnet_core::DecodeError) -> Self;
    fn parse(error: flexnet_license_file::ParseError) -> Self;
    fn io(context: &'static str, error: std::io::Error) -> Self;
    fn unexpected_message(context: &'static str, expected: &'static str) -> Self;
    fn general(context: &'static str) -> Self;
}

impl ClientErrorExt for ClientError {
    fn decode(error: flexnet_core::DecodeError) -> Self {
        Self::new("decode error", ClientErrorKind::Decode(error))
    }

    fn parse(error: flexnet_license_file::ParseError) -> Self {
        Self::new("license-file parse error", ClientErrorKind::Parse(error))
    }

    fn io(context: &'static str, error: std::io::Error) -> Self {
        Self::new(context, ClientErrorKind::Io(error))
    }

    fn unexpected_message(context: &'static str, expected: &'static str) -> Self {
        Self::new(context, ClientErrorKind::UnexpectedMessage { expected })
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, ClientErrorKind::General)
    }
}
