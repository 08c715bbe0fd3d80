use core::fmt;

pub type ParseResult<T> = Result<T, ParseError>;
pub type ParseError = flexnet_error::Error<ParseErrorKind>;

#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum ParseErrorKind {
    /// A `SERVER`/`VENDOR`/`DAEMON`/`INCREMENT`/`FEATURE` line has fewer tokens than the
    /// keyword requires.
    MissingToken { keyword: &'static str, index: usize },
    /// The `quantity` field of an `INCREMENT`/`FEATURE` line is neither `uncounted` nor an integer.
    InvalidQuantity { value: String },
    /// A bare trailing integer where a port number was expected on a `SERVER` line.
    InvalidPort { value: String },
}

impl std::error::Error for ParseErrorKind {}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken { keyword, index } => {
                write!(f, "{keyword} line is missing token at index {index}")
            }
            Self::InvalidQuantity { value } => write!(f, "invalid quantity `{value}`"),
            Self::InvalidPort { value } => write!(f, "invalid port `{value}`"),
        }
    }
}
