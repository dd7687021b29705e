pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the block containers themselves
#[derive(Debug, thiserror::Error)]
pub enum CompressionError
{
    #[error("invalid block header magic: {0:02x?}")]
    BadMagic(Vec<u8>),

    #[error("expected {expected} bytes after decompression, found {found}")]
    SizeMismatch {
        expected: usize,
        found: usize,
    },

    #[error("block truncated: expected {expected} bytes, read {found}")]
    Truncated {
        expected: usize,
        found: usize,
    },

    #[error("block checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    Checksum {
        stored: u32,
        computed: u32,
    },

    #[error("unknown block codec tag {0}")]
    UnknownCodec(u8),

    #[error("block of {0} bytes does not fit the container")]
    Oversized(usize),

    #[error("in-block offset {offset} is past the end of a {len} byte block")]
    BadBlockOffset {
        offset: usize,
        len: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error
{
    /// Structurally invalid index or container bytes
    #[error("format error: {0}")]
    Format(String),

    #[error("compression format error: {0}")]
    Compression(#[from] CompressionError),

    /// The caller handed in something invalid
    #[error("input error: {0}")]
    Input(String),

    #[error("unable to decode index: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("unable to encode index: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("invalid json record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid parameters: {0}")]
    Parameters(#[from] serde_yml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers to separate user faults from
/// system faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind
{
    Format,
    Input,
    Io,
}

impl Error
{
    pub fn kind(&self) -> ErrorKind
    {
        match self {
            Error::Format(_)
            | Error::Compression(_)
            | Error::Decode(_)
            | Error::Encode(_) => ErrorKind::Format,
            Error::Input(_) | Error::Json(_) | Error::Parameters(_) => {
                ErrorKind::Input
            }
            Error::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
                ) =>
            {
                ErrorKind::Format
            }
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_format_error(&self) -> bool
    {
        self.kind() == ErrorKind::Format
    }

    pub fn is_input_error(&self) -> bool
    {
        self.kind() == ErrorKind::Input
    }

    pub(crate) fn format<S: Into<String>>(msg: S) -> Self
    {
        Error::Format(msg.into())
    }

    pub(crate) fn input<S: Into<String>>(msg: S) -> Self
    {
        Error::Input(msg.into())
    }
}

/// Lets the block readers satisfy `std::io::Read` while keeping the
/// compression error recoverable with `Error::from_io`
impl From<CompressionError> for std::io::Error
{
    fn from(e: CompressionError) -> Self
    {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}

impl Error
{
    /// Unwraps a compression error that travelled through `std::io`
    pub(crate) fn from_io(e: std::io::Error) -> Self
    {
        if !e.get_ref().is_some_and(|inner| inner.is::<CompressionError>()) {
            return Error::Io(e);
        }
        let kind = e.kind();
        match e.into_inner().map(|inner| inner.downcast::<CompressionError>()) {
            Some(Ok(inner)) => Error::Compression(*inner),
            Some(Err(inner)) => Error::Io(std::io::Error::new(kind, inner)),
            None => Error::Io(std::io::Error::from(kind)),
        }
    }

    /// For `std::io` trait impls, the inverse of `from_io`
    pub(crate) fn into_io(self) -> std::io::Error
    {
        match self {
            Error::Io(e) => e,
            Error::Compression(e) => e.into(),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn kinds_separate_user_and_system_faults()
    {
        assert_eq!(Error::input("start > end").kind(), ErrorKind::Input);
        assert_eq!(Error::format("bad magic").kind(), ErrorKind::Format);
        assert!(Error::Compression(CompressionError::BadMagic(vec![0, 1]))
            .is_format_error());
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(Error::Io(eof).is_format_error());
        let denied =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(Error::Io(denied).kind(), ErrorKind::Io);
    }

    #[test]
    fn compression_error_survives_io_round_trip()
    {
        let io: std::io::Error = CompressionError::SizeMismatch {
            expected: 10,
            found: 4,
        }
        .into();
        match Error::from_io(io) {
            Error::Compression(CompressionError::SizeMismatch {
                expected,
                found,
            }) => {
                assert_eq!(expected, 10);
                assert_eq!(found, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
