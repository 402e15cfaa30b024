//! Error types for I/O operations.
//!
//! Every plugin reports failures through [`IoError`]. Callers that only need
//! the category (a directory scan deciding whether to skip an entry, the CLI
//! choosing an exit message) use [`IoError::kind`].

use std::io;
use std::path::Path;

use thiserror::Error;

/// I/O operation error.
#[derive(Debug, Error)]
pub enum IoError {
    /// A caller supplied an unusable value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Neither the path nor any file of its sequence exists.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// No plugin claims the file extension.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The plugin recognises the file but not this sub-variant
    /// (compression, bit depth, descriptor...).
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// Header or data inconsistent with the format.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The codec failed while producing pixels or samples.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// The codec failed while writing.
    #[error("encode failure: {0}")]
    EncodeFailure(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Error from reel-core (conversion, buffer sizing, parsing).
    #[error(transparent)]
    Core(#[from] reel_core::Error),
}

/// Category of an [`IoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`IoError::InvalidArgument`].
    InvalidArgument,
    /// See [`IoError::Io`].
    Io,
    /// See [`IoError::FileNotFound`].
    FileNotFound,
    /// See [`IoError::UnsupportedFormat`].
    UnsupportedFormat,
    /// See [`IoError::UnsupportedVariant`].
    UnsupportedVariant,
    /// See [`IoError::CorruptData`].
    CorruptData,
    /// See [`IoError::DecodeFailure`].
    DecodeFailure,
    /// See [`IoError::EncodeFailure`].
    EncodeFailure,
    /// See [`IoError::Config`].
    Config,
}

impl IoError {
    /// Category of this error. Core errors count as invalid arguments.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::Core(_) => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::Io,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::UnsupportedVariant(_) => ErrorKind::UnsupportedVariant,
            Self::CorruptData(_) => ErrorKind::CorruptData,
            Self::DecodeFailure(_) => ErrorKind::DecodeFailure,
            Self::EncodeFailure(_) => ErrorKind::EncodeFailure,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// [`IoError::FileNotFound`] for a path.
    pub fn not_found(path: &Path) -> Self {
        Self::FileNotFound(path.display().to_string())
    }

    /// Maps a short read to [`IoError::CorruptData`], keeping other I/O errors.
    pub fn truncated(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::CorruptData(format!("{what}: unexpected end of file"))
        } else {
            Self::Io(err)
        }
    }
}

/// Result type for I/O operations.
pub type IoResult<T> = Result<T, IoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(IoError::FileNotFound("a".into()).kind(), ErrorKind::FileNotFound);
        let core = IoError::from(reel_core::Error::invalid_argument("x"));
        assert_eq!(core.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_truncated() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(IoError::truncated(eof, "header").kind(), ErrorKind::CorruptData);
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert_eq!(IoError::truncated(denied, "header").kind(), ErrorKind::Io);
    }
}
