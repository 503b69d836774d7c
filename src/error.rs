//! Error types for flavor negotiation and data translation.

use thiserror::Error;

/// Result type for transfer operations
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Errors that can occur during flavor mapping and data translation
#[derive(Error, Debug)]
pub enum TransferError {
    /// The source does not provide data in the requested flavor
    #[error("unsupported flavor: {0}")]
    UnsupportedFlavor(String),

    /// Data translation between a flavor and a native format failed
    #[error("data translation failed: {0}")]
    TranslationFailed(String),

    /// Charset is not supported by any built-in codec
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// MIME type string could not be parsed
    #[error("invalid MIME type: {0}")]
    InvalidMimeType(String),

    /// Invalid UTF-8 data
    #[error("invalid UTF-8 data")]
    InvalidUtf8,

    /// Invalid UTF-16 data
    #[error("invalid UTF-16 data")]
    InvalidUtf16,

    /// Image decode error
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Image encode error
    #[error("image encode error: {0}")]
    ImageEncode(String),

    /// Data size exceeded maximum
    #[error("data size {actual} exceeds maximum {max}")]
    DataSizeExceeded {
        /// Actual size in bytes
        actual: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },

    /// Clipboard backend could not be reached or has shut down
    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Returns true if this error indicates a data-format issue
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::TranslationFailed(_)
                | Self::UnsupportedEncoding(_)
                | Self::InvalidMimeType(_)
                | Self::InvalidUtf8
                | Self::InvalidUtf16
                | Self::ImageDecode(_)
                | Self::ImageEncode(_)
        )
    }

    /// Returns true if this error is recoverable by retrying the transfer
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ClipboardUnavailable(_) | Self::Io(_))
    }
}

impl From<TransferError> for std::io::Error {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
