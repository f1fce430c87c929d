use std::io;
use thiserror::Error;

/// Errors reported while building a multipart body.
///
/// Failures that happen while the composed stream is drained are reported through
/// [`std::io::Error`], as required by the [`std::io::Read`] contract.
#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("invalid boundary: {reason}")]
    InvalidBoundary { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl MultipartError {
    pub fn invalid_boundary<S: ToString>(str: S) -> Self {
        Self::InvalidBoundary { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if this error came from the filesystem or another I/O source
    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self, MultipartError::Io { .. })
    }
}
