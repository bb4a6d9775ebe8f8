use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy shared by staging, the compressor and every converter adapter.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable code, used in logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ConvertError::Upload(_) => "UPLOAD_ERROR",
            ConvertError::PayloadTooLarge(_) => "FILE_TOO_LARGE",
            ConvertError::Decode(_) => "DECODE_ERROR",
            ConvertError::Conversion(_) => "CONVERSION_ERROR",
            ConvertError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ConvertError::BadRequest(_) => "BAD_REQUEST",
            ConvertError::Io { .. } | ConvertError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<tokio::task::JoinError> for ConvertError {
    fn from(e: tokio::task::JoinError) -> Self {
        ConvertError::Internal(format!("Blocking task failed: {}", e))
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        assert_eq!(ConvertError::Decode("x".into()).code(), "DECODE_ERROR");
        assert_eq!(ConvertError::Conversion("x".into()).code(), "CONVERSION_ERROR");
        assert_eq!(
            ConvertError::UnsupportedFormat("x".into()).code(),
            "UNSUPPORTED_FORMAT"
        );
        let io = ConvertError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert_eq!(io.code(), "INTERNAL_ERROR");
        assert!(io.to_string().contains("/tmp/x"));
    }
}
