//! Crate-wide error type.

use thiserror::Error;

/// Errors produced by the JPEG 2000 codec.
///
/// Variants follow the propagation policy: parameter validation fails fast
/// before any byte is touched, malformed-stream conditions are reported with
/// enough context to locate the offending marker/packet, and truncation is
/// distinguished from corruption so callers can decide whether a partial
/// result is usable.
#[derive(Error, Debug)]
pub enum J2kError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("malformed codestream: {0}")]
    MalformedStream(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("tier-1 decode inconsistency: {0}")]
    T1Inconsistency(String),

    #[error("codestream truncated: {0}")]
    Truncated(String),

    #[error("internal invariant violated: {0}")]
    InternalError(String),
}

impl From<super::jpeg2000::bit_io::BitIoError> for J2kError {
    fn from(_: super::jpeg2000::bit_io::BitIoError) -> Self {
        J2kError::Truncated("bit reader ran out of data".to_string())
    }
}

pub type Result<T> = std::result::Result<T, J2kError>;
