//! Error types for PDF signing and verification.
//!
//! This module defines all error types that can occur while signing a PDF,
//! reading back its signature dictionaries, or building a verification report.

use std::path::PathBuf;

/// Result type alias for signing and verification operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during signing or verification.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// The document to sign does not exist on disk
    #[error("Document for signing does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A required parameter is missing or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the PDF object library
    #[error("PDF library error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// A byte range span reaches past the end of the underlying file
    #[error("ByteRange span {offset}+{length} exceeds file size {file_size}")]
    ByteRangeOutOfBounds {
        /// Start of the offending span
        offset: u64,
        /// Length of the offending span
        length: u64,
        /// Size of the underlying file
        file_size: u64,
    },

    /// Malformed /ByteRange array
    #[error("Invalid ByteRange: {0}")]
    InvalidByteRange(String),

    /// A signature could not be produced
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The validity of a signature could not be determined
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The encoded envelope does not fit into the reserved /Contents placeholder
    #[error("Signature envelope needs {required} hex digits but only {reserved} are reserved")]
    EnvelopeTooLarge {
        /// Hex digits needed for the envelope
        required: usize,
        /// Hex digits reserved in the placeholder
        reserved: usize,
    },

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Report serialization error
    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a cryptographic failure that happened while producing a signature.
    pub(crate) fn signing(err: impl std::fmt::Display) -> Self {
        Error::Signing(err.to_string())
    }

    /// Wrap a cryptographic failure that happened while checking a signature.
    pub(crate) fn verification(err: impl std::fmt::Display) -> Self {
        Error::Verification(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_not_found_error() {
        let err = Error::SourceNotFound(PathBuf::from("/tmp/missing.pdf"));
        let msg = format!("{}", err);
        assert!(msg.contains("does not exist"));
        assert!(msg.contains("missing.pdf"));
    }

    #[test]
    fn test_byte_range_out_of_bounds_error() {
        let err = Error::ByteRangeOutOfBounds {
            offset: 90,
            length: 20,
            file_size: 100,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("90+20"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_envelope_too_large_error() {
        let err = Error::EnvelopeTooLarge {
            required: 5000,
            reserved: 4096,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("5000"));
        assert!(msg.contains("4096"));
    }

    #[test]
    fn test_scoped_crypto_errors() {
        let sign = Error::signing("unsupported algorithm");
        assert!(matches!(sign, Error::Signing(_)));
        assert!(format!("{}", sign).starts_with("Signing failed"));

        let verify = Error::verification("malformed envelope");
        assert!(matches!(verify, Error::Verification(_)));
        assert!(format!("{}", verify).contains("malformed envelope"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
