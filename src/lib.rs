// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::enum_variant_names)]
#![allow(clippy::too_many_arguments)]

//! # PDF Seal
//!
//! Signing and verification of digital signatures embedded in PDF documents.
//!
//! ## Core Features
//!
//! - **Incremental Signing**: The signature is appended as an incremental update;
//!   every byte of the source document, including earlier signatures, is kept
//! - **Detached CMS**: RSA PKCS#1 v1.5 envelopes over SHA-1/256/384/512
//! - **PAdES-B**: `ETSI.CAdES.detached` with the signing-certificate-v2 attribute
//! - **Verification**: Per-signature validity, coverage and certificate chain
//! - **Reports**: Simple and summary reports serialized to JSON
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_seal::{PdfDocument, ReportKind};
//! use pdf_seal::signatures::{
//!     PemKeyStore, SignOptions, SignRequest, SignaturePolicy, SigningCredentials,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PemKeyStore::from_pem(&key_pem, &chain_pem)?;
//! let credentials = SigningCredentials::from_first_alias(&store)?;
//! let policy = SignaturePolicy::pades_b(&credentials)?;
//! let request = SignRequest::new(credentials)
//!     .with_policy(policy)
//!     .with_options(SignOptions::default().with_name("Jane Doe"));
//!
//! PdfDocument::open("contract.pdf")?.sign("contract-signed.pdf", &request)?;
//!
//! let report = PdfDocument::open("contract-signed.pdf")?.report(ReportKind::Simple)?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Document handle
pub mod document;

// Signing protocol
pub mod signatures;

// Incremental update writer
pub mod writer;

// Verification reports
pub mod report;

// Re-exports
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use report::{ReportKind, VerificationReport};
