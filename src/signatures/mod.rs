//! PDF Digital Signatures module.
//!
//! This module creates and verifies detached CMS signatures embedded in PDF
//! documents as incremental updates, following the PDF specification and the
//! PAdES baseline profile.
//!
//! ## Features
//!
//! - **Signature Creation**: Sign PDFs with an RSA key and X.509 certificate chain
//! - **Signature Verification**: Check every signature found in a document
//! - **Signed Attributes**: Override or extend the attributes covered by the signature
//! - **ByteRange Calculation**: Reserve, resolve and stream the signed byte ranges
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PAdES signatures (ETSI.CAdES.detached)
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::PdfDocument;
//! use pdf_seal::signatures::{PemKeyStore, SigningCredentials, SignRequest, SignOptions};
//!
//! let store = PemKeyStore::from_pem(&key_pem, &chain_pem)?;
//! let credentials = SigningCredentials::from_first_alias(&store)?;
//! let request = SignRequest::new(credentials)
//!     .with_options(SignOptions::default().with_reason("Approved"));
//!
//! PdfDocument::open("document.pdf")?.sign("signed.pdf", &request)?;
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ETSI EN 319 142-1 - PAdES baseline signatures
//! - RFC 5652 - Cryptographic Message Syntax
//! - RFC 5035 - ESS signing-certificate-v2

mod attributes;
mod backend;
mod byterange;
mod credentials;
mod fields;
mod placement;
mod policy;
mod signer;
mod types;
mod verifier;

pub use attributes::{
    attribute, signing_certificate_v2, AttributeContainer, EssCertIdV2, IssuerSerial,
    SigningCertificateV2, ID_CONTENT_TYPE, ID_MESSAGE_DIGEST, ID_SIGNING_CERTIFICATE_V2,
    ID_SIGNING_TIME,
};
pub use backend::{CmsBackend, SignatureBackend};
pub use byterange::{ByteRange, ByteRangeCalculator, ByteRangeReader};
pub use credentials::{KeyEntry, KeyStore, PemKeyStore, SigningCredentials, DEFAULT_PROVIDER};
pub use fields::{field_names, parse_signature_dictionary, signature_fields, SignatureField};
pub use placement::{PlacementEngine, PlacementState};
pub use policy::{SignRequest, SignaturePolicy, DEFAULT_FILTER};
pub use signer::{PdfSigner, ID_DATA, ID_SIGNED_DATA};
pub use types::{
    format_pdf_date, parse_pdf_date, CertificateSummary, DigestAlgorithm, SignOptions,
    SignatureAlgorithm, SignatureDictionary, SignatureSubFilter, VerificationResult,
    RSA_ENCRYPTION,
};
pub use verifier::{EnvelopeVerification, SignatureVerifier};
