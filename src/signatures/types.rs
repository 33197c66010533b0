//! Digital signature types and data structures.
//!
//! This module defines the core types used for PDF digital signatures.

use std::fmt;
use std::io::{self, Read};

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use der::asn1::ObjectIdentifier;
use der::oid::AssociatedOid;
use der::Encode;
use serde::Serialize;
use sha2::digest::DynDigest;
use x509_cert::Certificate;
use x509_parser::prelude::{FromDer, X509Certificate};

use super::byterange::ByteRange;
use crate::error::{Error, Result};

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (deprecated, but still common in legacy PDFs)
    Sha1,
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Get the OID for this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => sha1::Sha1::OID,
            DigestAlgorithm::Sha256 => sha2::Sha256::OID,
            DigestAlgorithm::Sha384 => sha2::Sha384::OID,
            DigestAlgorithm::Sha512 => sha2::Sha512::OID,
        }
    }

    /// Look up the algorithm for a digest OID found in an envelope.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == *oid)
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Parse a user supplied name such as `sha256` or `SHA-384`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "sha1" => Some(DigestAlgorithm::Sha1),
            "sha256" => Some(DigestAlgorithm::Sha256),
            "sha384" => Some(DigestAlgorithm::Sha384),
            "sha512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// A fresh streaming hasher.
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sha1 => Box::new(<sha1::Sha1 as sha1::Digest>::new()),
            DigestAlgorithm::Sha256 => Box::new(<sha2::Sha256 as sha2::Digest>::new()),
            DigestAlgorithm::Sha384 => Box::new(<sha2::Sha384 as sha2::Digest>::new()),
            DigestAlgorithm::Sha512 => Box::new(<sha2::Sha512 as sha2::Digest>::new()),
        }
    }

    /// Digest a byte slice.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize().into_vec()
    }

    /// Digest everything a reader yields, without buffering it.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> io::Result<Vec<u8>> {
        let mut hasher = self.hasher();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finalize().into_vec())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// rsaEncryption (1.2.840.113549.1.1.1)
pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// Signature algorithm applied with the signer's private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5
    #[default]
    RsaPkcs1v15,
}

impl SignatureAlgorithm {
    /// Algorithm identifier written into the signer info.
    pub fn algorithm_identifier(&self) -> spki::AlgorithmIdentifierOwned {
        match self {
            SignatureAlgorithm::RsaPkcs1v15 => spki::AlgorithmIdentifierOwned {
                oid: RSA_ENCRYPTION,
                parameters: Some(der::Any::null()),
            },
        }
    }

    /// Whether a signer info's signature algorithm OID belongs to this algorithm.
    ///
    /// Envelopes from other producers name the combined `sha*WithRSAEncryption` OIDs.
    pub fn accepts(&self, oid: &ObjectIdentifier) -> bool {
        match self {
            SignatureAlgorithm::RsaPkcs1v15 => [
                RSA_ENCRYPTION,
                SHA1_WITH_RSA,
                SHA256_WITH_RSA,
                SHA384_WITH_RSA,
                SHA512_WITH_RSA,
            ]
            .contains(oid),
        }
    }
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// adbe.pkcs7.sha1 - PKCS#7 with SHA-1 digest
    Pkcs7Sha1,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
    /// ETSI.RFC3161 - Timestamp token
    Rfc3161,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            _ => None,
        }
    }
}

/// Options for signing a PDF.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Name of the signer
    pub name: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Signing time written to `/M`; invocation time when unset
    pub signing_time: Option<DateTime<FixedOffset>>,
    /// Bytes reserved for the DER envelope
    pub estimated_size: usize,
    /// Name of the new signature field; `Signature{n}` when unset
    pub field_name: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            name: None,
            location: None,
            reason: None,
            contact_info: None,
            signing_time: None,
            estimated_size: 8192,
            field_name: None,
        }
    }
}

impl SignOptions {
    /// Set the signer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = Some(contact_info.into());
        self
    }

    /// Pin the signing time instead of using the clock.
    pub fn with_signing_time(mut self, signing_time: DateTime<FixedOffset>) -> Self {
        self.signing_time = Some(signing_time);
        self
    }

    /// Set the bytes reserved for the envelope.
    pub fn with_estimated_size(mut self, estimated_size: usize) -> Self {
        self.estimated_size = estimated_size;
        self
    }

    /// Set the name of the new signature field.
    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.estimated_size == 0 {
            return Err(Error::InvalidConfiguration(
                "estimated signature size must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.field_name, Some(name) if name.is_empty() || name.contains('.')) {
            return Err(Error::InvalidConfiguration(
                "signature field name must be non-empty and must not contain '.'".to_string(),
            ));
        }
        Ok(())
    }
}

/// A signature dictionary read back from a document.
#[derive(Clone, Default)]
pub struct SignatureDictionary {
    /// Fully qualified name of the field holding the signature
    pub field_name: Option<String>,
    /// `/Filter`
    pub filter: Option<String>,
    /// `/SubFilter`
    pub sub_filter: Option<String>,
    /// `/Name`
    pub name: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// Raw `/M` date string
    pub signing_time: Option<String>,
    /// `/ByteRange` integers
    pub byte_range: Vec<i64>,
    /// Decoded `/Contents` bytes, including any zero padding
    pub contents: Vec<u8>,
}

impl SignatureDictionary {
    /// Known sub-filter, if the name is one.
    pub fn sub_filter_kind(&self) -> Option<SignatureSubFilter> {
        self.sub_filter.as_deref().and_then(SignatureSubFilter::from_pdf_name)
    }

    /// Parsed `/M` date.
    pub fn signed_at(&self) -> Option<DateTime<FixedOffset>> {
        self.signing_time.as_deref().and_then(parse_pdf_date)
    }

    /// Validated `/ByteRange`.
    pub fn byte_range(&self) -> Result<ByteRange> {
        ByteRange::from_pdf_array(&self.byte_range)
    }
}

impl fmt::Debug for SignatureDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureDictionary")
            .field("field_name", &self.field_name)
            .field("filter", &self.filter)
            .field("sub_filter", &self.sub_filter)
            .field("name", &self.name)
            .field("signing_time", &self.signing_time)
            .field("byte_range", &self.byte_range)
            .field("contents", &format!("{} bytes", self.contents.len()))
            .finish()
    }
}

/// Printable facts about one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number as colon separated hex
    pub serial: String,
    /// Start of the validity period
    pub not_before: Option<DateTime<Utc>>,
    /// End of the validity period
    pub not_after: Option<DateTime<Utc>>,
}

impl CertificateSummary {
    /// Summarize a certificate.
    pub fn from_certificate(certificate: &Certificate) -> Result<Self> {
        let der = certificate.to_der().map_err(Error::verification)?;
        Self::from_der(&der)
    }

    /// Summarize a DER encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der).map_err(Error::verification)?;
        let validity = cert.validity();
        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: Utc.timestamp_opt(validity.not_before.timestamp(), 0).single(),
            not_after: Utc.timestamp_opt(validity.not_after.timestamp(), 0).single(),
        })
    }
}

impl fmt::Display for CertificateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subject: {}; Issuer: {}; Serial: {}",
            self.subject, self.issuer, self.serial
        )?;
        if let (Some(from), Some(to)) = (self.not_before, self.not_after) {
            write!(f, "; Valid: {} to {}", from.to_rfc3339(), to.to_rfc3339())?;
        }
        Ok(())
    }
}

/// Result of verifying one signature.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationResult {
    /// Name of the signature field
    pub field_name: Option<String>,
    /// Name of the signer
    pub signer_name: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signing time from the signature dictionary
    pub signing_time: Option<DateTime<FixedOffset>>,
    /// Signature sub-filter
    pub sub_filter: Option<String>,
    /// Byte range of the signed data
    pub byte_range: Vec<i64>,
    /// Whether the byte range covers the whole file except the signature value
    pub covers_whole_document: bool,
    /// Mathematical validity of the envelope over the signed bytes
    pub is_valid: bool,
    /// Certificate matching the signer identifier
    pub signer_certificate: Option<CertificateSummary>,
    /// Remaining embedded certificates
    pub certificate_chain: Vec<CertificateSummary>,
    /// Why the signature was judged invalid
    pub failure: Option<String>,
}

impl VerificationResult {
    /// Start a result from the dictionary's own metadata.
    pub fn from_dictionary(dictionary: &SignatureDictionary, file_size: u64) -> Self {
        let covers_whole_document = dictionary
            .byte_range()
            .map(|range| range.covers_whole_document(file_size))
            .unwrap_or(false);
        Self {
            field_name: dictionary.field_name.clone(),
            signer_name: dictionary.name.clone(),
            location: dictionary.location.clone(),
            reason: dictionary.reason.clone(),
            signing_time: dictionary.signed_at(),
            sub_filter: dictionary.sub_filter.clone(),
            byte_range: dictionary.byte_range.clone(),
            covers_whole_document,
            ..Default::default()
        }
    }

    /// Signer certificate followed by the chain.
    pub fn certificates(&self) -> impl Iterator<Item = &CertificateSummary> {
        self.signer_certificate.iter().chain(self.certificate_chain.iter())
    }
}

/// Format a timestamp as a PDF date string, `D:YYYYMMDDHHmmSS+HH'mm'`.
pub fn format_pdf_date(time: &DateTime<FixedOffset>) -> String {
    let offset = time.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    format!(
        "D:{}{}{:02}'{:02}'",
        time.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    )
}

/// Parse a PDF date string. Every field after the year is optional.
pub fn parse_pdf_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    let value = value.strip_prefix("D:").unwrap_or(value);
    let digits = value.bytes().take_while(u8::is_ascii_digit).count();
    if digits < 4 {
        return None;
    }
    let (stamp, zone) = value.split_at(digits);
    let field = |start: usize, default: u32| -> Option<u32> {
        match stamp.get(start..start + 2) {
            Some(text) => text.parse().ok(),
            None => Some(default),
        }
    };

    let year: i32 = stamp[..4].parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?.and_hms_opt(
        field(8, 0)?,
        field(10, 0)?,
        field(12, 0)?,
    )?;
    parse_pdf_zone(zone)?.from_local_datetime(&naive).single()
}

fn parse_pdf_zone(zone: &str) -> Option<FixedOffset> {
    let mut chars = zone.chars();
    match chars.next() {
        None | Some('Z') => FixedOffset::east_opt(0),
        Some(sign @ ('+' | '-')) => {
            let digits: String = chars.filter(char::is_ascii_digit).collect();
            let hours: i32 = digits.get(..2)?.parse().ok()?;
            let minutes: i32 = match digits.get(2..4) {
                Some(text) => text.parse().ok()?,
                None => 0,
            };
            let seconds = hours * 3600 + minutes * 60;
            if sign == '+' {
                FixedOffset::east_opt(seconds)
            } else {
                FixedOffset::west_opt(seconds)
            }
        },
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, or PDFDocEncoding).
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Encode a PDF text string; non-ASCII text becomes UTF-16BE with a BOM.
pub(crate) fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_algorithm_names() {
        assert_eq!(DigestAlgorithm::Sha256.name(), "SHA-256");
        assert_eq!(DigestAlgorithm::Sha1.name(), "SHA-1");
        assert_eq!(DigestAlgorithm::from_name("sha-384"), Some(DigestAlgorithm::Sha384));
        assert_eq!(DigestAlgorithm::from_name("SHA512"), Some(DigestAlgorithm::Sha512));
        assert_eq!(DigestAlgorithm::from_name("md5"), None);
    }

    #[test]
    fn test_digest_algorithm_oids() {
        assert_eq!(DigestAlgorithm::Sha256.oid().to_string(), "2.16.840.1.101.3.4.2.1");
        assert_eq!(DigestAlgorithm::Sha1.oid().to_string(), "1.3.14.3.2.26");
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_oid(&alg.oid()), Some(alg));
        }
    }

    #[test]
    fn test_digest_lengths_and_streaming() {
        assert_eq!(DigestAlgorithm::Sha1.digest(b"abc").len(), 20);
        assert_eq!(DigestAlgorithm::Sha512.digest(b"abc").len(), 64);
        assert_eq!(
            hex::encode(DigestAlgorithm::Sha256.digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let streamed = DigestAlgorithm::Sha256
            .digest_reader(std::io::Cursor::new(b"abc"))
            .unwrap();
        assert_eq!(streamed, DigestAlgorithm::Sha256.digest(b"abc"));
    }

    #[test]
    fn test_signature_algorithm_accepts_combined_oids() {
        let alg = SignatureAlgorithm::RsaPkcs1v15;
        assert!(alg.accepts(&RSA_ENCRYPTION));
        assert!(alg.accepts(&SHA256_WITH_RSA));
        assert!(!alg.accepts(&DigestAlgorithm::Sha256.oid()));
    }

    #[test]
    fn test_sub_filter_names() {
        assert_eq!(SignatureSubFilter::Pkcs7Detached.as_pdf_name(), "adbe.pkcs7.detached");
        assert_eq!(
            SignatureSubFilter::from_pdf_name("ETSI.CAdES.detached"),
            Some(SignatureSubFilter::CadesDetached)
        );
        assert_eq!(SignatureSubFilter::from_pdf_name("x.unknown"), None);
    }

    #[test]
    fn test_sign_options_builder() {
        let opts = SignOptions::default()
            .with_name("SignerName")
            .with_reason("Test signing")
            .with_location("Test City");
        assert_eq!(opts.name.as_deref(), Some("SignerName"));
        assert_eq!(opts.reason.as_deref(), Some("Test signing"));
        assert_eq!(opts.location.as_deref(), Some("Test City"));
        assert_eq!(opts.estimated_size, 8192);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_sign_options_validation() {
        assert!(SignOptions::default().with_estimated_size(0).validate().is_err());
        assert!(SignOptions::default().with_field_name("a.b").validate().is_err());
        assert!(SignOptions::default().with_field_name("Approval").validate().is_ok());
    }

    #[test]
    fn test_pdf_date_format() {
        let time = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .unwrap();
        assert_eq!(format_pdf_date(&time), "D:20240309140507+02'00'");

        let west = FixedOffset::west_opt(5 * 3600 + 30 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .unwrap();
        assert_eq!(format_pdf_date(&west), "D:20240309140507-05'30'");
        assert_eq!(parse_pdf_date(&format_pdf_date(&west)), Some(west));
    }

    #[test]
    fn test_pdf_date_parse_partial() {
        let parsed = parse_pdf_date("D:2023").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-01-01T00:00:00+00:00");

        let parsed = parse_pdf_date("D:20231231235959Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-12-31T23:59:59+00:00");

        assert!(parse_pdf_date("D:20").is_none());
        assert!(parse_pdf_date("garbage").is_none());
        assert!(parse_pdf_date("D:20231341").is_none());
    }

    #[test]
    fn test_text_string_encoding() {
        assert_eq!(encode_text_string("Plain"), b"Plain".to_vec());
        let encoded = encode_text_string("Zoë");
        assert_eq!(&encoded[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_text_string(&encoded), "Zoë");
        assert_eq!(decode_text_string(b"Plain"), "Plain");
    }

    #[test]
    fn test_verification_result_from_dictionary() {
        let dict = SignatureDictionary {
            name: Some("SignerName".to_string()),
            sub_filter: Some("adbe.pkcs7.detached".to_string()),
            signing_time: Some("D:20240101120000+00'00'".to_string()),
            byte_range: vec![0, 100, 150, 50],
            ..Default::default()
        };
        let result = VerificationResult::from_dictionary(&dict, 200);
        assert_eq!(result.signer_name.as_deref(), Some("SignerName"));
        assert!(result.covers_whole_document);
        assert!(!result.is_valid);
        assert!(result.signing_time.is_some());

        let debug = format!("{:?}", dict);
        assert!(debug.contains("0 bytes"));
    }
}
