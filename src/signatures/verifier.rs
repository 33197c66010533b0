//! Envelope parsing and mathematical validation.
//!
//! Verification never fails as a whole: every problem with an envelope turns
//! into `is_valid = false` with a note explaining why.

use std::io::Read;

use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Decode, Encode, SliceReader};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::Digest;
use signature::hazmat::PrehashVerifier;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::Certificate;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::time::ASN1Time;

use super::attributes::{ID_CONTENT_TYPE, ID_MESSAGE_DIGEST};
use super::signer::ID_SIGNED_DATA;
use super::types::{CertificateSummary, DigestAlgorithm, SignatureAlgorithm};
use crate::error::{Error, Result};

/// What the verifier learned from one envelope.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeVerification {
    /// Certificate matching the signer identifier
    pub signer_certificate: Option<CertificateSummary>,
    /// Other embedded certificates, walked from the signer towards the root
    pub certificate_chain: Vec<CertificateSummary>,
    /// Mathematical validity
    pub is_valid: bool,
    /// Why the envelope is invalid
    pub failure: Option<String>,
}

/// Verifier for detached CMS envelopes.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    verification_time: Option<DateTime<Utc>>,
}

impl SignatureVerifier {
    /// Create a verifier that checks certificates against the current time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check certificate validity at a fixed time instead of now.
    pub fn with_verification_time(mut self, time: DateTime<Utc>) -> Self {
        self.verification_time = Some(time);
        self
    }

    /// Verify `envelope` over the bytes `content` yields.
    pub fn verify<R: Read>(&self, content: R, envelope: &[u8]) -> EnvelopeVerification {
        let parsed = match ParsedEnvelope::parse(envelope) {
            Ok(parsed) => parsed,
            Err(e) => return invalid(EnvelopeVerification::default(), e),
        };

        let mut outcome = EnvelopeVerification::default();
        match parsed.summaries() {
            Ok((signer, chain)) => {
                outcome.signer_certificate = Some(signer);
                outcome.certificate_chain = chain;
            },
            Err(e) => return invalid(outcome, e),
        }

        let time = self.verification_time.unwrap_or_else(Utc::now);
        match parsed.check(content, time) {
            Ok(()) => {
                outcome.is_valid = true;
                outcome
            },
            Err(e) => invalid(outcome, e),
        }
    }
}

fn invalid(mut outcome: EnvelopeVerification, err: Error) -> EnvelopeVerification {
    log::warn!("Signature judged invalid: {}", err);
    outcome.is_valid = false;
    outcome.failure = Some(err.to_string());
    outcome
}

/// A decoded envelope with its signer resolved.
struct ParsedEnvelope {
    signed_data: SignedData,
    signer: SignerInfo,
    signer_certificate: Certificate,
    chain: Vec<Certificate>,
}

impl ParsedEnvelope {
    fn parse(envelope: &[u8]) -> Result<Self> {
        // /Contents is zero padded past the end of the DER structure
        let mut reader = SliceReader::new(envelope).map_err(Error::verification)?;
        let content_info = ContentInfo::decode(&mut reader).map_err(Error::verification)?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::Verification(format!(
                "envelope content type {} is not signed-data",
                content_info.content_type
            )));
        }
        let content_der = content_info.content.to_der().map_err(Error::verification)?;
        let signed_data = SignedData::from_der(&content_der).map_err(Error::verification)?;

        let signer = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| Error::Verification("envelope has no signer info".to_string()))?;
        if signed_data.signer_infos.0.len() > 1 {
            log::debug!(
                "Envelope has {} signer infos, using the first",
                signed_data.signer_infos.0.len()
            );
        }

        let mut certificates: Vec<Certificate> = signed_data
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert.clone()),
                _ => None,
            })
            .collect();
        let position = certificates
            .iter()
            .position(|cert| matches_signer(cert, &signer.sid))
            .ok_or_else(|| {
                Error::Verification("signer certificate is not embedded in the envelope".into())
            })?;
        let signer_certificate = certificates.remove(position);
        let chain = order_chain(&signer_certificate, certificates);

        Ok(Self {
            signed_data,
            signer,
            signer_certificate,
            chain,
        })
    }

    fn summaries(&self) -> Result<(CertificateSummary, Vec<CertificateSummary>)> {
        let signer = CertificateSummary::from_certificate(&self.signer_certificate)?;
        let chain = self
            .chain
            .iter()
            .map(CertificateSummary::from_certificate)
            .collect::<Result<Vec<_>>>()?;
        Ok((signer, chain))
    }

    fn check<R: Read>(&self, content: R, time: DateTime<Utc>) -> Result<()> {
        let digest_algorithm =
            DigestAlgorithm::from_oid(&self.signer.digest_alg.oid).ok_or_else(|| {
                Error::Verification(format!(
                    "unsupported digest algorithm {}",
                    self.signer.digest_alg.oid
                ))
            })?;
        if !SignatureAlgorithm::RsaPkcs1v15.accepts(&self.signer.signature_algorithm.oid) {
            return Err(Error::Verification(format!(
                "unsupported signature algorithm {}",
                self.signer.signature_algorithm.oid
            )));
        }

        let content_digest = digest_algorithm
            .digest_reader(content)
            .map_err(Error::verification)?;

        let prehash = match &self.signer.signed_attrs {
            Some(attrs) => {
                let content_type: ObjectIdentifier = single_value(attrs, ID_CONTENT_TYPE)?;
                if content_type != self.signed_data.encap_content_info.econtent_type {
                    return Err(Error::Verification(
                        "content-type attribute does not match the encapsulated type".into(),
                    ));
                }
                let message_digest: OctetString = single_value(attrs, ID_MESSAGE_DIGEST)?;
                if message_digest.as_bytes() != content_digest.as_slice() {
                    return Err(Error::Verification(
                        "message digest does not match the signed content".into(),
                    ));
                }
                let attrs_der = attrs.to_der().map_err(Error::verification)?;
                digest_algorithm.digest(&attrs_der)
            },
            None => content_digest,
        };

        let spki_der = self
            .signer_certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(Error::verification)?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der).map_err(Error::verification)?;
        rsa_verify(
            &public_key,
            digest_algorithm,
            &prehash,
            self.signer.signature.as_bytes(),
        )?;

        check_validity_period(&self.signer_certificate, time)
    }
}

fn matches_signer(cert: &Certificate, sid: &SignerIdentifier) -> bool {
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(isn) => {
            cert.tbs_certificate.issuer == isn.issuer
                && cert.tbs_certificate.serial_number == isn.serial_number
        },
        SignerIdentifier::SubjectKeyIdentifier(ski) => {
            matches!(cert.tbs_certificate.get::<SubjectKeyIdentifier>(), Ok(Some((_, found))) if found == *ski)
        },
    }
}

/// Order certificates by following issuer links up from `signer`; leftovers keep their order.
fn order_chain(signer: &Certificate, mut rest: Vec<Certificate>) -> Vec<Certificate> {
    let mut ordered = Vec::with_capacity(rest.len());
    let mut current = signer.tbs_certificate.issuer.clone();
    while let Some(next) = rest
        .iter()
        .position(|cert| cert.tbs_certificate.subject == current)
    {
        let cert = rest.remove(next);
        let self_issued = cert.tbs_certificate.subject == cert.tbs_certificate.issuer;
        current = cert.tbs_certificate.issuer.clone();
        ordered.push(cert);
        if self_issued {
            break;
        }
    }
    ordered.extend(rest);
    ordered
}

fn single_value<T>(attrs: &cms::signed_data::SignedAttributes, oid: ObjectIdentifier) -> Result<T>
where
    T: for<'a> Decode<'a>,
{
    let attr = attrs
        .iter()
        .find(|attr| attr.oid == oid)
        .ok_or_else(|| Error::Verification(format!("signed attribute {} is missing", oid)))?;
    if attr.values.len() != 1 {
        return Err(Error::Verification(format!(
            "signed attribute {} must have exactly one value",
            oid
        )));
    }
    let value = attr
        .values
        .iter()
        .next()
        .ok_or_else(|| Error::Verification(format!("signed attribute {} is empty", oid)))?;
    let der = value.to_der().map_err(Error::verification)?;
    T::from_der(&der).map_err(Error::verification)
}

fn rsa_verify(
    key: &RsaPublicKey,
    digest: DigestAlgorithm,
    prehash: &[u8],
    signature: &[u8],
) -> Result<()> {
    match digest {
        DigestAlgorithm::Sha1 => rsa_verify_with::<sha1::Sha1>(key, prehash, signature),
        DigestAlgorithm::Sha256 => rsa_verify_with::<sha2::Sha256>(key, prehash, signature),
        DigestAlgorithm::Sha384 => rsa_verify_with::<sha2::Sha384>(key, prehash, signature),
        DigestAlgorithm::Sha512 => rsa_verify_with::<sha2::Sha512>(key, prehash, signature),
    }
}

fn rsa_verify_with<D>(key: &RsaPublicKey, prehash: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + der::oid::AssociatedOid,
{
    let verifying_key = VerifyingKey::<D>::new(key.clone());
    let signature = Signature::try_from(signature).map_err(Error::verification)?;
    verifying_key
        .verify_prehash(prehash, &signature)
        .map_err(|_| Error::Verification("signature value does not verify".to_string()))
}

fn check_validity_period(cert: &Certificate, time: DateTime<Utc>) -> Result<()> {
    let der = cert.to_der().map_err(Error::verification)?;
    let (_, parsed) = X509Certificate::from_der(&der).map_err(Error::verification)?;
    let at = ASN1Time::from_timestamp(time.timestamp()).map_err(Error::verification)?;
    if parsed.validity().is_valid_at(at) {
        Ok(())
    } else {
        Err(Error::Verification(format!(
            "signer certificate is not valid at {}",
            time.to_rfc3339()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_envelope_is_invalid() {
        let outcome = SignatureVerifier::new().verify(&b"content"[..], &[0x30, 0x03, 0x02]);
        assert!(!outcome.is_valid);
        assert!(outcome.signer_certificate.is_none());
        assert!(outcome.failure.is_some());
    }

    #[test]
    fn test_zero_placeholder_is_invalid() {
        let outcome = SignatureVerifier::new().verify(&b"content"[..], &[0u8; 64]);
        assert!(!outcome.is_valid);
        assert!(outcome.failure.unwrap().starts_with("Verification failed"));
    }
}
