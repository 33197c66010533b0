//! Signed and unsigned CMS attributes carried by a signature envelope.
//!
//! The container keys attributes by OID; putting an attribute twice keeps the
//! second value. At signing time the container is merged over the standard
//! signed attributes (content-type and message-digest).

use cms::signed_data::{SignedAttributes, UnsignedAttributes};
use der::asn1::{ObjectIdentifier, OctetString, SetOfVec};
use der::{Any, Encode, EncodeValue, Sequence, Tagged};
use indexmap::IndexMap;
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::{GeneralName, GeneralNames};
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use super::types::DigestAlgorithm;
use crate::error::{Error, Result};

/// id-contentType (1.2.840.113549.1.9.3)
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
/// id-messageDigest (1.2.840.113549.1.9.4)
pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// id-signingTime (1.2.840.113549.1.9.5)
pub const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
/// id-aa-signingCertificateV2 (1.2.840.113549.1.9.16.2.47)
pub const ID_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

/// ESS `IssuerSerial`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerSerial {
    /// Issuer of the referenced certificate
    pub issuer: GeneralNames,
    /// Serial number of the referenced certificate
    pub serial_number: SerialNumber,
}

/// ESS `ESSCertIDv2` (RFC 5035).
///
/// `hash_algorithm` is omitted when it is the SHA-256 default.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct EssCertIdV2 {
    /// Digest algorithm of `cert_hash`
    #[asn1(optional = "true")]
    pub hash_algorithm: Option<AlgorithmIdentifierOwned>,
    /// Digest of the DER certificate
    pub cert_hash: OctetString,
    /// Issuer and serial of the certificate
    #[asn1(optional = "true")]
    pub issuer_serial: Option<IssuerSerial>,
}

impl EssCertIdV2 {
    /// Bind one certificate with `digest`.
    pub fn for_certificate(certificate: &Certificate, digest: DigestAlgorithm) -> Result<Self> {
        let der = certificate.to_der().map_err(Error::signing)?;
        let hash_algorithm = (digest != DigestAlgorithm::Sha256).then(|| AlgorithmIdentifierOwned {
            oid: digest.oid(),
            parameters: None,
        });
        Ok(Self {
            hash_algorithm,
            cert_hash: OctetString::new(digest.digest(&der)).map_err(Error::signing)?,
            issuer_serial: Some(IssuerSerial {
                issuer: vec![GeneralName::DirectoryName(
                    certificate.tbs_certificate.issuer.clone(),
                )],
                serial_number: certificate.tbs_certificate.serial_number.clone(),
            }),
        })
    }

    /// Digest algorithm, resolving the SHA-256 default.
    pub fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        match &self.hash_algorithm {
            None => Some(DigestAlgorithm::Sha256),
            Some(alg) => DigestAlgorithm::from_oid(&alg.oid),
        }
    }
}

/// ESS `SigningCertificateV2`, without the optional policies.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SigningCertificateV2 {
    /// One entry per certificate, signer first
    pub certs: Vec<EssCertIdV2>,
}

/// Wrap a single value into an attribute.
pub fn attribute(oid: ObjectIdentifier, value: &(impl Tagged + EncodeValue)) -> Result<Attribute> {
    let value = Any::encode_from(value).map_err(Error::signing)?;
    let values = SetOfVec::try_from(vec![value]).map_err(Error::signing)?;
    Ok(Attribute { oid, values })
}

/// Build the signing-certificate-v2 attribute binding every certificate of `chain`.
pub fn signing_certificate_v2(chain: &[Certificate], digest: DigestAlgorithm) -> Result<Attribute> {
    let certs = chain
        .iter()
        .map(|cert| EssCertIdV2::for_certificate(cert, digest))
        .collect::<Result<Vec<_>>>()?;
    attribute(ID_SIGNING_CERTIFICATE_V2, &SigningCertificateV2 { certs })
}

/// Signed and unsigned attributes keyed by OID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeContainer {
    signed: IndexMap<ObjectIdentifier, Attribute>,
    unsigned: IndexMap<ObjectIdentifier, Attribute>,
}

impl AttributeContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a signed attribute, returning the one it replaced.
    pub fn put_signed(&mut self, attribute: Attribute) -> Option<Attribute> {
        self.signed.insert(attribute.oid, attribute)
    }

    /// Put an unsigned attribute, returning the one it replaced.
    pub fn put_unsigned(&mut self, attribute: Attribute) -> Option<Attribute> {
        self.unsigned.insert(attribute.oid, attribute)
    }

    /// Signed attribute for an OID.
    pub fn signed(&self, oid: &ObjectIdentifier) -> Option<&Attribute> {
        self.signed.get(oid)
    }

    /// Unsigned attribute for an OID.
    pub fn unsigned(&self, oid: &ObjectIdentifier) -> Option<&Attribute> {
        self.unsigned.get(oid)
    }

    /// Remove a signed attribute.
    pub fn remove_signed(&mut self, oid: &ObjectIdentifier) -> Option<Attribute> {
        self.signed.shift_remove(oid)
    }

    /// Number of signed attributes.
    pub fn signed_len(&self) -> usize {
        self.signed.len()
    }

    /// Number of unsigned attributes.
    pub fn unsigned_len(&self) -> usize {
        self.unsigned.len()
    }

    /// Merge the container over `standard` into the signed attribute set.
    ///
    /// Signing time is always dropped; the signature dictionary carries `/M`.
    pub fn signed_table(&self, standard: Vec<Attribute>) -> Result<SignedAttributes> {
        let mut merged: IndexMap<ObjectIdentifier, Attribute> = standard
            .into_iter()
            .map(|attr| (attr.oid, attr))
            .collect();
        merged.extend(self.signed.iter().map(|(oid, attr)| (*oid, attr.clone())));
        merged.shift_remove(&ID_SIGNING_TIME);
        SetOfVec::try_from(merged.into_values().collect::<Vec<_>>()).map_err(Error::signing)
    }

    /// The unsigned attribute set, `None` when there are none.
    pub fn unsigned_table(&self) -> Result<Option<UnsignedAttributes>> {
        if self.unsigned.is_empty() {
            return Ok(None);
        }
        let values: Vec<Attribute> = self.unsigned.values().cloned().collect();
        SetOfVec::try_from(values).map(Some).map_err(Error::signing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::asn1::{PrintableStringRef, UtcTime};
    use der::Decode;
    use std::time::Duration;

    fn text_attribute(oid: ObjectIdentifier, text: &str) -> Attribute {
        attribute(oid, &PrintableStringRef::new(text).unwrap()).unwrap()
    }

    const CUSTOM: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1");

    #[test]
    fn test_last_write_wins() {
        let mut container = AttributeContainer::new();
        assert!(container.put_signed(text_attribute(CUSTOM, "first")).is_none());
        let replaced = container.put_signed(text_attribute(CUSTOM, "second"));
        assert_eq!(replaced, Some(text_attribute(CUSTOM, "first")));
        assert_eq!(container.signed_len(), 1);
        assert_eq!(container.signed(&CUSTOM), Some(&text_attribute(CUSTOM, "second")));
    }

    #[test]
    fn test_signed_table_drops_signing_time() {
        let mut container = AttributeContainer::new();
        let time = UtcTime::from_unix_duration(Duration::from_secs(1_700_000_000)).unwrap();
        container.put_signed(attribute(ID_SIGNING_TIME, &time).unwrap());
        container.put_signed(text_attribute(CUSTOM, "kept"));

        let standard = vec![attribute(ID_CONTENT_TYPE, &ID_SIGNING_TIME).unwrap()];
        let table = container.signed_table(standard).unwrap();
        let oids: Vec<_> = table.iter().map(|a| a.oid).collect();
        assert!(oids.contains(&ID_CONTENT_TYPE));
        assert!(oids.contains(&CUSTOM));
        assert!(!oids.contains(&ID_SIGNING_TIME));
    }

    #[test]
    fn test_user_attribute_overrides_standard() {
        let mut container = AttributeContainer::new();
        container.put_signed(text_attribute(ID_CONTENT_TYPE, "override"));
        let standard = vec![attribute(ID_CONTENT_TYPE, &CUSTOM).unwrap()];
        let table = container.signed_table(standard).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.iter().next(),
            Some(&text_attribute(ID_CONTENT_TYPE, "override"))
        );
    }

    #[test]
    fn test_unsigned_table_empty_is_none() {
        let mut container = AttributeContainer::new();
        assert!(container.unsigned_table().unwrap().is_none());
        container.put_unsigned(text_attribute(CUSTOM, "late"));
        assert_eq!(container.unsigned_table().unwrap().map(|t| t.len()), Some(1));
        assert_eq!(container.unsigned_len(), 1);
    }

    #[test]
    fn test_ess_cert_id_default_algorithm_omitted() {
        let id = EssCertIdV2 {
            hash_algorithm: None,
            cert_hash: OctetString::new(vec![1u8; 32]).unwrap(),
            issuer_serial: None,
        };
        let der = id.to_der().unwrap();
        let decoded = EssCertIdV2::from_der(&der).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(decoded.digest_algorithm(), Some(DigestAlgorithm::Sha256));

        let sha512 = EssCertIdV2 {
            hash_algorithm: Some(AlgorithmIdentifierOwned {
                oid: DigestAlgorithm::Sha512.oid(),
                parameters: None,
            }),
            ..id
        };
        assert_eq!(sha512.digest_algorithm(), Some(DigestAlgorithm::Sha512));
    }
}
