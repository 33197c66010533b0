//! Detached CMS envelope generation.
//!
//! The signer digests the byte-range content, builds the signed attributes
//! (content-type, message-digest and whatever the policy adds), signs their
//! DER `SET OF` encoding with the private key and wraps everything, including
//! the certificate chain, in a `ContentInfo`/`SignedData` structure. The
//! content itself is never encapsulated.

use std::io::Read;

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use der::asn1::{ObjectIdentifier, OctetString, SetOfVec};
use der::oid::AssociatedOid;
use der::{Any, Encode};
use rsa::pkcs1v15::SigningKey;
use rsa::RsaPrivateKey;
use sha2::Digest;
use signature::{SignatureEncoding, Signer};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;

use super::attributes::{attribute, ID_CONTENT_TYPE, ID_MESSAGE_DIGEST};
use super::credentials::SigningCredentials;
use super::policy::SignaturePolicy;
use super::types::{DigestAlgorithm, SignatureAlgorithm};
use crate::error::{Error, Result};

/// id-data (1.2.840.113549.1.7.1)
pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// id-signedData (1.2.840.113549.1.7.2)
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// Produces detached CMS envelopes.
pub struct PdfSigner<'a> {
    credentials: &'a SigningCredentials,
    policy: &'a SignaturePolicy,
}

impl<'a> PdfSigner<'a> {
    /// Create a signer for one identity and policy.
    pub fn new(credentials: &'a SigningCredentials, policy: &'a SignaturePolicy) -> Self {
        Self {
            credentials,
            policy,
        }
    }

    /// Digest `content` and return the DER envelope.
    pub fn sign<R: Read>(&self, content: R) -> Result<Vec<u8>> {
        let digest = self.policy.digest_algorithm.digest_reader(content)?;
        self.sign_digest(&digest)
    }

    /// Build the envelope for an already computed content digest.
    pub fn sign_digest(&self, content_digest: &[u8]) -> Result<Vec<u8>> {
        let digest_algorithm = self.policy.digest_algorithm;
        let signed_attrs = self
            .policy
            .attributes
            .signed_table(standard_attributes(content_digest)?)?;
        let signed_attrs_der = signed_attrs.to_der().map_err(Error::signing)?;

        let signature = match self.policy.signature_algorithm {
            SignatureAlgorithm::RsaPkcs1v15 => {
                rsa_sign(self.credentials.private_key(), digest_algorithm, &signed_attrs_der)?
            },
        };
        log::debug!(
            "Signed {} attribute(s) with {} / {:?}",
            signed_attrs.len(),
            digest_algorithm,
            self.policy.signature_algorithm
        );

        let leaf = self.credentials.certificate();
        let digest_alg = AlgorithmIdentifierOwned {
            oid: digest_algorithm.oid(),
            parameters: None,
        };
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: leaf.tbs_certificate.issuer.clone(),
                serial_number: leaf.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: digest_alg.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: self.policy.signature_algorithm.algorithm_identifier(),
            signature: OctetString::new(signature).map_err(Error::signing)?,
            unsigned_attrs: self.policy.attributes.unsigned_table()?,
        };

        let certificates: Vec<CertificateChoices> = self
            .credentials
            .chain()
            .iter()
            .cloned()
            .map(CertificateChoices::Certificate)
            .collect();

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![digest_alg]).map_err(Error::signing)?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent: None,
            },
            certificates: Some(CertificateSet(
                SetOfVec::try_from(certificates).map_err(Error::signing)?,
            )),
            crls: None,
            signer_infos: SignerInfos(
                SetOfVec::try_from(vec![signer_info]).map_err(Error::signing)?,
            ),
        };

        let content_info = ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: Any::encode_from(&signed_data).map_err(Error::signing)?,
        };
        content_info.to_der().map_err(Error::signing)
    }
}

/// content-type and message-digest, the attributes every signer info carries.
fn standard_attributes(content_digest: &[u8]) -> Result<Vec<Attribute>> {
    let digest = OctetString::new(content_digest).map_err(Error::signing)?;
    Ok(vec![
        attribute(ID_CONTENT_TYPE, &ID_DATA)?,
        attribute(ID_MESSAGE_DIGEST, &digest)?,
    ])
}

fn rsa_sign(key: &RsaPrivateKey, digest: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
    match digest {
        DigestAlgorithm::Sha1 => rsa_sign_with::<sha1::Sha1>(key, message),
        DigestAlgorithm::Sha256 => rsa_sign_with::<sha2::Sha256>(key, message),
        DigestAlgorithm::Sha384 => rsa_sign_with::<sha2::Sha384>(key, message),
        DigestAlgorithm::Sha512 => rsa_sign_with::<sha2::Sha512>(key, message),
    }
}

fn rsa_sign_with<D>(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>>
where
    D: Digest + AssociatedOid,
{
    let signing_key = SigningKey::<D>::new(key.clone());
    let signature = signing_key.try_sign(message).map_err(Error::signing)?;
    Ok(signature.to_vec())
}
