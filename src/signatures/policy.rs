//! Named signature profiles.

use x509_cert::attr::Attribute;

use super::attributes::{signing_certificate_v2, AttributeContainer};
use super::credentials::SigningCredentials;
use super::types::{DigestAlgorithm, SignOptions, SignatureAlgorithm, SignatureSubFilter};
use crate::error::Result;

/// Default `/Filter` of new signatures.
pub const DEFAULT_FILTER: &str = "Adobe.PPKLite";

/// Algorithms, PDF identifiers and extra attributes used for one signature.
///
/// The envelope generator only reads these fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SignaturePolicy {
    /// Digest algorithm for content and signed attributes
    pub digest_algorithm: DigestAlgorithm,
    /// Private key algorithm
    pub signature_algorithm: SignatureAlgorithm,
    /// `/Filter`
    pub filter: String,
    /// `/SubFilter`
    pub sub_filter: SignatureSubFilter,
    /// Extra signed and unsigned attributes
    pub attributes: AttributeContainer,
}

impl SignaturePolicy {
    /// PKCS#7 detached, SHA-256, no extra attributes.
    pub fn baseline() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            signature_algorithm: SignatureAlgorithm::RsaPkcs1v15,
            filter: DEFAULT_FILTER.to_string(),
            sub_filter: SignatureSubFilter::Pkcs7Detached,
            attributes: AttributeContainer::new(),
        }
    }

    /// PAdES baseline B: CAdES detached with a signing-certificate-v2 attribute over the chain.
    pub fn pades_b(credentials: &SigningCredentials) -> Result<Self> {
        let mut policy = Self::baseline().with_sub_filter(SignatureSubFilter::CadesDetached);
        policy
            .attributes
            .put_signed(signing_certificate_v2(credentials.chain(), DigestAlgorithm::Sha256)?);
        Ok(policy)
    }

    /// Use another digest algorithm.
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    /// Use another `/Filter`.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Use another `/SubFilter`.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Add or replace a signed attribute.
    pub fn with_signed_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.put_signed(attribute);
        self
    }

    /// Add or replace an unsigned attribute.
    pub fn with_unsigned_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.put_unsigned(attribute);
        self
    }
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Everything one signing call needs, assembled up front.
#[derive(Debug, Clone)]
pub struct SignRequest {
    /// Signing identity
    pub credentials: SigningCredentials,
    /// Algorithms and attributes
    pub policy: SignaturePolicy,
    /// Signature dictionary metadata
    pub options: SignOptions,
}

impl SignRequest {
    /// A request under the baseline policy with default options.
    pub fn new(credentials: SigningCredentials) -> Self {
        Self {
            credentials,
            policy: SignaturePolicy::baseline(),
            options: Default::default(),
        }
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: SignOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_defaults() {
        let policy = SignaturePolicy::default();
        assert_eq!(policy, SignaturePolicy::baseline());
        assert_eq!(policy.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(policy.filter, "Adobe.PPKLite");
        assert_eq!(policy.sub_filter.as_pdf_name(), "adbe.pkcs7.detached");
        assert_eq!(policy.attributes.signed_len(), 0);
    }

    #[test]
    fn test_policy_setters() {
        let policy = SignaturePolicy::baseline()
            .with_digest_algorithm(DigestAlgorithm::Sha512)
            .with_filter("Custom.Handler");
        assert_eq!(policy.digest_algorithm, DigestAlgorithm::Sha512);
        assert_eq!(policy.filter, "Custom.Handler");
    }
}
