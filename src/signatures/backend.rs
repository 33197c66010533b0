//! Cryptographic backend used by the placement engine and the report builder.

use std::io::Read;

use chrono::{DateTime, Utc};

use super::credentials::{SigningCredentials, DEFAULT_PROVIDER};
use super::policy::SignaturePolicy;
use super::signer::PdfSigner;
use super::verifier::{EnvelopeVerification, SignatureVerifier};
use crate::error::{Error, Result};

/// Produces and checks detached envelopes.
pub trait SignatureBackend {
    /// Provider tag credentials must carry to be used with this backend.
    fn name(&self) -> &str;

    /// Sign the bytes `content` yields.
    fn sign(
        &self,
        content: &mut dyn Read,
        credentials: &SigningCredentials,
        policy: &SignaturePolicy,
    ) -> Result<Vec<u8>>;

    /// Verify an envelope over the bytes `content` yields. Never fails.
    fn verify(&self, content: &mut dyn Read, envelope: &[u8]) -> EnvelopeVerification;
}

/// RSA / CMS backend built on the RustCrypto crates.
#[derive(Debug, Clone, Default)]
pub struct CmsBackend {
    verifier: SignatureVerifier,
}

impl CmsBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check certificate validity at `time` instead of now.
    pub fn with_verification_time(mut self, time: DateTime<Utc>) -> Self {
        self.verifier = self.verifier.with_verification_time(time);
        self
    }
}

impl SignatureBackend for CmsBackend {
    fn name(&self) -> &str {
        DEFAULT_PROVIDER
    }

    fn sign(
        &self,
        content: &mut dyn Read,
        credentials: &SigningCredentials,
        policy: &SignaturePolicy,
    ) -> Result<Vec<u8>> {
        if credentials.provider() != self.name() {
            return Err(Error::Signing(format!(
                "credentials are bound to provider '{}', backend is '{}'",
                credentials.provider(),
                self.name()
            )));
        }
        PdfSigner::new(credentials, policy).sign(content)
    }

    fn verify(&self, content: &mut dyn Read, envelope: &[u8]) -> EnvelopeVerification {
        self.verifier.verify(content, envelope)
    }
}
