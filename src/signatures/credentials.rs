//! Signing identities: a private key, its certificate chain and the provider that uses them.

use std::fmt;

use indexmap::IndexMap;
use pkcs1::DecodeRsaPrivateKey;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use x509_cert::der::Decode;
use x509_cert::Certificate;

use crate::error::{Error, Result};

/// Provider tag of the bundled cryptographic backend.
pub const DEFAULT_PROVIDER: &str = "RustCrypto";

/// Immutable signing identity.
///
/// Two credentials are equal when their encoded keys, certificate chains and
/// providers are equal.
#[derive(Clone)]
pub struct SigningCredentials {
    private_key: RsaPrivateKey,
    encoded_key: Vec<u8>,
    chain: Vec<Certificate>,
    provider: String,
}

impl SigningCredentials {
    /// Bundle a key with its chain, leaf certificate first.
    pub fn new(private_key: RsaPrivateKey, chain: Vec<Certificate>) -> Result<Self> {
        if chain.is_empty() {
            return Err(Error::InvalidConfiguration(
                "certificate chain must contain at least the signer certificate".to_string(),
            ));
        }
        let encoded_key = private_key
            .to_pkcs8_der()
            .map_err(|e| Error::InvalidConfiguration(format!("cannot encode private key: {}", e)))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            private_key,
            encoded_key,
            chain,
            provider: DEFAULT_PROVIDER.to_string(),
        })
    }

    /// Build credentials from a DER private key (PKCS#8 or PKCS#1) and DER certificates.
    pub fn from_der(key_der: &[u8], chain_der: &[Vec<u8>]) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_der(key_der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(key_der))
            .map_err(|e| Error::InvalidConfiguration(format!("unreadable private key: {}", e)))?;
        let chain = chain_der
            .iter()
            .map(|der| Certificate::from_der(der))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidConfiguration(format!("unreadable certificate: {}", e)))?;
        Self::new(private_key, chain)
    }

    /// Take the entry stored under `alias`.
    pub fn from_key_store(store: &dyn KeyStore, alias: &str) -> Result<Self> {
        let entry = store.entry(alias).ok_or_else(|| {
            Error::InvalidConfiguration(format!("key store has no entry named '{}'", alias))
        })?;
        Self::new(entry.private_key.clone(), entry.chain.clone())
    }

    /// Take the first entry of a key store.
    pub fn from_first_alias(store: &dyn KeyStore) -> Result<Self> {
        let alias = store
            .aliases()
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidConfiguration("key store is empty".to_string()))?;
        Self::from_key_store(store, &alias)
    }

    /// Tag the provider expected to use these credentials.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// The private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// PKCS#8 DER encoding of the private key.
    pub fn encoded_key(&self) -> &[u8] {
        &self.encoded_key
    }

    /// The signer certificate.
    pub fn certificate(&self) -> &Certificate {
        // `new` refuses empty chains
        &self.chain[0]
    }

    /// All certificates, leaf first.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Provider tag.
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl PartialEq for SigningCredentials {
    fn eq(&self, other: &Self) -> bool {
        self.encoded_key == other.encoded_key
            && self.chain == other.chain
            && self.provider == other.provider
    }
}

impl Eq for SigningCredentials {}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("private_key", &"[REDACTED]")
            .field("chain", &format!("{} certificates", self.chain.len()))
            .field("provider", &self.provider)
            .finish()
    }
}

/// One key store entry.
#[derive(Clone)]
pub struct KeyEntry {
    /// The private key
    pub private_key: RsaPrivateKey,
    /// Certificates, leaf first
    pub chain: Vec<Certificate>,
}

/// Source of private keys and certificate chains keyed by alias.
pub trait KeyStore {
    /// All aliases in insertion order.
    fn aliases(&self) -> Vec<String>;

    /// The entry for an alias.
    fn entry(&self, alias: &str) -> Option<&KeyEntry>;
}

/// Key store backed by PEM text.
#[derive(Clone, Default)]
pub struct PemKeyStore {
    entries: IndexMap<String, KeyEntry>,
}

impl PemKeyStore {
    /// Alias used by [`PemKeyStore::from_pem`].
    pub const DEFAULT_ALIAS: &'static str = "default";

    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with a single entry under [`Self::DEFAULT_ALIAS`].
    pub fn from_pem(key_pem: &str, chain_pem: &str) -> Result<Self> {
        let mut store = Self::new();
        store.insert_pem(Self::DEFAULT_ALIAS, key_pem, chain_pem)?;
        Ok(store)
    }

    /// Parse a PEM private key (PKCS#8 or PKCS#1) and a PEM certificate bundle.
    pub fn insert_pem(&mut self, alias: &str, key_pem: &str, chain_pem: &str) -> Result<()> {
        let private_key = if key_pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(key_pem)
                .map_err(|e| Error::InvalidConfiguration(format!("unreadable PKCS#1 key: {}", e)))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(key_pem)
                .map_err(|e| Error::InvalidConfiguration(format!("unreadable PKCS#8 key: {}", e)))?
        };
        if chain_pem.trim().is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "empty certificate chain for alias '{}'",
                alias
            )));
        }
        let chain = Certificate::load_pem_chain(chain_pem.as_bytes())
            .map_err(|e| Error::InvalidConfiguration(format!("unreadable certificate: {}", e)))?;
        if chain.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "no certificates found for alias '{}'",
                alias
            )));
        }
        self.insert(alias, private_key, chain);
        Ok(())
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, alias: &str, private_key: RsaPrivateKey, chain: Vec<Certificate>) {
        self.entries
            .insert(alias.to_string(), KeyEntry { private_key, chain });
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyStore for PemKeyStore {
    fn aliases(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn entry(&self, alias: &str) -> Option<&KeyEntry> {
        self.entries.get(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::str::FromStr;
    use std::time::Duration;
    use x509_cert::builder::{Builder, CertificateBuilder, Profile};
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::SubjectPublicKeyInfoOwned;
    use x509_cert::time::Validity;

    fn key(seed: u64) -> RsaPrivateKey {
        let mut rng = StdRng::seed_from_u64(seed);
        RsaPrivateKey::new(&mut rng, 1024).unwrap()
    }

    fn self_signed(key: &RsaPrivateKey, cn: &str) -> Certificate {
        let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone());
        let spki = SubjectPublicKeyInfoOwned::from_key(key.to_public_key()).unwrap();
        let subject = Name::from_str(&format!("CN={}", cn)).unwrap();
        let builder = CertificateBuilder::new(
            Profile::Root,
            SerialNumber::from(7u32),
            Validity::from_now(Duration::from_secs(3600)).unwrap(),
            subject,
            spki,
            &signer,
        )
        .unwrap();
        builder.build::<rsa::pkcs1v15::Signature>().unwrap()
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = SigningCredentials::new(key(1), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_structural_equality() {
        let k = key(2);
        let cert = self_signed(&k, "Client");
        let a = SigningCredentials::new(k.clone(), vec![cert.clone()]).unwrap();
        let b = SigningCredentials::new(k.clone(), vec![cert.clone()]).unwrap();
        assert_eq!(a, b);

        let other_provider = b.clone().with_provider("Other");
        assert_ne!(a, other_provider);

        let other_key = SigningCredentials::new(key(3), vec![cert]).unwrap();
        assert_ne!(a, other_key);
    }

    #[test]
    fn test_debug_redacts_key() {
        let k = key(4);
        let cert = self_signed(&k, "Client");
        let creds = SigningCredentials::new(k, vec![cert]).unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("1 certificates"));
        assert!(debug.contains(DEFAULT_PROVIDER));
    }

    #[test]
    fn test_der_round_trip() {
        use der::Encode;
        let k = key(5);
        let cert = self_signed(&k, "Client");
        let creds = SigningCredentials::new(k, vec![cert.clone()]).unwrap();
        let reloaded =
            SigningCredentials::from_der(creds.encoded_key(), &[cert.to_der().unwrap()]).unwrap();
        assert_eq!(creds, reloaded);
    }

    #[test]
    fn test_pem_key_store() {
        use der::EncodePem;
        use pkcs8::LineEnding;
        let k = key(6);
        let cert = self_signed(&k, "Client");
        let key_pem = k.to_pkcs8_pem(LineEnding::LF).unwrap();
        let chain_pem = cert.to_pem(LineEnding::LF).unwrap();

        let mut store = PemKeyStore::from_pem(&key_pem, &chain_pem).unwrap();
        store.insert_pem("second", &key_pem, &chain_pem).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.aliases(), vec!["default".to_string(), "second".to_string()]);

        let first = SigningCredentials::from_first_alias(&store).unwrap();
        assert_eq!(first.certificate(), &cert);
        assert!(SigningCredentials::from_key_store(&store, "missing").is_err());
        assert!(matches!(
            PemKeyStore::from_pem(&key_pem, ""),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            PemKeyStore::from_pem(&key_pem, "  \n"),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
