//! Shared fixtures for the integration tests: an RSA key, a two certificate
//! chain and a small sample PDF.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use lopdf::{dictionary, Document, Object, Stream};
use pdf_seal::signatures::{SignOptions, SignRequest, SignaturePolicy, SigningCredentials};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::RsaPrivateKey;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;
use x509_cert::Certificate;

pub const SIGNER_NAME: &str = "SignerName";
pub const SAMPLE_TEXT: &[u8] = b"Hello, signed world";

const ONE_YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// 1024-bit RSA key, generated once per test binary.
pub fn signing_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0x5EA1);
        RsaPrivateKey::new(&mut rng, 1024).unwrap()
    })
}

fn certificate(profile: Profile, serial: u32, subject: &str) -> Certificate {
    let key = signing_key();
    let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone());
    let spki = SubjectPublicKeyInfoOwned::from_key(key.to_public_key()).unwrap();
    CertificateBuilder::new(
        profile,
        SerialNumber::from(serial),
        Validity::from_now(ONE_YEAR).unwrap(),
        Name::from_str(subject).unwrap(),
        spki,
        &signer,
    )
    .unwrap()
    .build::<rsa::pkcs1v15::Signature>()
    .unwrap()
}

/// Client certificate issued by a self-signed CA, both on the same key pair.
///
/// Returned leaf first.
pub fn certificate_chain() -> Vec<Certificate> {
    static CHAIN: OnceLock<Vec<Certificate>> = OnceLock::new();
    CHAIN
        .get_or_init(|| {
            let ca_name = "CN=Test CA,O=pdf_seal";
            let ca = certificate(Profile::Root, 1, ca_name);
            let client = certificate(
                Profile::Leaf {
                    issuer: Name::from_str(ca_name).unwrap(),
                    enable_key_agreement: false,
                    enable_key_encipherment: false,
                },
                2,
                "CN=Test Client,O=pdf_seal",
            );
            vec![client, ca]
        })
        .clone()
}

pub fn credentials() -> SigningCredentials {
    SigningCredentials::new(signing_key().clone(), certificate_chain()).unwrap()
}

/// Baseline request with the signer name set.
pub fn baseline_request() -> SignRequest {
    SignRequest::new(credentials())
        .with_options(SignOptions::default().with_name(SIGNER_NAME))
}

/// PAdES-B request with the signer name set.
pub fn pades_request() -> SignRequest {
    let credentials = credentials();
    let policy = SignaturePolicy::pades_b(&credentials).unwrap();
    SignRequest::new(credentials)
        .with_policy(policy)
        .with_options(SignOptions::default().with_name(SIGNER_NAME))
}

/// Write a one page PDF to `dir/name` and return its path.
pub fn sample_pdf(dir: &Path, name: &str) -> PathBuf {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Font".to_vec()),
        "Subtype" => Object::Name(b"Type1".to_vec()),
        "BaseFont" => Object::Name(b"Helvetica".to_vec()),
    });
    let mut text = b"BT /F1 24 Tf 72 720 Td (".to_vec();
    text.extend_from_slice(SAMPLE_TEXT);
    text.extend_from_slice(b") Tj ET");
    let content_id = doc.add_object(Stream::new(dictionary! {}, text));
    let page_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Page".to_vec()),
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
        "MediaBox" => Object::Array(vec![
            Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792),
        ]),
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference(font_id) },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => Object::Array(vec![Object::Reference(page_id)]),
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Catalog".to_vec()),
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

/// Position of `needle` in the file at `path`.
pub fn find(path: &Path, needle: &[u8]) -> usize {
    let bytes = fs::read(path).unwrap();
    bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap()
}

/// Position of the last occurrence of `needle` in the file at `path`.
pub fn rfind(path: &Path, needle: &[u8]) -> usize {
    let bytes = fs::read(path).unwrap();
    bytes
        .windows(needle.len())
        .rposition(|window| window == needle)
        .unwrap()
}

/// Overwrite one byte of a file in place.
pub fn patch_byte(path: &Path, offset: usize, value: u8) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset] = value;
    fs::write(path, bytes).unwrap();
}
