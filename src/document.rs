//! PDF document handle.
//!
//! A [`PdfDocument`] names a file on disk that can be signed into a new file
//! or have its signatures verified. Documents loaded from a stream are first
//! copied to a private temporary file so that byte ranges can be re-read
//! exactly.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::report::{ReportKind, VerificationReport};
use crate::signatures::{
    signature_fields, ByteRangeReader, CmsBackend, PlacementEngine, SignRequest,
    SignatureBackend, SignatureDictionary, SignatureField, VerificationResult,
};

/// PDF document to sign or verify.
///
/// # Example
///
/// ```no_run
/// use pdf_seal::document::PdfDocument;
///
/// let doc = PdfDocument::open("signed.pdf")?;
/// for result in doc.verify()? {
///     println!("{:?}: valid = {}", result.field_name, result.is_valid);
/// }
/// # Ok::<(), pdf_seal::error::Error>(())
/// ```
pub struct PdfDocument {
    /// File holding the document bytes
    path: PathBuf,
    /// Directory for scratch files
    temp_dir: PathBuf,
    /// Keeps a stream-loaded copy alive; deleted on drop
    _stream_copy: Option<NamedTempFile>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("path", &self.path)
            .field("temp_dir", &self.temp_dir)
            .field("from_stream", &self._stream_copy.is_some())
            .finish()
    }
}

impl PdfDocument {
    /// Open a PDF document from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceNotFound`] if the path is not a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::SourceNotFound(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            temp_dir: std::env::temp_dir(),
            _stream_copy: None,
        })
    }

    /// Load a document from a stream, copying it to the system temp directory.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_reader_in(reader, std::env::temp_dir())
    }

    /// Load a document from a stream, copying it into `temp_dir`.
    pub fn from_reader_in<R: Read>(mut reader: R, temp_dir: impl Into<PathBuf>) -> Result<Self> {
        let temp_dir = temp_dir.into();
        let mut copy = tempfile::Builder::new()
            .prefix("pdf_seal_input")
            .suffix(".pdf")
            .tempfile_in(&temp_dir)?;
        let copied = io::copy(&mut reader, copy.as_file_mut())?;
        copy.as_file_mut().flush()?;
        log::debug!("Copied {} bytes of stream input to {}", copied, copy.path().display());

        Ok(Self {
            path: copy.path().to_path_buf(),
            temp_dir,
            _stream_copy: Some(copy),
        })
    }

    /// Load from a document that was already parsed.
    ///
    /// Not supported: byte ranges must be computed over the exact bytes the
    /// document was read from, which a parsed object model no longer has.
    pub fn from_parsed(_document: &lopdf::Document) -> Result<Self> {
        Err(Error::Unsupported(
            "loading from an already parsed document".to_string(),
        ))
    }

    /// Keep scratch files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Path of the file holding the document bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the document.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Size of the document in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Sign the document into `output` with the built-in CMS backend.
    ///
    /// The source is left untouched. On failure no file is created at `output`.
    pub fn sign(&self, output: impl AsRef<Path>, request: &SignRequest) -> Result<()> {
        self.sign_with(&CmsBackend::new(), output, request)
    }

    /// Sign the document into `output` using `backend`.
    pub fn sign_with<B: SignatureBackend + ?Sized>(
        &self,
        backend: &B,
        output: impl AsRef<Path>,
        request: &SignRequest,
    ) -> Result<()> {
        let mut engine = PlacementEngine::new(backend, &self.temp_dir);
        engine.sign(&self.path, output.as_ref(), request)
    }

    /// Signature fields of the form, signed or not, in form order.
    pub fn signature_fields(&self) -> Result<Vec<SignatureField>> {
        let doc = lopdf::Document::load(&self.path)?;
        signature_fields(&doc)
    }

    /// Signature dictionaries of all readable signed fields, in form order.
    pub fn signature_dictionaries(&self) -> Result<Vec<SignatureDictionary>> {
        Ok(self
            .signature_fields()?
            .into_iter()
            .filter_map(|field| field.value)
            .collect())
    }

    /// Verify every signature with the built-in CMS backend.
    pub fn verify(&self) -> Result<Vec<VerificationResult>> {
        self.verify_with(&CmsBackend::new())
    }

    /// Verify every signature using `backend`.
    ///
    /// A signature that cannot be checked, including one whose dictionary
    /// cannot be read, is reported as invalid; only failures to read the
    /// document itself are returned as errors.
    pub fn verify_with<B: SignatureBackend + ?Sized>(
        &self,
        backend: &B,
    ) -> Result<Vec<VerificationResult>> {
        let file_size = self.file_size()?;
        let mut results = Vec::new();

        for field in self.signature_fields()? {
            let dictionary = match (field.value, field.malformed) {
                (Some(dictionary), _) => dictionary,
                (None, Some(reason)) => {
                    results.push(VerificationResult {
                        field_name: field.name,
                        is_valid: false,
                        failure: Some(format!("malformed signature dictionary: {}", reason)),
                        ..Default::default()
                    });
                    continue;
                },
                (None, None) => continue,
            };

            let mut result = VerificationResult::from_dictionary(&dictionary, file_size);
            let checked = dictionary.byte_range().and_then(|range| {
                let mut content = ByteRangeReader::new(File::open(&self.path)?, &range)?;
                Ok(backend.verify(&mut content, &dictionary.contents))
            });

            match checked {
                Ok(outcome) => {
                    result.is_valid = outcome.is_valid;
                    result.signer_certificate = outcome.signer_certificate;
                    result.certificate_chain = outcome.certificate_chain;
                    result.failure = outcome.failure;
                },
                Err(e) => {
                    log::warn!(
                        "Signature {:?} cannot be checked: {}",
                        dictionary.field_name,
                        e
                    );
                    result.is_valid = false;
                    result.failure = Some(e.to_string());
                },
            }
            results.push(result);
        }

        log::debug!(
            "Verified {} signature(s) in {}",
            results.len(),
            self.path.display()
        );
        Ok(results)
    }

    /// Verify the document and assemble a report of the requested kind.
    pub fn report(&self, kind: ReportKind) -> Result<VerificationReport> {
        let results = self.verify()?;
        Ok(VerificationReport::build(
            kind,
            self.file_name(),
            self.file_size()?,
            results,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let result = PdfDocument::open("/nonexistent/path/input.pdf");
        assert!(matches!(result, Err(Error::SourceNotFound(_))));
    }

    #[test]
    fn test_from_reader_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let doc = PdfDocument::from_reader_in(&b"%PDF-1.4\n%%EOF\n"[..], dir.path()).unwrap();
        assert!(doc.path().starts_with(dir.path()));
        assert_eq!(doc.file_size().unwrap(), 15);
        assert!(doc.file_name().ends_with(".pdf"));

        let path = doc.path().to_path_buf();
        drop(doc);
        assert!(!path.exists());
    }

    #[test]
    fn test_from_parsed_is_unsupported() {
        let parsed = lopdf::Document::with_version("1.7");
        assert!(matches!(
            PdfDocument::from_parsed(&parsed),
            Err(Error::Unsupported(_))
        ));
    }
}
