//! Incremental signature placement.
//!
//! Signing runs through a fixed sequence of states:
//!
//! ```text
//! Unsigned -> PlaceholderReserved -> ByteRangeResolved -> EnvelopeComputed -> Spliced -> Closed
//! ```
//!
//! The source is copied to a staging file next to the output, a signature
//! dictionary with fixed-size `/ByteRange` and `/Contents` placeholders is
//! appended as an incremental update, the byte range around `/Contents` is
//! patched in, the envelope is computed over that range and spliced into the
//! placeholder in place. Only then is the staging file moved to the output
//! path, so a failed run never leaves a file there.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use tempfile::NamedTempFile;

use super::backend::SignatureBackend;
use super::byterange::{ByteRange, ByteRangeCalculator, ByteRangeReader};
use super::fields::{field_names, resolve, signature_fields};
use super::policy::{SignRequest, SignaturePolicy};
use super::types::{encode_text_string, format_pdf_date, SignOptions};
use crate::error::{Error, Result};
use crate::writer::{read_startxref, IncrementalUpdate, ObjectSerializer};

/// Annotation flags of the invisible widget: Print | Locked.
const WIDGET_FLAGS: i64 = 132;
/// SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// Where a signing run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlacementState {
    /// Nothing written yet
    Unsigned,
    /// Signature dictionary with placeholders appended
    PlaceholderReserved,
    /// `/ByteRange` patched to surround `/Contents`
    ByteRangeResolved,
    /// Envelope computed over the byte range
    EnvelopeComputed,
    /// Envelope written into `/Contents`
    Spliced,
    /// Output in place, scratch files removed
    Closed,
}

/// Scratch file that is removed when dropped, logging instead of failing.
struct ScratchFile(Option<NamedTempFile>);

impl ScratchFile {
    fn create(dir: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("pdf_seal_scratch")
            .tempfile_in(dir)?;
        Ok(Self(Some(file)))
    }

    fn file(&mut self) -> Result<&mut File> {
        self.0
            .as_mut()
            .map(NamedTempFile::as_file_mut)
            .ok_or_else(|| Error::Io(io::Error::other("scratch file already closed")))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(file) = self.0.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                log::warn!(
                    "Could not delete scratch file {}: {}; it will be left for the OS to clean up",
                    path.display(),
                    e
                );
            }
        }
    }
}

/// Offsets of the placeholders within the serialized signature dictionary.
struct SignatureTemplate {
    value: Vec<u8>,
    byte_range_at: usize,
    contents_at: usize,
}

impl SignatureTemplate {
    fn render(
        policy: &SignaturePolicy,
        options: &SignOptions,
        signing_time: &DateTime<FixedOffset>,
        calculator: &ByteRangeCalculator,
    ) -> Self {
        let mut value = Vec::new();
        value.extend_from_slice(b"<< /Type /Sig /Filter ");
        ObjectSerializer::write_name(&mut value, policy.filter.as_bytes());
        value.extend_from_slice(b" /SubFilter ");
        ObjectSerializer::write_name(&mut value, policy.sub_filter.as_pdf_name().as_bytes());

        value.extend_from_slice(b" /ByteRange ");
        let byte_range_at = value.len();
        value.extend_from_slice(ByteRangeCalculator::byte_range_placeholder().as_bytes());

        value.extend_from_slice(b" /Contents ");
        let contents_at = value.len();
        value.extend_from_slice(calculator.generate_placeholder().as_bytes());

        value.extend_from_slice(b" /M ");
        ObjectSerializer::write_string(
            &mut value,
            format_pdf_date(signing_time).as_bytes(),
            StringFormat::Literal,
        );

        let entries = [
            (b"Name".as_slice(), &options.name),
            (b"Location".as_slice(), &options.location),
            (b"Reason".as_slice(), &options.reason),
            (b"ContactInfo".as_slice(), &options.contact_info),
        ];
        for (key, text) in entries {
            if let Some(text) = text {
                value.push(b' ');
                ObjectSerializer::write_name(&mut value, key);
                value.push(b' ');
                ObjectSerializer::write_string(
                    &mut value,
                    &encode_text_string(text),
                    StringFormat::Literal,
                );
            }
        }
        value.extend_from_slice(b" >>");

        Self {
            value,
            byte_range_at,
            contents_at,
        }
    }
}

/// Signs documents by appending an incremental update.
pub struct PlacementEngine<'a, B: SignatureBackend + ?Sized> {
    backend: &'a B,
    temp_dir: PathBuf,
    state: PlacementState,
}

impl<'a, B: SignatureBackend + ?Sized> PlacementEngine<'a, B> {
    /// Create an engine keeping scratch files in `temp_dir`.
    pub fn new(backend: &'a B, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            temp_dir: temp_dir.into(),
            state: PlacementState::Unsigned,
        }
    }

    /// The state reached by the last run.
    pub fn state(&self) -> PlacementState {
        self.state
    }

    fn advance(&mut self, next: PlacementState) {
        log::debug!("Signature placement: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Sign `source` into `output`. `source` is never modified.
    pub fn sign(&mut self, source: &Path, output: &Path, request: &SignRequest) -> Result<()> {
        self.state = PlacementState::Unsigned;
        if !source.is_file() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }
        request.options.validate()?;

        let output_dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".pdf_seal")
            .suffix(".pdf")
            .tempfile_in(&output_dir)?;
        let original_len = io::copy(&mut File::open(source)?, staged.as_file_mut())?;
        staged.as_file_mut().flush()?;

        let mut scratch = ScratchFile::create(&self.temp_dir)?;
        let calculator = ByteRangeCalculator::new(request.options.estimated_size);

        let (range, contents_at) = self.reserve(
            staged.path(),
            original_len,
            &mut scratch,
            &calculator,
            request,
        )?;

        let mut revision = scratch.file()?;
        revision.seek(SeekFrom::Start(0))?;
        let target = staged.as_file_mut();
        target.seek(SeekFrom::End(0))?;
        io::copy(&mut revision, target)?;
        target.flush()?;
        drop(scratch);

        let mut content = ByteRangeReader::new(staged.reopen()?, &range)?;
        let envelope = self
            .backend
            .sign(&mut content, &request.credentials, &request.policy)?;
        self.advance(PlacementState::EnvelopeComputed);
        log::debug!(
            "Envelope is {} bytes, {} reserved",
            envelope.len(),
            request.options.estimated_size
        );

        calculator.write_signature(staged.as_file_mut(), contents_at, &envelope)?;
        staged.as_file().sync_all()?;
        self.advance(PlacementState::Spliced);

        staged.persist(output).map_err(|e| Error::Io(e.error))?;
        self.advance(PlacementState::Closed);
        log::debug!("Signed document written to {}", output.display());
        Ok(())
    }

    /// Build the new revision into the scratch file and resolve its byte range.
    ///
    /// Returns the byte range and the absolute offset of `/Contents`.
    fn reserve(
        &mut self,
        staged: &Path,
        original_len: u64,
        scratch: &mut ScratchFile,
        calculator: &ByteRangeCalculator,
        request: &SignRequest,
    ) -> Result<(ByteRange, u64)> {
        let doc = Document::load(staged)?;
        if doc.trailer.has(b"Encrypt") {
            return Err(Error::Unsupported(
                "signing encrypted documents".to_string(),
            ));
        }
        let prev_xref = read_startxref(&mut File::open(staged)?)?;
        let signing_time = request
            .options
            .signing_time
            .unwrap_or_else(|| Local::now().fixed_offset());
        let field_name = match &request.options.field_name {
            Some(name) => name.clone(),
            None => next_field_name(&doc)?,
        };

        let mut ids = IdAllocator::new(&doc);
        let sig_id = ids.allocate();
        let widget_id = ids.allocate();

        let template =
            SignatureTemplate::render(&request.policy, &request.options, &signing_time, calculator);
        let mut update = IncrementalUpdate::new(trailer_for(&doc, prev_xref, ids.size())?);
        update.set_raw(sig_id, template.value.clone());
        wire_field(&doc, &mut update, sig_id, widget_id, &field_name)?;

        let written = update.write(scratch.file()?, original_len)?;
        scratch.file()?.flush()?;
        self.advance(PlacementState::PlaceholderReserved);

        let sig_at = written
            .value_offset(sig_id)
            .ok_or_else(|| Error::InvalidPdf("signature dictionary was not written".into()))?;
        let contents_at = sig_at + template.contents_at as u64;
        let total_len = original_len + written.length;
        let range = calculator.calculate_byte_range(total_len, contents_at);

        let byte_range_text = ByteRangeCalculator::format_byte_range(&range)?;
        let scratch_file = scratch.file()?;
        scratch_file.seek(SeekFrom::Start(
            sig_at - original_len + template.byte_range_at as u64,
        ))?;
        scratch_file.write_all(byte_range_text.as_bytes())?;
        scratch_file.flush()?;
        self.advance(PlacementState::ByteRangeResolved);
        log::debug!(
            "Field '{}' reserved: ByteRange {:?}, /Contents at {}",
            field_name,
            range.to_pdf_array(),
            contents_at
        );

        Ok((range, contents_at))
    }
}

/// Hands out object numbers above everything the document already uses.
struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    fn new(doc: &Document) -> Self {
        let size = doc
            .trailer
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        Self {
            next: size.max(doc.max_id + 1),
        }
    }

    fn allocate(&mut self) -> ObjectId {
        let id = (self.next, 0);
        self.next += 1;
        id
    }

    fn size(&self) -> u32 {
        self.next
    }
}

fn trailer_for(doc: &Document, prev_xref: u64, size: u32) -> Result<Dictionary> {
    let mut trailer = Dictionary::new();
    trailer.set("Size", Object::Integer(i64::from(size)));
    trailer.set(
        "Root",
        Object::Reference(doc.trailer.get(b"Root")?.as_reference()?),
    );
    trailer.set("Prev", Object::Integer(prev_xref as i64));
    for key in [b"Info".as_slice(), b"ID".as_slice()] {
        if let Ok(value) = doc.trailer.get(key) {
            trailer.set(key.to_vec(), value.clone());
        }
    }
    Ok(trailer)
}

/// `Signature{n}` with `n` one past the number of existing signature fields.
fn next_field_name(doc: &Document) -> Result<String> {
    let taken = field_names(doc)?;
    let mut n = signature_fields(doc)?.len() + 1;
    loop {
        let candidate = format!("Signature{}", n);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Add the widget, register it in `/AcroForm` and on the first page.
fn wire_field(
    doc: &Document,
    update: &mut IncrementalUpdate,
    sig_id: ObjectId,
    widget_id: ObjectId,
    field_name: &str,
) -> Result<()> {
    let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
    let page_id = doc
        .get_pages()
        .into_values()
        .next()
        .ok_or_else(|| Error::InvalidPdf("document has no pages".to_string()))?;

    let mut widget = Dictionary::new();
    widget.set("Type", Object::Name(b"Annot".to_vec()));
    widget.set("Subtype", Object::Name(b"Widget".to_vec()));
    widget.set("FT", Object::Name(b"Sig".to_vec()));
    widget.set(
        "T",
        Object::String(encode_text_string(field_name), StringFormat::Literal),
    );
    widget.set("V", Object::Reference(sig_id));
    widget.set("F", Object::Integer(WIDGET_FLAGS));
    widget.set("Rect", Object::Array(vec![Object::Integer(0); 4]));
    widget.set("P", Object::Reference(page_id));
    update.set_object(widget_id, Object::Dictionary(widget));

    // Form
    let mut catalog = doc.get_dictionary(catalog_id)?.clone();
    let (form_id, mut form) = match catalog.get(b"AcroForm") {
        Ok(Object::Reference(id)) => (Some(*id), doc.get_dictionary(*id)?.clone()),
        Ok(Object::Dictionary(dict)) => (None, dict.clone()),
        _ => (None, Dictionary::new()),
    };
    let mut fields = match form.get(b"Fields") {
        Ok(fields) => resolve(doc, fields)?.as_array()?.clone(),
        Err(_) => Vec::new(),
    };
    fields.push(Object::Reference(widget_id));
    form.set("Fields", Object::Array(fields));
    form.set("SigFlags", Object::Integer(SIG_FLAGS));
    match form_id {
        Some(id) => update.set_object(id, Object::Dictionary(form)),
        None => {
            catalog.set("AcroForm", Object::Dictionary(form));
            update.set_object(catalog_id, Object::Dictionary(catalog));
        },
    }

    // Page annotations
    let mut page = doc.get_dictionary(page_id)?.clone();
    let annots = page.get(b"Annots").ok().cloned();
    match annots {
        Some(Object::Reference(annots_id)) => {
            let mut list = doc.get_object(annots_id)?.as_array()?.clone();
            list.push(Object::Reference(widget_id));
            update.set_object(annots_id, Object::Array(list));
        },
        Some(Object::Array(mut list)) => {
            list.push(Object::Reference(widget_id));
            page.set("Annots", Object::Array(list));
            update.set_object(page_id, Object::Dictionary(page));
        },
        _ => {
            page.set("Annots", Object::Array(vec![Object::Reference(widget_id)]));
            update.set_object(page_id, Object::Dictionary(page));
        },
    }
    Ok(())
}
