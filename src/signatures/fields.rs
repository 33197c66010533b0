//! Signature fields of an interactive form.
//!
//! Walks `/AcroForm /Fields` and their `/Kids`, inheriting `/FT` and joining
//! partial names with `.`, and reads the signature dictionaries found in the
//! `/V` entries of signature fields.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::types::{decode_text_string, SignatureDictionary};
use crate::error::{Error, Result};

/// One signature field.
#[derive(Debug, Clone)]
pub struct SignatureField {
    /// Fully qualified field name
    pub name: Option<String>,
    /// The field's own object, when it is indirect
    pub id: Option<ObjectId>,
    /// Parsed `/V`, absent for unsigned fields
    pub value: Option<SignatureDictionary>,
    /// Why `/V` could not be read, when it is present but malformed
    pub malformed: Option<String>,
}

impl SignatureField {
    /// Whether the field carries a signature, readable or not.
    pub fn is_signed(&self) -> bool {
        self.value.is_some() || self.malformed.is_some()
    }
}

/// Follow a reference, leaving direct objects as they are.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// The catalog's `/AcroForm`, if any.
pub(crate) fn acroform(doc: &Document) -> Result<Option<&Dictionary>> {
    let catalog = doc.catalog()?;
    match catalog.get(b"AcroForm") {
        Ok(object) => Ok(Some(resolve(doc, object)?.as_dict()?)),
        Err(_) => Ok(None),
    }
}

/// Everything a walk over the form collects.
#[derive(Default)]
struct FormWalk {
    visited: HashSet<ObjectId>,
    names: HashSet<String>,
    signatures: Vec<SignatureField>,
}

impl FormWalk {
    fn run(doc: &Document) -> Result<Self> {
        let mut walk = Self::default();
        let Some(form) = acroform(doc)? else {
            return Ok(walk);
        };
        let Ok(fields) = form.get(b"Fields") else {
            return Ok(walk);
        };
        for field in resolve(doc, fields)?.as_array()? {
            walk.visit(doc, field, None, None)?;
        }
        Ok(walk)
    }

    fn visit(
        &mut self,
        doc: &Document,
        field: &Object,
        parent_name: Option<&str>,
        inherited_type: Option<&[u8]>,
    ) -> Result<()> {
        let id = match field {
            Object::Reference(id) => {
                if !self.visited.insert(*id) {
                    log::warn!("Form field {:?} is referenced twice, skipping", id);
                    return Ok(());
                }
                Some(*id)
            },
            _ => None,
        };
        let dict = resolve(doc, field)?.as_dict()?;

        let partial = dict.get(b"T").and_then(Object::as_str).ok().map(decode_text_string);
        let name = match (parent_name, partial) {
            (Some(parent), Some(partial)) => Some(format!("{}.{}", parent, partial)),
            (None, Some(partial)) => Some(partial),
            (parent, None) => parent.map(str::to_string),
        };
        if let Some(name) = &name {
            self.names.insert(name.clone());
        }
        let field_type = dict.get(b"FT").and_then(Object::as_name).ok().or(inherited_type);

        if let Ok(kids) = dict.get(b"Kids") {
            let kids = resolve(doc, kids)?.as_array()?;
            // Widgets without /T merge into their parent field
            let has_named_kids = kids.iter().any(|kid| {
                resolve(doc, kid)
                    .and_then(|k| k.as_dict().map_err(Error::from))
                    .map(|k| k.has(b"T"))
                    .unwrap_or(false)
            });
            if has_named_kids {
                for kid in kids {
                    self.visit(doc, kid, name.as_deref(), field_type)?;
                }
                return Ok(());
            }
        }

        if field_type == Some(b"Sig".as_slice()) {
            let (value, malformed) = match dict.get(b"V") {
                Ok(value) => match read_value(doc, value, name.clone()) {
                    Ok(parsed) => (Some(parsed), None),
                    Err(e) => {
                        log::warn!("Signature field {:?} has a malformed value: {}", name, e);
                        (None, Some(e.to_string()))
                    },
                },
                Err(_) => (None, None),
            };
            self.signatures.push(SignatureField {
                name,
                id,
                value,
                malformed,
            });
        }
        Ok(())
    }
}

fn read_value(
    doc: &Document,
    value: &Object,
    field_name: Option<String>,
) -> Result<SignatureDictionary> {
    let dict = resolve(doc, value)?.as_dict()?;
    parse_signature_dictionary(dict, field_name)
}

/// All signature fields in form order.
///
/// A field whose `/V` cannot be read is still listed, with the reason in
/// [`SignatureField::malformed`].
pub fn signature_fields(doc: &Document) -> Result<Vec<SignatureField>> {
    Ok(FormWalk::run(doc)?.signatures)
}

/// Fully qualified names of every field in the form, used to pick a fresh field name.
pub fn field_names(doc: &Document) -> Result<HashSet<String>> {
    Ok(FormWalk::run(doc)?.names)
}

fn text(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .and_then(Object::as_str)
        .ok()
        .map(decode_text_string)
}

fn name(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .and_then(Object::as_name)
        .ok()
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

/// Read the entries of a `/Type /Sig` dictionary.
pub fn parse_signature_dictionary(
    dict: &Dictionary,
    field_name: Option<String>,
) -> Result<SignatureDictionary> {
    let byte_range = match dict.get(b"ByteRange") {
        Ok(Object::Array(values)) => values
            .iter()
            .map(|v| v.as_i64())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidByteRange("non-integer entry".to_string()))?,
        _ => Vec::new(),
    };
    let contents = dict
        .get(b"Contents")
        .and_then(Object::as_str)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    Ok(SignatureDictionary {
        field_name,
        filter: name(dict, b"Filter"),
        sub_filter: name(dict, b"SubFilter"),
        name: text(dict, b"Name"),
        location: text(dict, b"Location"),
        reason: text(dict, b"Reason"),
        contact_info: text(dict, b"ContactInfo"),
        signing_time: text(dict, b"M"),
        byte_range,
        contents,
    })
}
