//! Incremental update sections.
//!
//! An incremental update appends changed and new objects after the original
//! bytes, followed by a cross-reference section covering only those objects
//! and a trailer whose `/Prev` points at the previous cross-reference section.
//! Nothing before the update is rewritten.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};

use lopdf::{Dictionary, Object, ObjectId};

use super::object_serializer::ObjectSerializer;
use crate::error::{Error, Result};

/// How far from the end of a file `startxref` is searched for.
const STARTXREF_WINDOW: u64 = 4096;

enum UpdateEntry {
    Object(Object),
    /// Pre-serialized object value
    Raw(Vec<u8>),
}

/// Objects to append as one incremental update.
pub struct IncrementalUpdate {
    serializer: ObjectSerializer,
    entries: BTreeMap<ObjectId, UpdateEntry>,
    trailer: Dictionary,
}

/// Offsets of a written update, relative to the start of the file.
#[derive(Debug, Clone, Default)]
pub struct WrittenUpdate {
    object_offsets: BTreeMap<ObjectId, u64>,
    value_offsets: BTreeMap<ObjectId, u64>,
    /// Offset of the `xref` keyword
    pub xref_offset: u64,
    /// Bytes written
    pub length: u64,
}

impl WrittenUpdate {
    /// Offset of the `obj` header line.
    pub fn object_offset(&self, id: ObjectId) -> Option<u64> {
        self.object_offsets.get(&id).copied()
    }

    /// Offset of the first byte of the object value.
    pub fn value_offset(&self, id: ObjectId) -> Option<u64> {
        self.value_offsets.get(&id).copied()
    }
}

impl IncrementalUpdate {
    /// Start an update with the trailer it will end with.
    ///
    /// The trailer should at least carry `/Size`, `/Root` and `/Prev`.
    pub fn new(trailer: Dictionary) -> Self {
        Self {
            serializer: ObjectSerializer::compact(),
            entries: BTreeMap::new(),
            trailer,
        }
    }

    /// Add or replace an object.
    pub fn set_object(&mut self, id: ObjectId, object: Object) {
        self.entries.insert(id, UpdateEntry::Object(object));
    }

    /// Add an object whose value was serialized by the caller.
    pub fn set_raw(&mut self, id: ObjectId, value: Vec<u8>) {
        self.entries.insert(id, UpdateEntry::Raw(value));
    }

    /// Number of objects in the update.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the update holds no objects.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the update, assuming `out` is positioned at file offset `base_offset`.
    pub fn write<W: Write>(&self, out: &mut W, base_offset: u64) -> Result<WrittenUpdate> {
        let mut buf = Vec::new();
        let mut written = WrittenUpdate::default();

        // The previous revision may end without an EOL after %%EOF
        buf.push(b'\n');

        for (&id, entry) in &self.entries {
            written
                .object_offsets
                .insert(id, base_offset + buf.len() as u64);
            buf.extend_from_slice(&ObjectSerializer::indirect_header(id));
            written
                .value_offsets
                .insert(id, base_offset + buf.len() as u64);
            match entry {
                UpdateEntry::Object(object) => self.serializer.write_object(&mut buf, object),
                UpdateEntry::Raw(value) => buf.extend_from_slice(value),
            }
            buf.extend_from_slice(ObjectSerializer::INDIRECT_FOOTER);
        }

        written.xref_offset = base_offset + buf.len() as u64;
        buf.extend_from_slice(b"xref\n");
        for section in subsections(&written.object_offsets) {
            let first = section[0].0;
            buf.extend_from_slice(format!("{} {}\n", first.0, section.len()).as_bytes());
            for &(id, offset) in &section {
                buf.extend_from_slice(format!("{:010} {:05} n \n", offset, id.1).as_bytes());
            }
        }

        buf.extend_from_slice(b"trailer\n");
        self.serializer
            .write_object(&mut buf, &Object::Dictionary(self.trailer.clone()));
        buf.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", written.xref_offset).as_bytes());

        out.write_all(&buf)?;
        written.length = buf.len() as u64;
        log::debug!(
            "Incremental update: {} object(s), xref at {}, {} bytes",
            self.entries.len(),
            written.xref_offset,
            written.length
        );
        Ok(written)
    }
}

/// Group object offsets into runs of consecutive object numbers.
fn subsections(offsets: &BTreeMap<ObjectId, u64>) -> Vec<Vec<(ObjectId, u64)>> {
    let mut sections: Vec<Vec<(ObjectId, u64)>> = Vec::new();
    for (&id, &offset) in offsets {
        match sections.last_mut() {
            Some(section) if section.last().map(|(last, _)| last.0 + 1) == Some(id.0) => {
                section.push((id, offset));
            },
            _ => sections.push(vec![(id, offset)]),
        }
    }
    sections
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_startxref(bytes: &[u8]) -> Result<u64> {
    let keyword = b"startxref";
    let pos = bytes
        .windows(keyword.len())
        .rposition(|window| window == keyword)
        .ok_or_else(|| Error::InvalidPdf("Could not find startxref".to_string()))?;

    let offset: String = bytes[pos + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();
    offset
        .parse::<u64>()
        .map_err(|_| Error::InvalidPdf("startxref is not followed by an offset".to_string()))
}

/// Read the `startxref` offset from the tail of a file.
pub fn read_startxref<R: Read + Seek>(source: &mut R) -> Result<u64> {
    let len = source.seek(SeekFrom::End(0))?;
    let start = len.saturating_sub(STARTXREF_WINDOW);
    source.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::with_capacity((len - start) as usize);
    source.take(len - start).read_to_end(&mut tail)?;
    find_startxref(&tail)
}
