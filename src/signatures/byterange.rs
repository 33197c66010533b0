//! ByteRange handling for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of integer pairs, in practice four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of file
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.
//! [`ByteRangeReader`] streams the covered bytes of a file without loading it
//! into memory, both when signing and when re-deriving the signed content.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// Validated list of `(offset, length)` spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    spans: Vec<(u64, u64)>,
}

impl ByteRange {
    /// Create a byte range from explicit spans.
    pub fn new(spans: Vec<(u64, u64)>) -> Self {
        Self { spans }
    }

    /// The two-span range surrounding a `/Contents` value.
    pub fn around(contents_start: u64, contents_end: u64, file_size: u64) -> Self {
        Self::new(vec![
            (0, contents_start),
            (contents_end, file_size.saturating_sub(contents_end)),
        ])
    }

    /// Parse the integers of a `/ByteRange` array.
    ///
    /// The array must hold a non-zero, even number of non-negative integers.
    pub fn from_pdf_array(values: &[i64]) -> Result<Self> {
        if values.is_empty() || values.len() % 2 != 0 {
            return Err(Error::InvalidByteRange(format!(
                "expected an even number of integers, got {}",
                values.len()
            )));
        }
        let mut spans = Vec::with_capacity(values.len() / 2);
        for pair in values.chunks_exact(2) {
            let (offset, length) = (pair[0], pair[1]);
            if offset < 0 || length < 0 {
                return Err(Error::InvalidByteRange(format!(
                    "negative span {} {}",
                    offset, length
                )));
            }
            spans.push((offset as u64, length as u64));
        }
        Ok(Self { spans })
    }

    /// Render back to the integers of a `/ByteRange` array.
    pub fn to_pdf_array(&self) -> Vec<i64> {
        self.spans
            .iter()
            .flat_map(|&(offset, length)| [offset as i64, length as i64])
            .collect()
    }

    /// The spans in file order.
    pub fn spans(&self) -> &[(u64, u64)] {
        &self.spans
    }

    /// Number of bytes visible through this range.
    pub fn total_len(&self) -> u64 {
        self.spans.iter().map(|&(_, length)| length).sum()
    }

    /// Fail if any span reaches past `file_size`.
    pub fn check_bounds(&self, file_size: u64) -> Result<()> {
        for &(offset, length) in &self.spans {
            let end = offset.checked_add(length);
            if end.map_or(true, |end| end > file_size) {
                return Err(Error::ByteRangeOutOfBounds {
                    offset,
                    length,
                    file_size,
                });
            }
        }
        Ok(())
    }

    /// The excluded region between the first two spans, if any.
    pub fn gap(&self) -> Option<(u64, u64)> {
        match self.spans.as_slice() {
            [(first_offset, first_len), (second_offset, _), ..] => {
                let gap_start = first_offset + first_len;
                (gap_start <= *second_offset).then_some((gap_start, *second_offset))
            },
            _ => None,
        }
    }

    /// Check whether this range covers the entire document except one signature value.
    ///
    /// A covering ByteRange:
    /// - Starts at offset 0
    /// - Ends at the file size
    /// - Has exactly one gap, between the two spans
    pub fn covers_whole_document(&self, file_size: u64) -> bool {
        match self.spans.as_slice() {
            [(0, length1), (offset2, length2)] => {
                length1 <= offset2 && offset2.checked_add(*length2) == Some(file_size)
            },
            _ => false,
        }
    }
}

/// Sequential reader over the concatenation of a [`ByteRange`]'s spans.
///
/// Seeks to each span in turn; bytes outside the spans are never returned.
pub struct ByteRangeReader<R> {
    inner: R,
    spans: Vec<(u64, u64)>,
    index: usize,
    remaining: u64,
    positioned: bool,
}

impl<R: Read + Seek> ByteRangeReader<R> {
    /// Wrap `inner`, failing if any span exceeds its length.
    pub fn new(mut inner: R, range: &ByteRange) -> Result<Self> {
        let file_size = inner.seek(SeekFrom::End(0))?;
        range.check_bounds(file_size)?;
        Ok(Self {
            inner,
            spans: range.spans().to_vec(),
            index: 0,
            remaining: 0,
            positioned: false,
        })
    }

    /// Give back the wrapped source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for ByteRangeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(&(offset, length)) = self.spans.get(self.index) else {
                return Ok(0);
            };
            if !self.positioned {
                self.inner.seek(SeekFrom::Start(offset))?;
                self.remaining = length;
                self.positioned = true;
            }
            if self.remaining == 0 {
                self.index += 1;
                self.positioned = false;
                continue;
            }

            let want = buf.len().min(self.remaining as usize);
            let read = self.inner.read(&mut buf[..want])?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended inside span {}+{}", offset, length),
                ));
            }
            self.remaining -= read as u64;
            return Ok(read);
        }
    }
}

/// Calculator for the signature placeholders inside a signature dictionary.
#[derive(Debug)]
pub struct ByteRangeCalculator {
    /// Size of the placeholder for the signature value (hex digits + 2 for angle brackets)
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Bytes reserved for the `/ByteRange` array value.
    pub const BYTE_RANGE_WIDTH: usize = 60;

    /// Create a new calculator for a DER envelope of up to `estimated_signature_size` bytes.
    ///
    /// The placeholder size will be calculated as: (signature_size * 2) + 2
    /// because the signature is hex-encoded and enclosed in angle brackets.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            placeholder_size: estimated_signature_size * 2 + 2,
        }
    }

    /// Create a calculator with a specific placeholder size.
    pub fn with_placeholder_size(placeholder_size: usize) -> Self {
        Self { placeholder_size }
    }

    /// Size of the `/Contents` value including the angle brackets.
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// Hex digits available for the envelope.
    pub fn reserved_hex_digits(&self) -> usize {
        self.placeholder_size.saturating_sub(2)
    }

    /// Placeholder for the signature contents: `<000...000>`.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.reserved_hex_digits()))
    }

    /// Placeholder for the `/ByteRange` value, space padded to [`Self::BYTE_RANGE_WIDTH`].
    pub fn byte_range_placeholder() -> String {
        format!("{:<width$}", "[0 0 0 0]", width = Self::BYTE_RANGE_WIDTH)
    }

    /// Calculate the ByteRange given the position of the /Contents value.
    ///
    /// `contents_offset` is where the value starts, including its `<`.
    pub fn calculate_byte_range(&self, file_size: u64, contents_offset: u64) -> ByteRange {
        ByteRange::around(
            contents_offset,
            contents_offset + self.placeholder_size as u64,
            file_size,
        )
    }

    /// Format a ByteRange as a fixed-width PDF array.
    pub fn format_byte_range(range: &ByteRange) -> Result<String> {
        let values: Vec<String> = range.to_pdf_array().iter().map(i64::to_string).collect();
        let array = format!("[{}]", values.join(" "));
        if array.len() > Self::BYTE_RANGE_WIDTH {
            return Err(Error::InvalidByteRange(format!(
                "{} does not fit into {} reserved bytes",
                array,
                Self::BYTE_RANGE_WIDTH
            )));
        }
        Ok(format!("{:<width$}", array, width = Self::BYTE_RANGE_WIDTH))
    }

    /// Hex-encode `envelope` into a value exactly as long as the placeholder.
    ///
    /// Unused digits are zero padded. Never truncates.
    pub fn encode_contents(&self, envelope: &[u8]) -> Result<String> {
        let hex = hex::encode_upper(envelope);
        let reserved = self.reserved_hex_digits();
        if hex.len() > reserved {
            return Err(Error::EnvelopeTooLarge {
                required: hex.len(),
                reserved,
            });
        }
        let mut value = String::with_capacity(self.placeholder_size);
        value.push('<');
        value.push_str(&hex);
        value.extend(std::iter::repeat('0').take(reserved - hex.len()));
        value.push('>');
        Ok(value)
    }

    /// Replace the placeholder in an in-memory PDF with the envelope.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        envelope: &[u8],
    ) -> Result<()> {
        let value = self.encode_contents(envelope)?;
        let end = contents_offset + self.placeholder_size;
        if end > pdf_data.len() {
            return Err(Error::ByteRangeOutOfBounds {
                offset: contents_offset as u64,
                length: self.placeholder_size as u64,
                file_size: pdf_data.len() as u64,
            });
        }
        pdf_data[contents_offset..end].copy_from_slice(value.as_bytes());
        Ok(())
    }

    /// Overwrite the placeholder of a file in place. The file length never changes.
    pub fn write_signature<W: Write + Seek>(
        &self,
        target: &mut W,
        contents_offset: u64,
        envelope: &[u8],
    ) -> Result<()> {
        let value = self.encode_contents(envelope)?;
        let file_size = target.seek(SeekFrom::End(0))?;
        if contents_offset + self.placeholder_size as u64 > file_size {
            return Err(Error::ByteRangeOutOfBounds {
                offset: contents_offset,
                length: self.placeholder_size as u64,
                file_size,
            });
        }
        target.seek(SeekFrom::Start(contents_offset))?;
        target.write_all(value.as_bytes())?;
        target.flush()?;
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(8192)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(data: &[u8], range: &ByteRange) -> Result<Vec<u8>> {
        let mut reader = ByteRangeReader::new(Cursor::new(data), range)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_placeholder_size() {
        let calc = ByteRangeCalculator::new(1024);
        // 1024 bytes * 2 (hex) + 2 (brackets) = 2050
        assert_eq!(calc.placeholder_size(), 2050);
        assert_eq!(calc.reserved_hex_digits(), 2048);
    }

    #[test]
    fn test_generate_placeholder() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let placeholder = calc.generate_placeholder();
        assert_eq!(placeholder, "<00000000>");
        assert_eq!(placeholder.len(), 10);
    }

    #[test]
    fn test_calculate_byte_range() {
        let calc = ByteRangeCalculator::with_placeholder_size(100);
        let range = calc.calculate_byte_range(1000, 400);
        assert_eq!(range.to_pdf_array(), vec![0, 400, 500, 500]);
        assert_eq!(range.gap(), Some((400, 500)));
        assert!(range.covers_whole_document(1000));
    }

    #[test]
    fn test_format_byte_range_is_fixed_width() {
        let short = ByteRange::from_pdf_array(&[0, 1, 2, 3]).unwrap();
        let long = ByteRange::from_pdf_array(&[0, 123456789, 123466789, 987654321]).unwrap();
        let a = ByteRangeCalculator::format_byte_range(&short).unwrap();
        let b = ByteRangeCalculator::format_byte_range(&long).unwrap();
        assert_eq!(a.len(), ByteRangeCalculator::BYTE_RANGE_WIDTH);
        assert_eq!(b.len(), ByteRangeCalculator::BYTE_RANGE_WIDTH);
        assert!(a.starts_with("[0 1 2 3]"));
        assert_eq!(
            ByteRangeCalculator::byte_range_placeholder().len(),
            ByteRangeCalculator::BYTE_RANGE_WIDTH
        );
    }

    #[test]
    fn test_from_pdf_array_rejects_odd_and_negative() {
        assert!(ByteRange::from_pdf_array(&[]).is_err());
        assert!(ByteRange::from_pdf_array(&[0, 10, 20]).is_err());
        assert!(matches!(
            ByteRange::from_pdf_array(&[0, -1, 20, 5]),
            Err(Error::InvalidByteRange(_))
        ));
    }

    #[test]
    fn test_reader_concatenates_spans() {
        let data = b"AAABBBCCC";
        let range = ByteRange::from_pdf_array(&[0, 3, 6, 3]).unwrap();
        assert_eq!(read_all(data, &range).unwrap(), b"AAACCC");
    }

    #[test]
    fn test_reader_handles_empty_spans() {
        let data = b"0123456789";
        let range = ByteRange::new(vec![(2, 0), (4, 2), (9, 0), (0, 1)]);
        assert_eq!(read_all(data, &range).unwrap(), b"450");
    }

    #[test]
    fn test_reader_rejects_out_of_bounds_span() {
        let data = b"short";
        let range = ByteRange::new(vec![(0, 2), (3, 10)]);
        match read_all(data, &range) {
            Err(Error::ByteRangeOutOfBounds {
                offset,
                length,
                file_size,
            }) => {
                assert_eq!((offset, length, file_size), (3, 10, 5));
            },
            other => panic!("expected ByteRangeOutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_covers_whole_document() {
        let range = ByteRange::from_pdf_array(&[0, 100, 150, 50]).unwrap();
        assert!(range.covers_whole_document(200));
        assert!(!range.covers_whole_document(250));

        let shifted = ByteRange::from_pdf_array(&[10, 100, 150, 50]).unwrap();
        assert!(!shifted.covers_whole_document(200));

        let overlapping = ByteRange::from_pdf_array(&[0, 160, 150, 50]).unwrap();
        assert!(!overlapping.covers_whole_document(200));
    }

    #[test]
    fn test_insert_signature() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let mut pdf_data = b"XX<00000000>YY".to_vec();

        calc.insert_signature(&mut pdf_data, 2, &[0xAB, 0xCD]).unwrap();

        // 8 hex digits reserved, "ABCD" padded with 4 zeros
        assert_eq!(&pdf_data, b"XX<ABCD0000>YY");
    }

    #[test]
    fn test_insert_signature_too_large() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let mut pdf_data = b"XX<00000000>YY".to_vec();

        let result = calc.insert_signature(&mut pdf_data, 2, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert!(matches!(
            result,
            Err(Error::EnvelopeTooLarge {
                required: 10,
                reserved: 8
            })
        ));
        assert_eq!(&pdf_data, b"XX<00000000>YY");
    }

    #[test]
    fn test_write_signature_keeps_length() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let mut file = Cursor::new(b"XX<00000000>YY".to_vec());
        calc.write_signature(&mut file, 2, &[0x01]).unwrap();
        assert_eq!(file.into_inner(), b"XX<01000000>YY".to_vec());
    }
}
