//! PDF object serialization.
//!
//! Serializes `lopdf` objects to their byte representation following
//! PDF specification ISO 32000-1:2008 Section 7.3.

use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Use compact output (no extra whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer.
    pub fn new() -> Self {
        Self { compact: false }
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (lossy for binary strings and streams).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: ObjectId, obj: &Object) -> Vec<u8> {
        let mut buf = Self::indirect_header(id);
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(Self::INDIRECT_FOOTER);
        buf
    }

    /// Opening line of an indirect object.
    pub fn indirect_header(id: ObjectId) -> Vec<u8> {
        format!("{} {} obj\n", id.0, id.1).into_bytes()
    }

    /// Closing line of an indirect object.
    pub const INDIRECT_FOOTER: &'static [u8] = b"\nendobj\n";

    /// Write an object to a buffer.
    pub fn write_object(&self, buf: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => buf.extend_from_slice(b"null"),
            Object::Boolean(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => buf.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => Self::write_real(buf, f64::from(*r)),
            Object::String(data, format) => Self::write_string(buf, data, *format),
            Object::Name(name) => Self::write_name(buf, name),
            Object::Array(arr) => self.write_array(buf, arr),
            Object::Dictionary(dict) => self.write_dictionary(buf, dict),
            Object::Stream(stream) => self.write_stream(buf, stream),
            Object::Reference((id, gen)) => {
                buf.extend_from_slice(format!("{} {} R", id, gen).as_bytes())
            },
        }
    }

    /// Write a real number with appropriate precision.
    fn write_real(buf: &mut Vec<u8>, value: f64) {
        // Remove trailing zeros for compact output
        if value.fract() == 0.0 {
            buf.extend_from_slice((value as i64).to_string().as_bytes());
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            buf.extend_from_slice(trimmed.as_bytes());
        }
    }

    /// Write a PDF string.
    ///
    /// Literal strings are escaped; hexadecimal strings use upper case digits.
    pub fn write_string(buf: &mut Vec<u8>, data: &[u8], format: StringFormat) {
        match format {
            StringFormat::Literal => {
                buf.push(b'(');
                for &byte in data {
                    match byte {
                        b'(' => buf.extend_from_slice(b"\\("),
                        b')' => buf.extend_from_slice(b"\\)"),
                        b'\\' => buf.extend_from_slice(b"\\\\"),
                        b'\n' => buf.extend_from_slice(b"\\n"),
                        b'\r' => buf.extend_from_slice(b"\\r"),
                        _ => buf.push(byte),
                    }
                }
                buf.push(b')');
            },
            StringFormat::Hexadecimal => {
                buf.push(b'<');
                buf.extend_from_slice(hex::encode_upper(data).as_bytes());
                buf.push(b'>');
            },
        }
    }

    /// Write a PDF name.
    ///
    /// Names start with `/` and escape special characters with `#xx`.
    pub fn write_name(buf: &mut Vec<u8>, name: &[u8]) {
        buf.push(b'/');
        for &byte in name {
            match byte {
                b'!'
                | b'"'
                | b'$'
                | b'&'
                | b'\''
                | b'*'..=b'.'
                | b'0'..=b'9'
                | b':'
                | b';'
                | b'='
                | b'?'
                | b'@'
                | b'A'..=b'Z'
                | b'\\'
                | b'^'..=b'z'
                | b'|'
                | b'~' => buf.push(byte),
                _ => buf.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
            }
        }
    }

    fn write_array(&self, buf: &mut Vec<u8>, arr: &[Object]) {
        buf.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                buf.push(b' ');
            }
            self.write_object(buf, obj);
        }
        buf.push(b']');
    }

    fn write_dictionary(&self, buf: &mut Vec<u8>, dict: &Dictionary) {
        buf.extend_from_slice(b"<<");
        for (key, value) in dict.iter() {
            if self.compact {
                buf.push(b' ');
            } else {
                buf.extend_from_slice(b"\n  ");
            }
            Self::write_name(buf, key);
            buf.push(b' ');
            self.write_object(buf, value);
        }
        if self.compact {
            buf.push(b' ');
        } else if !dict.is_empty() {
            buf.push(b'\n');
        }
        buf.extend_from_slice(b">>");
    }

    /// Write a stream, forcing `/Length` to the actual content length.
    fn write_stream(&self, buf: &mut Vec<u8>, stream: &Stream) {
        let mut dict = stream.dict.clone();
        dict.set("Length", Object::Integer(stream.content.len() as i64));
        self.write_dictionary(buf, &dict);
        buf.extend_from_slice(b"\nstream\n");
        buf.extend_from_slice(&stream.content);
        buf.extend_from_slice(b"\nendstream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_serialize_scalars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(true)), "true");
        assert_eq!(s.serialize_to_string(&Object::Integer(-123)), "-123");
    }

    #[test]
    fn test_serialize_real() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Real(1.0)), "1");
        assert_eq!(s.serialize_to_string(&Object::Real(0.5)), "0.5");
    }

    #[test]
    fn test_serialize_literal_string() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::string_literal("Hello")), "(Hello)");
        assert_eq!(
            s.serialize_to_string(&Object::string_literal("Test (parens)")),
            "(Test \\(parens\\))"
        );
    }

    #[test]
    fn test_serialize_hex_string() {
        let s = ObjectSerializer::new();
        let obj = Object::String(vec![0x00, 0xFF, 0x80], StringFormat::Hexadecimal);
        assert_eq!(s.serialize_to_string(&obj), "<00FF80>");
    }

    #[test]
    fn test_serialize_name_with_special_chars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Name(b"Type".to_vec())), "/Type");
        assert_eq!(
            s.serialize_to_string(&Object::Name(b"Name With Space".to_vec())),
            "/Name#20With#20Space"
        );
        assert_eq!(s.serialize_to_string(&Object::Name(b"a/b".to_vec())), "/a#2Fb");
        assert_eq!(s.serialize_to_string(&Object::Name(b"50%(x)".to_vec())), "/50#25#28x#29");
    }

    #[test]
    fn test_serialize_compact_dictionary_keeps_order() {
        let s = ObjectSerializer::compact();
        let dict = dictionary! {
            "Type" => Object::Name(b"Annot".to_vec()),
            "F" => Object::Integer(132),
            "Rect" => Object::Array(vec![Object::Integer(0); 4]),
            "P" => Object::Reference((4, 0)),
        };
        assert_eq!(
            s.serialize_to_string(&Object::Dictionary(dict)),
            "<< /Type /Annot /F 132 /Rect [0 0 0 0] /P 4 0 R >>"
        );
    }

    #[test]
    fn test_serialize_indirect() {
        let s = ObjectSerializer::compact();
        let bytes = s.serialize_indirect((12, 0), &Object::Integer(42));
        assert_eq!(bytes, b"12 0 obj\n42\nendobj\n".to_vec());
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let s = ObjectSerializer::compact();
        let stream = Stream::new(dictionary! { "Length" => Object::Integer(999) }, b"stream data".to_vec());
        let result = s.serialize_to_string(&Object::Stream(stream));
        assert!(result.contains("/Length 11"));
        assert!(result.contains("\nstream\nstream data\nendstream"));
    }
}
