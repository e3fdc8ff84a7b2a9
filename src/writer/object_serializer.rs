//! Object serialization.
//!
//! Turns [`Object`] values back into file syntax. Output parses back to an
//! equal value: reals keep a decimal point, names escape delimiters with
//! `#XX`, and literal strings escape every byte the lexer would normalize.

use crate::lexer::{is_delimiter, is_whitespace};
use crate::object::{Dictionary, Object};
use std::io::{self, Write};

/// Whitespace style between dictionary entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Layout {
    /// One line per object: `<< /A 1 /B 2 >>`
    Compact,
    /// One entry per line, nested dictionaries indented
    #[default]
    Indented,
}

/// Writes objects in file syntax.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    layout: Layout,
}

/// Bytes that may appear unescaped in a name.
fn is_regular_name_byte(byte: u8) -> bool {
    (0x21..=0x7E).contains(&byte) && byte != b'#' && !is_delimiter(byte) && !is_whitespace(byte)
}

/// Text that reads better as `(...)` than as `<...>`.
fn prefers_literal(data: &[u8]) -> bool {
    data.iter().all(|&b| matches!(b, b'\n' | b'\r' | b'\t' | 0x20..=0x7E))
}

impl ObjectSerializer {
    /// Serializer that puts each dictionary entry on its own line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with minimal whitespace.
    pub fn compact() -> Self {
        Self {
            layout: Layout::Compact,
        }
    }

    /// Serialize to a byte vector.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writes into a Vec cannot fail
        let _ = self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize to a string, for logs and tests.
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Write `id gen obj`, the object, and `endobj`.
    pub fn write_indirect<W: Write>(
        &self,
        w: &mut W,
        id: u32,
        gen: u16,
        obj: &Object,
    ) -> io::Result<()> {
        writeln!(w, "{} {} obj", id, gen)?;
        self.write_object(w, obj)?;
        w.write_all(b"\nendobj\n")
    }

    /// Write a direct object.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> io::Result<()> {
        self.emit(w, obj, 0)
    }

    fn emit<W: Write>(&self, w: &mut W, obj: &Object, depth: usize) -> io::Result<()> {
        match obj {
            Object::Null => w.write_all(b"null"),
            Object::Boolean(true) => w.write_all(b"true"),
            Object::Boolean(false) => w.write_all(b"false"),
            Object::Integer(value) => write!(w, "{}", value),
            Object::Real(value) => emit_real(w, *value),
            Object::String(data) if prefers_literal(data) => emit_literal(w, data),
            Object::String(data) => emit_hex(w, data),
            Object::Name(name) => emit_name(w, name),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
            Object::Array(items) => {
                w.write_all(b"[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        w.write_all(b" ")?;
                    }
                    self.emit(w, item, depth + 1)?;
                }
                w.write_all(b"]")
            },
            Object::Dictionary(dict) => self.emit_dict(w, dict, depth),
            Object::Stream { dict, data } => {
                // /Length always describes the bytes actually written
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
                self.emit_dict(w, &dict, depth)?;
                w.write_all(b"\nstream\n")?;
                w.write_all(data)?;
                w.write_all(b"\nendstream")
            },
        }
    }

    fn emit_dict<W: Write>(&self, w: &mut W, dict: &Dictionary, depth: usize) -> io::Result<()> {
        w.write_all(b"<<")?;
        for (key, value) in dict {
            match self.layout {
                Layout::Compact => w.write_all(b" ")?,
                Layout::Indented => write!(w, "\n{:width$}", "", width = 2 * (depth + 1))?,
            }
            emit_name(w, key)?;
            w.write_all(b" ")?;
            self.emit(w, value, depth + 1)?;
        }
        match self.layout {
            Layout::Compact => w.write_all(b" >>"),
            Layout::Indented if dict.is_empty() => w.write_all(b">>"),
            Layout::Indented => write!(w, "\n{:width$}>>", "", width = 2 * depth),
        }
    }
}

fn emit_real<W: Write>(w: &mut W, value: f64) -> io::Result<()> {
    if !value.is_finite() {
        log::warn!("Writing non-finite real {} as 0.0", value);
        return w.write_all(b"0.0");
    }
    let text = value.to_string();
    w.write_all(text.as_bytes())?;
    // Integral values need a point to read back as reals
    if !text.contains('.') {
        w.write_all(b".0")?;
    }
    Ok(())
}

fn emit_literal<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    let mut out = Vec::with_capacity(data.len() + 2);
    out.push(b'(');
    for &byte in data {
        let escaped: &[u8] = match byte {
            b'(' => b"\\(",
            b')' => b"\\)",
            b'\\' => b"\\\\",
            b'\n' => b"\\n",
            // a raw CR would read back as LF
            b'\r' => b"\\r",
            b'\t' => b"\\t",
            _ => {
                out.push(byte);
                continue;
            },
        };
        out.extend_from_slice(escaped);
    }
    out.push(b')');
    w.write_all(&out)
}

fn emit_hex<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    let hex: String = data.iter().map(|b| format!("{:02X}", b)).collect();
    write!(w, "<{}>", hex)
}

fn emit_name<W: Write>(w: &mut W, name: &str) -> io::Result<()> {
    w.write_all(b"/")?;
    for byte in name.bytes() {
        if is_regular_name_byte(byte) {
            w.write_all(&[byte])?;
        } else {
            write!(w, "#{:02X}", byte)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{DictBuilder, ObjectRef};
    use crate::parser::parse_object;
    use proptest::prelude::*;

    fn compact(obj: &Object) -> String {
        ObjectSerializer::compact().serialize_to_string(obj)
    }

    fn reparse(obj: &Object) -> Object {
        let bytes = ObjectSerializer::compact().serialize(obj);
        parse_object(&bytes).unwrap().1
    }

    #[test]
    fn test_scalars() {
        let cases = [
            (Object::Null, "null"),
            (Object::Boolean(false), "false"),
            (Object::Integer(-7), "-7"),
            (Object::Reference(ObjectRef::new(12, 3)), "12 3 R"),
            (Object::Real(2.0), "2.0"),
            (Object::Real(-0.125), "-0.125"),
            (Object::Real(f64::NAN), "0.0"),
        ];
        for (obj, expected) in cases {
            assert_eq!(compact(&obj), expected);
        }
    }

    #[test]
    fn test_strings_pick_literal_or_hex() {
        assert_eq!(compact(&Object::String(b"a (b) c\\".to_vec())), "(a \\(b\\) c\\\\)");
        assert_eq!(compact(&Object::String(vec![0x01, 0xAB])), "<01AB>");
        let obj = Object::String(b"line\rline\r\n".to_vec());
        assert_eq!(reparse(&obj), obj);
    }

    #[test]
    fn test_names_escape_delimiters() {
        assert_eq!(compact(&Object::name("Two Words")), "/Two#20Words");
        assert_eq!(compact(&Object::name("50%#[x]")), "/50#25#23#5Bx#5D");
        assert_eq!(reparse(&Object::name("a/b(c)")), Object::name("a/b(c)"));
    }

    #[test]
    fn test_compact_dictionary_in_insertion_order() {
        let dict = DictBuilder::new()
            .name("Type", "Pages")
            .insert("Count", 3i64)
            .insert("Kids", Vec::<Object>::new())
            .into_object();
        assert_eq!(compact(&dict), "<< /Type /Pages /Count 3 /Kids [] >>");
    }

    #[test]
    fn test_indented_dictionary_nests() {
        let inner = DictBuilder::new().insert("F1", ObjectRef::new(4, 0)).into_object();
        let dict = DictBuilder::new().insert("Font", inner).into_object();
        assert_eq!(
            ObjectSerializer::new().serialize_to_string(&dict),
            "<<\n  /Font <<\n    /F1 4 0 R\n  >>\n>>"
        );
        let empty = Object::Dictionary(Dictionary::new());
        assert_eq!(ObjectSerializer::new().serialize_to_string(&empty), "<<>>");
    }

    #[test]
    fn test_stream_length_rewritten() {
        let stream = Object::Stream {
            dict: DictBuilder::new().insert("Length", 1i64).build(),
            data: bytes::Bytes::from_static(b"0 0 m"),
        };
        let text = compact(&stream);
        assert_eq!(text, "<< /Length 5 >>\nstream\n0 0 m\nendstream");
        assert_eq!(reparse(&stream).stream_data().map(|d| d.as_ref()), Some(&b"0 0 m"[..]));
    }

    #[test]
    fn test_indirect_wrapper() {
        let mut out = Vec::new();
        ObjectSerializer::compact()
            .write_indirect(&mut out, 7, 1, &Object::name("X"))
            .unwrap();
        assert_eq!(out, b"7 1 obj\n/X\nendobj\n");
    }

    fn arb_object() -> impl Strategy<Value = Object> {
        let leaf = prop_oneof![
            Just(Object::Null),
            any::<bool>().prop_map(Object::Boolean),
            any::<i32>().prop_map(|i| Object::Integer(i as i64)),
            (-1_000_000i32..1_000_000).prop_map(|i| Object::Real(i as f64 / 8.0)),
            proptest::collection::vec(any::<u8>(), 0..24).prop_map(Object::String),
            "[A-Za-z0-9 #()/]{1,12}".prop_map(Object::Name),
            (1u32..1000, 0u16..3).prop_map(|(id, gen)| Object::Reference(ObjectRef::new(id, gen))),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Object::Array),
                proptest::collection::vec(("[A-Za-z]{1,6}", inner), 0..6)
                    .prop_map(|entries| Object::Dictionary(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_serialize_parse_roundtrip(obj in arb_object()) {
            prop_assert_eq!(reparse(&obj), obj);
        }

        #[test]
        fn test_indented_layout_parses_the_same(obj in arb_object()) {
            let bytes = ObjectSerializer::new().serialize(&obj);
            prop_assert_eq!(parse_object(&bytes).unwrap().1, obj);
        }
    }
}
