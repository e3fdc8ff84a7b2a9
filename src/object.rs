//! PDF object types.
//!
//! Objects are plain values. Links between indirect objects are always
//! [`ObjectRef`]s, never ownership, so cyclic and shared graphs live in a
//! document's id-keyed cache and every traversal carries its own visited set.
//! `==` on [`Object`] is structural; identity is the [`ObjectRef`] an object
//! is stored under.

use crate::decoders::{self, DecodeLimits, Decoded};
use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Dictionary keyed by name (without the leading `/`).
///
/// Insertion order is preserved and a repeated key keeps its last value.
pub type Dictionary = IndexMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + raw, still-filtered data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Raw stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl From<Dictionary> for Object {
    fn from(dict: Dictionary) -> Self {
        Object::Dictionary(dict)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Shorthand for `Object::Name`.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer or real as `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable dictionary access. Works for both Dictionary and Stream objects.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Mutable array access.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw stream bytes.
    pub fn stream_data(&self) -> Option<&bytes::Bytes> {
        match self {
            Object::Stream { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Whether this is a dictionary or stream with `/Type /{type_name}`.
    pub fn is_type(&self, type_name: &str) -> bool {
        self.as_dict()
            .and_then(|d| d.get("Type"))
            .and_then(Object::as_name)
            == Some(type_name)
    }

    /// Dictionary entry lookup, `None` for non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Every reference directly contained in this value, in document order.
    ///
    /// Descends into arrays, dictionaries and stream dictionaries but not
    /// through the references themselves.
    pub fn collect_references(&self, out: &mut Vec<ObjectRef>) {
        match self {
            Object::Reference(r) => out.push(*r),
            Object::Array(items) => {
                for item in items {
                    item.collect_references(out);
                }
            },
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                for value in dict.values() {
                    value.collect_references(out);
                }
            },
            _ => {},
        }
    }

    /// Run the stream's raw bytes through its filter chain.
    ///
    /// Malformed filter input yields a partial prefix with the error flag set.
    /// `/Filter` and `/DecodeParms` must already be direct objects.
    pub fn decode_stream(&self, limits: &DecodeLimits) -> Result<Decoded> {
        match self {
            Object::Stream { dict, data } => {
                let stages = decoders::stream_stages(dict)?;
                Ok(decoders::decode_chain(data, &stages, limits))
            },
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }

    /// Decode stream data using filters specified in the stream dictionary.
    ///
    /// Unlike [`decode_stream`](Self::decode_stream) this fails on any filter
    /// error rather than returning a prefix.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use pdf_graft::object::Object;
    ///
    /// # fn example(stream_obj: Object) -> Result<(), Box<dyn std::error::Error>> {
    /// let decoded_data = stream_obj.decode_stream_data()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        self.decode_stream(&DecodeLimits::default())?.into_result()
    }
}

/// Builder for dictionaries, used when synthesizing objects.
#[derive(Debug, Default, Clone)]
pub struct DictBuilder {
    dict: Dictionary,
}

impl DictBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn insert(mut self, key: &str, value: impl Into<Object>) -> Self {
        self.dict.insert(key.to_string(), value.into());
        self
    }

    /// Add a name entry.
    pub fn name(self, key: &str, value: &str) -> Self {
        self.insert(key, Object::name(value))
    }

    /// Finish as a dictionary.
    pub fn build(self) -> Dictionary {
        self.dict
    }

    /// Finish as an object.
    pub fn into_object(self) -> Object {
        Object::Dictionary(self.dict)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl From<Vec<Object>> for Object {
    fn from(items: Vec<Object>) -> Self {
        Object::Array(items)
    }
}
