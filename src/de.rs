//! Structural decoder: a serde `Deserializer` that reads leaves out of a
//! [`Group`] by flat key.
//!
//! The flat form carries no type information, so the target type drives the
//! walk: structs are handed the fields stored at or below their key,
//! sequences take their length from the highest stored index, maps discover
//! their keys with [`Group::map_keys`], and an `Option` is `Some` exactly
//! when something is stored at or below its key.
//!
//! A struct field with nothing stored is left to serde: `Option` fields
//! become `None`, and `#[serde(default)]` (on the field or the struct)
//! supplies the rest. Any other missing field is an error. When a struct
//! also has entries no field claims (an [`Inline`](crate::Inline) field's
//! children), every field is handed over and the missing ones read as zero
//! values (`0`, `false`, `""`, empty collection, first unit variant).
//!
//! [`decode_into`] layers the group over what the target already holds, so
//! no field is ever missing there.

use std::fmt::Display;
use std::mem;
use std::str::FromStr;

use serde::Serialize;
use serde::de::value::{StrDeserializer, StringDeserializer};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor,
};

use crate::error::EnvflagError;
use crate::group::{Group, KeyCase};
use crate::path::{PathWalker, Segment, join_key};
use crate::ser::{encode, encode_into};
use crate::types::{INLINE_TOKEN, SECRET_TOKEN};

/// Decode a fresh `T` from `group`.
pub fn decode<T: DeserializeOwned>(group: &Group) -> Result<T, EnvflagError> {
    let mut decoder = Decoder::new(group);
    T::deserialize(&mut decoder)
}

/// Sequences may hold at most this many elements. A stored index at or past
/// it fails decoding instead of allocating.
pub const MAX_SEQUENCE_LEN: usize = 1 << 16;

/// Decode `group` over the current contents of `target`.
///
/// The target is encoded first and the group layered on top, so a leaf
/// missing from `group` keeps the value `target` already had (typically its
/// `Default`). Keys in `group` match the target's keys ignoring ASCII case,
/// and the target's own map keys keep their spelling.
///
/// `target` is updated in place, so `#[serde(skip)]` fields of structs
/// reached through fields, sequences, and arrays keep their values. Inside
/// an `Option` or a map the value is rebuilt. `target` is only touched when
/// the whole decode succeeds.
pub fn decode_into<T>(group: &Group, target: &mut T) -> Result<(), EnvflagError>
where
    T: Serialize + DeserializeOwned,
{
    let mut layered = Group::with_case(group.name(), KeyCase::Insensitive);
    encode_into(&mut layered, target)?;
    layered.merge(group);
    // Dry run first: an in-place decode that fails halfway would leave the
    // target half written.
    decode::<T>(&layered)?;
    let mut decoder = Decoder::new(&layered);
    T::deserialize_in_place(&mut decoder, target)
}

/// Decode from a group whose keys are stored qualified by its own name
/// (`TEST__Slice_0` in group `TEST`).
pub fn decode_group<T: DeserializeOwned>(group: &Group) -> Result<T, EnvflagError> {
    decode(&group.unqualified())
}

/// Scalar kind a leaf was decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Bool,
    Int,
    Uint,
    Float,
    Char,
    Str,
    /// A unit-only enum, with its variant names.
    Enum(&'static [&'static str]),
}

/// One leaf of a value's shape, as found by [`leaf_shapes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeafShape {
    pub key: String,
    pub dotted: String,
    pub kind: LeafKind,
    pub optional: bool,
    pub secret: bool,
}

/// Options nested deeper than this are reported as one text leaf by [`leaf_shapes`]
/// instead of being expanded, which bounds recursive types.
const MAX_SHAPE_DEPTH: usize = 16;

/// Every leaf of `value`'s current shape, in declaration order.
///
/// Runs the decoder over `encode(value)` and records each leaf the type asks
/// for. The leaves inside a `None` option are reported as optional; empty
/// sequences and maps have no leaves.
pub(crate) fn leaf_shapes<T>(value: &T) -> Result<Vec<LeafShape>, EnvflagError>
where
    T: Serialize + DeserializeOwned,
{
    let group = encode("", value)?;
    let mut decoder = Decoder::new(&group);
    decoder.leaves = Some(Vec::new());
    T::deserialize(&mut decoder)?;
    Ok(decoder.leaves.unwrap_or_default())
}

struct Decoder<'g> {
    group: &'g Group,
    path: PathWalker,
    optional: bool,
    secret: bool,
    /// Set while walking a shape; every leaf lookup is recorded here.
    leaves: Option<Vec<LeafShape>>,
}

impl<'g> Decoder<'g> {
    fn new(group: &'g Group) -> Self {
        Self {
            group,
            path: PathWalker::new(),
            optional: false,
            secret: false,
            leaves: None,
        }
    }

    fn record(&mut self, kind: LeafKind) {
        if let Some(leaves) = &mut self.leaves {
            leaves.push(LeafShape {
                key: self.path.key(),
                dotted: self.path.dotted(),
                kind,
                optional: self.optional,
                secret: self.secret,
            });
        }
    }

    /// The raw text for the current leaf. Empty values count as missing.
    fn lookup(&mut self, kind: LeafKind) -> Result<Option<&'g str>, EnvflagError> {
        if self.path.is_empty() {
            return Err(EnvflagError::InvalidRoot(
                "a scalar has no key; decode into a struct, map, or sequence".into(),
            ));
        }
        self.record(kind);
        let group = self.group;
        Ok(group
            .get(&self.path.key())
            .map(|var| var.value.as_str())
            .filter(|text| !text.is_empty()))
    }

    fn parse<T>(&mut self, kind: LeafKind) -> Result<T, EnvflagError>
    where
        T: FromStr + Default,
        T::Err: Display,
    {
        match self.lookup(kind)? {
            None => Ok(T::default()),
            Some(text) => text.parse().map_err(|e| self.unmarshal(text, e)),
        }
    }

    fn unmarshal(&self, text: &str, reason: impl Display) -> EnvflagError {
        EnvflagError::Unmarshal {
            key: self.path.key(),
            reason: format!("'{text}': {reason}"),
        }
    }

    fn child<'de, S>(&mut self, segment: impl Into<Segment>, seed: S) -> Result<S::Value, EnvflagError>
    where
        S: DeserializeSeed<'de>,
    {
        let segment = segment.into();
        if segment == Segment::Field("") {
            return Err(EnvflagError::Unsupported {
                key: self.path.key(),
                what: "a field with an empty name".into(),
            });
        }
        self.path.enter(segment);
        let value = seed
            .deserialize(&mut *self)
            .map_err(|e| e.decoding_at(&self.path.key()))?;
        self.path.leave();
        Ok(value)
    }

    /// The fields of the struct at the current path to hand to its visitor.
    fn struct_fields(&self, fields: &'static [&'static str]) -> Vec<&'static str> {
        let base = self.path.key();
        // A shape walk records every leaf, stored or not.
        if self.leaves.is_some() || self.has_unclaimed(&base, fields) {
            return fields.to_vec();
        }
        fields
            .iter()
            .copied()
            .filter(|field| self.group.has_subtree(&join_key(&base, field)))
            .collect()
    }

    /// Whether entries under `base` exist that no field in `fields` claims.
    /// Only an inline field can read those.
    fn has_unclaimed(&self, base: &str, fields: &[&str]) -> bool {
        let entries = self.group.map_entries(base);
        entries
            .iter()
            .any(|rest| !fields.iter().any(|field| claims(field, rest)))
    }
}

/// Whether the entry `rest` (relative to a struct) is `field` or lies below it.
fn claims(field: &str, rest: &str) -> bool {
    let n = field.len();
    match rest.get(..n) {
        Some(head) if head.eq_ignore_ascii_case(field) => {
            rest.len() == n || rest[n..].starts_with(crate::path::DELIMITER)
        }
        _ => false,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

macro_rules! deserialize_number {
    ($($method:ident => $visit:ident: $ty:ty, $kind:expr;)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
            let value: $ty = self.parse($kind)?;
            visitor.$visit(value)
        }
    )*};
}

impl<'de> de::Deserializer<'de> for &mut Decoder<'_> {
    type Error = EnvflagError;

    /// Untyped targets see a string at a leaf, a map above one, and unit
    /// where nothing is stored.
    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        let key = self.path.key();
        if !self.path.is_empty() {
            if let Some(var) = self.group.get(&key) {
                self.record(LeafKind::Str);
                return visitor.visit_str(&var.value);
            }
        }
        if self.group.has_subtree(&key) {
            return self.deserialize_map(visitor);
        }
        visitor.visit_unit()
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        match self.lookup(LeafKind::Bool)? {
            None => visitor.visit_bool(false),
            Some(text) => match parse_bool(text) {
                Some(b) => visitor.visit_bool(b),
                None => Err(self.unmarshal(text, "expected true, false, 1 or 0")),
            },
        }
    }

    deserialize_number! {
        deserialize_i8 => visit_i8: i8, LeafKind::Int;
        deserialize_i16 => visit_i16: i16, LeafKind::Int;
        deserialize_i32 => visit_i32: i32, LeafKind::Int;
        deserialize_i64 => visit_i64: i64, LeafKind::Int;
        deserialize_i128 => visit_i128: i128, LeafKind::Int;
        deserialize_u8 => visit_u8: u8, LeafKind::Uint;
        deserialize_u16 => visit_u16: u16, LeafKind::Uint;
        deserialize_u32 => visit_u32: u32, LeafKind::Uint;
        deserialize_u64 => visit_u64: u64, LeafKind::Uint;
        deserialize_u128 => visit_u128: u128, LeafKind::Uint;
        deserialize_f32 => visit_f32: f32, LeafKind::Float;
        deserialize_f64 => visit_f64: f64, LeafKind::Float;
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        let Some(text) = self.lookup(LeafKind::Char)? else {
            return visitor.visit_char('\0');
        };
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(self.unmarshal(text, "expected a single character")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        let text = self.lookup(LeafKind::Str)?.unwrap_or("");
        visitor.visit_str(text)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        let present = self.group.has_subtree(&self.path.key());
        // A shape walk looks inside absent options too, so their leaves get flags.
        let expand = self.leaves.is_some() && self.path.depth() < MAX_SHAPE_DEPTH;
        if !present && !expand {
            if self.leaves.is_some() && !self.path.is_empty() {
                let outer = mem::replace(&mut self.optional, true);
                self.record(LeafKind::Str);
                self.optional = outer;
            }
            return visitor.visit_none();
        }
        let outer = mem::replace(&mut self.optional, true);
        let result = visitor.visit_some(&mut *self);
        self.optional = outer;
        result
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        match name {
            SECRET_TOKEN => {
                let outer = mem::replace(&mut self.secret, true);
                let result = visitor.visit_newtype_struct(&mut *self);
                self.secret = outer;
                result
            }
            INLINE_TOKEN => {
                if !matches!(self.path.segments().last(), Some(Segment::Field(_))) {
                    return Err(EnvflagError::Unsettable {
                        key: self.path.key(),
                        reason: "an inline value must be a struct field".into(),
                    });
                }
                let field = self.path.leave();
                let result = visitor.visit_newtype_struct(&mut *self);
                self.path.enter(field);
                result
            }
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        let len = self
            .group
            .bounded_slice_length(&self.path.key(), MAX_SEQUENCE_LEN)?;
        visitor.visit_seq(SeqReader {
            decoder: self,
            index: 0,
            len,
        })
    }

    /// Fixed-size arrays and tuples: indices at or past `len` are ignored.
    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        visitor.visit_seq(SeqReader {
            decoder: self,
            index: 0,
            len,
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        let keys = self.group.map_keys(&self.path.key());
        visitor.visit_map(MapReader {
            decoder: self,
            keys: keys.into_iter(),
            current: None,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        let fields = self.struct_fields(fields);
        visitor.visit_map(StructReader {
            decoder: self,
            fields: fields.into_iter(),
            current: None,
        })
    }

    /// Unit variants only. A missing leaf selects the first variant.
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        let chosen = match self.lookup(LeafKind::Enum(variants))? {
            Some(text) => text.to_string(),
            None => match variants.first() {
                Some(first) => first.to_string(),
                None => {
                    return Err(EnvflagError::Unsupported {
                        key: self.path.key(),
                        what: "enum without variants".into(),
                    });
                }
            },
        };
        let access: StringDeserializer<EnvflagError> = chosen.into_deserializer();
        visitor.visit_enum(access)
    }

    fn deserialize_identifier<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        visitor.visit_unit()
    }
}

// --- SeqAccess ---

struct SeqReader<'a, 'g> {
    decoder: &'a mut Decoder<'g>,
    index: usize,
    len: usize,
}

impl<'de> SeqAccess<'de> for SeqReader<'_, '_> {
    type Error = EnvflagError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, EnvflagError> {
        if self.index >= self.len {
            return Ok(None);
        }
        let value = self.decoder.child(self.index, seed)?;
        self.index += 1;
        Ok(Some(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len - self.index)
    }
}

// --- MapAccess for maps ---

struct MapReader<'a, 'g> {
    decoder: &'a mut Decoder<'g>,
    keys: std::vec::IntoIter<String>,
    current: Option<String>,
}

impl<'de> MapAccess<'de> for MapReader<'_, '_> {
    type Error = EnvflagError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, EnvflagError> {
        let Some(key) = self.keys.next() else {
            return Ok(None);
        };
        let at = self.decoder.path.child_key(&Segment::Key(key.clone()));
        let value = seed.deserialize(MapKeyDecoder {
            key: key.clone(),
            at,
        })?;
        self.current = Some(key);
        Ok(Some(value))
    }

    fn next_value_seed<S: DeserializeSeed<'de>>(
        &mut self,
        seed: S,
    ) -> Result<S::Value, EnvflagError> {
        let key = self.current.take().ok_or_else(|| {
            EnvflagError::Message("next_value_seed called before next_key_seed".into())
        })?;
        self.decoder.child(key, seed)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.keys.len())
    }
}

// --- MapAccess for structs: the chosen fields, in declaration order ---

struct StructReader<'a, 'g> {
    decoder: &'a mut Decoder<'g>,
    fields: std::vec::IntoIter<&'static str>,
    current: Option<&'static str>,
}

impl<'de> MapAccess<'de> for StructReader<'_, '_> {
    type Error = EnvflagError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, EnvflagError> {
        let Some(field) = self.fields.next() else {
            return Ok(None);
        };
        self.current = Some(field);
        let name: StrDeserializer<EnvflagError> = field.into_deserializer();
        seed.deserialize(name).map(Some)
    }

    fn next_value_seed<S: DeserializeSeed<'de>>(
        &mut self,
        seed: S,
    ) -> Result<S::Value, EnvflagError> {
        let field = self.current.take().ok_or_else(|| {
            EnvflagError::Message("next_value_seed called before next_key_seed".into())
        })?;
        self.decoder.child(field, seed)
    }
}

// --- Map key decoder ---

/// Turns a discovered map key back into the map's key type.
struct MapKeyDecoder {
    key: String,
    at: String,
}

impl MapKeyDecoder {
    fn integer<T>(&self) -> Result<T, EnvflagError>
    where
        T: FromStr,
        T::Err: Display,
    {
        if self.key.starts_with('-') {
            return Err(EnvflagError::InvalidMapKeyValue {
                key: self.at.clone(),
                reason: format!("{} is negative", self.key),
            });
        }
        self.key
            .parse()
            .map_err(|e| EnvflagError::InvalidMapKeyValue {
                key: self.at.clone(),
                reason: format!("'{}': {e}", self.key),
            })
    }

    fn wrong_type(&self, kind: &'static str) -> EnvflagError {
        EnvflagError::InvalidMapKeyType {
            key: self.at.clone(),
            kind,
        }
    }
}

macro_rules! map_key_integer {
    ($($method:ident => $visit:ident: $ty:ty;)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
            let value: $ty = self.integer()?;
            visitor.$visit(value)
        }
    )*};
}

impl<'de> de::Deserializer<'de> for MapKeyDecoder {
    type Error = EnvflagError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, EnvflagError> {
        visitor.visit_string(self.key)
    }

    map_key_integer! {
        deserialize_i8 => visit_i8: i8;
        deserialize_i16 => visit_i16: i16;
        deserialize_i32 => visit_i32: i32;
        deserialize_i64 => visit_i64: i64;
        deserialize_i128 => visit_i128: i128;
        deserialize_u8 => visit_u8: u8;
        deserialize_u16 => visit_u16: u16;
        deserialize_u32 => visit_u32: u32;
        deserialize_u64 => visit_u64: u64;
        deserialize_u128 => visit_u128: u128;
    }

    fn deserialize_bool<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, EnvflagError> {
        Err(self.wrong_type("bool"))
    }

    fn deserialize_f32<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, EnvflagError> {
        Err(self.wrong_type("float"))
    }

    fn deserialize_f64<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, EnvflagError> {
        Err(self.wrong_type("float"))
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, EnvflagError> {
        let access: StringDeserializer<EnvflagError> = self.key.into_deserializer();
        visitor.visit_enum(access)
    }

    serde::forward_to_deserialize_any! {
        char str string bytes byte_buf option unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}
