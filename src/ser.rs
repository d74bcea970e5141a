//! Structural encoder: a serde `Serializer` that writes one [`Var`] per leaf.
//!
//! Structs, maps, and sequences are recursed into, composing the flat key
//! from the current [`PathWalker`]:
//! `Outer { database: Inner { hosts: ["a"] } }` → `database_hosts_0=a`.
//!
//! Anything that serializes as a single string or scalar is an atomic leaf,
//! so types with their own text form (`SocketAddr`, `PathBuf`, unit enum
//! variants) are never decomposed. `None` emits nothing. A value that is
//! there but writes no leaves (an empty `Vec` or map, a unit, a struct of
//! `None`s) gets an empty entry at its own key, so the decoder knows it is
//! present: `Some(vec![])` → `tags=`.

use std::mem;

use serde::ser::{self, Impossible, Serialize};

use crate::error::EnvflagError;
use crate::group::{Group, MASK, Var};
use crate::path::{PathWalker, Segment};
use crate::types::{INLINE_TOKEN, SECRET_TOKEN};

/// Encode `value` into a new group named `name`.
pub fn encode<T: Serialize + ?Sized>(name: &str, value: &T) -> Result<Group, EnvflagError> {
    let mut group = Group::new(name);
    encode_into(&mut group, value)?;
    Ok(group)
}

/// Encode `value` into an existing group. Entries for the same keys are
/// overwritten; other entries are kept.
pub fn encode_into<T: Serialize + ?Sized>(
    group: &mut Group,
    value: &T,
) -> Result<(), EnvflagError> {
    let mut encoder = Encoder {
        group,
        path: PathWalker::new(),
        secret: false,
        optional: false,
        emitted: 0,
        absent: false,
    };
    value.serialize(&mut encoder)
}

struct Encoder<'g> {
    group: &'g mut Group,
    path: PathWalker,
    secret: bool,
    optional: bool,
    /// Entries written so far.
    emitted: usize,
    /// The value just serialized was `None`.
    absent: bool,
}

impl Encoder<'_> {
    fn emit(&mut self, value: String) -> Result<(), EnvflagError> {
        if self.path.is_empty() {
            return Err(EnvflagError::InvalidRoot(
                "a scalar has no key; encode a struct, map, or sequence".into(),
            ));
        }
        let mut var = Var::new(self.path.key(), value).with_optional(self.optional);
        if self.secret {
            var = var.with_mask(MASK);
        }
        self.group.add(var);
        self.emitted += 1;
        Ok(())
    }

    fn child<T: Serialize + ?Sized>(
        &mut self,
        segment: impl Into<Segment>,
        value: &T,
    ) -> Result<(), EnvflagError> {
        let segment = segment.into();
        if segment == Segment::Field("") {
            return Err(self.unsupported("a field with an empty name"));
        }
        self.path.enter(segment);
        let before = self.emitted;
        value
            .serialize(&mut *self)
            .map_err(|e| e.encoding_at(&self.path.key()))?;
        let absent = mem::take(&mut self.absent);
        if self.emitted == before && !absent {
            self.emit(String::new())?;
        }
        self.path.leave();
        Ok(())
    }

    fn unsupported(&self, what: &str) -> EnvflagError {
        EnvflagError::Unsupported {
            key: self.path.key(),
            what: what.to_string(),
        }
    }
}

impl<'a, 'g> ser::Serializer for &'a mut Encoder<'g> {
    type Ok = ();
    type Error = EnvflagError;
    type SerializeSeq = SeqEncoder<'a, 'g>;
    type SerializeTuple = SeqEncoder<'a, 'g>;
    type SerializeTupleStruct = SeqEncoder<'a, 'g>;
    type SerializeTupleVariant = Impossible<(), EnvflagError>;
    type SerializeMap = MapEncoder<'a, 'g>;
    type SerializeStruct = StructEncoder<'a, 'g>;
    type SerializeStructVariant = Impossible<(), EnvflagError>;

    fn serialize_bool(self, v: bool) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_i128(self, v: i128) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_u128(self, v: u128) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_f32(self, v: f32) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_f64(self, v: f64) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<(), EnvflagError> {
        self.emit(v.to_string())
    }

    // Raw bytes are stored like any other byte sequence: one entry per index.
    fn serialize_bytes(self, v: &[u8]) -> Result<(), EnvflagError> {
        for (i, byte) in v.iter().enumerate() {
            self.child(i, byte)?;
        }
        Ok(())
    }

    fn serialize_none(self) -> Result<(), EnvflagError> {
        if self.path.is_empty() {
            return Err(EnvflagError::InvalidRoot("root value is None".into()));
        }
        self.absent = true;
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), EnvflagError> {
        let outer = mem::replace(&mut self.optional, true);
        let result = value.serialize(&mut *self);
        self.optional = outer;
        result
    }

    fn serialize_unit(self) -> Result<(), EnvflagError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), EnvflagError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), EnvflagError> {
        self.emit(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<(), EnvflagError> {
        match name {
            SECRET_TOKEN => {
                let outer = mem::replace(&mut self.secret, true);
                let result = value.serialize(&mut *self);
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
                value.serialize(&mut *self)?;
                self.path.enter(field);
                Ok(())
            }
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<(), EnvflagError> {
        Err(self.unsupported(&format!("enum variant '{variant}' carries data")))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, EnvflagError> {
        Ok(SeqEncoder {
            encoder: self,
            index: 0,
        })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, EnvflagError> {
        self.serialize_seq(None)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, EnvflagError> {
        self.serialize_seq(None)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, EnvflagError> {
        Err(self.unsupported(&format!("enum variant '{variant}' carries data")))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, EnvflagError> {
        Ok(MapEncoder {
            encoder: self,
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, EnvflagError> {
        Ok(StructEncoder { encoder: self })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, EnvflagError> {
        Err(self.unsupported(&format!("enum variant '{variant}' carries data")))
    }
}

// --- SerializeStruct ---

struct StructEncoder<'a, 'g> {
    encoder: &'a mut Encoder<'g>,
}

impl ser::SerializeStruct for StructEncoder<'_, '_> {
    type Ok = ();
    type Error = EnvflagError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EnvflagError> {
        self.encoder.child(key, value)
    }

    fn end(self) -> Result<(), EnvflagError> {
        Ok(())
    }
}

// --- SerializeMap ---

struct MapEncoder<'a, 'g> {
    encoder: &'a mut Encoder<'g>,
    key: Option<String>,
}

impl ser::SerializeMap for MapEncoder<'_, '_> {
    type Ok = ();
    type Error = EnvflagError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), EnvflagError> {
        let at = self.encoder.path.key();
        self.key = Some(key.serialize(MapKeyEncoder { at: &at })?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EnvflagError> {
        let key = self.key.take().ok_or_else(|| {
            EnvflagError::Message("serialize_value called without serialize_key".into())
        })?;
        self.encoder.child(key, value)
    }

    fn end(self) -> Result<(), EnvflagError> {
        Ok(())
    }
}

// --- SerializeSeq (Vec, arrays, tuples) ---

struct SeqEncoder<'a, 'g> {
    encoder: &'a mut Encoder<'g>,
    index: usize,
}

impl SeqEncoder<'_, '_> {
    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EnvflagError> {
        self.encoder.child(self.index, value)?;
        self.index += 1;
        Ok(())
    }
}

impl ser::SerializeSeq for SeqEncoder<'_, '_> {
    type Ok = ();
    type Error = EnvflagError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EnvflagError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EnvflagError> {
        Ok(())
    }
}

impl ser::SerializeTuple for SeqEncoder<'_, '_> {
    type Ok = ();
    type Error = EnvflagError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EnvflagError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EnvflagError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for SeqEncoder<'_, '_> {
    type Ok = ();
    type Error = EnvflagError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EnvflagError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EnvflagError> {
        Ok(())
    }
}

// --- Map key encoder ---

/// Converts a map key to its path segment. Only string-like and integer
/// keys are accepted; string keys must be non-empty ASCII alphanumerics so
/// they can never contain the path delimiter.
struct MapKeyEncoder<'k> {
    at: &'k str,
}

impl MapKeyEncoder<'_> {
    fn text(self, key: &str) -> Result<String, EnvflagError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EnvflagError::InvalidMapKeyValue {
                key: self.at.to_string(),
                reason: format!("'{key}' must be non-empty and ASCII alphanumeric"),
            });
        }
        Ok(key.to_string())
    }

    fn signed(self, key: i128) -> Result<String, EnvflagError> {
        if key < 0 {
            return Err(EnvflagError::InvalidMapKeyValue {
                key: self.at.to_string(),
                reason: format!("{key} is negative"),
            });
        }
        Ok(key.to_string())
    }

    fn wrong_type(self, kind: &'static str) -> EnvflagError {
        EnvflagError::InvalidMapKeyType {
            key: self.at.to_string(),
            kind,
        }
    }
}

impl ser::Serializer for MapKeyEncoder<'_> {
    type Ok = String;
    type Error = EnvflagError;
    type SerializeSeq = Impossible<String, EnvflagError>;
    type SerializeTuple = Impossible<String, EnvflagError>;
    type SerializeTupleStruct = Impossible<String, EnvflagError>;
    type SerializeTupleVariant = Impossible<String, EnvflagError>;
    type SerializeMap = Impossible<String, EnvflagError>;
    type SerializeStruct = Impossible<String, EnvflagError>;
    type SerializeStructVariant = Impossible<String, EnvflagError>;

    fn serialize_str(self, v: &str) -> Result<String, EnvflagError> {
        self.text(v)
    }
    fn serialize_char(self, v: char) -> Result<String, EnvflagError> {
        self.text(&v.to_string())
    }
    fn serialize_i8(self, v: i8) -> Result<String, EnvflagError> {
        self.signed(v.into())
    }
    fn serialize_i16(self, v: i16) -> Result<String, EnvflagError> {
        self.signed(v.into())
    }
    fn serialize_i32(self, v: i32) -> Result<String, EnvflagError> {
        self.signed(v.into())
    }
    fn serialize_i64(self, v: i64) -> Result<String, EnvflagError> {
        self.signed(v.into())
    }
    fn serialize_i128(self, v: i128) -> Result<String, EnvflagError> {
        self.signed(v)
    }
    fn serialize_u8(self, v: u8) -> Result<String, EnvflagError> {
        Ok(v.to_string())
    }
    fn serialize_u16(self, v: u16) -> Result<String, EnvflagError> {
        Ok(v.to_string())
    }
    fn serialize_u32(self, v: u32) -> Result<String, EnvflagError> {
        Ok(v.to_string())
    }
    fn serialize_u64(self, v: u64) -> Result<String, EnvflagError> {
        Ok(v.to_string())
    }
    fn serialize_u128(self, v: u128) -> Result<String, EnvflagError> {
        Ok(v.to_string())
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<String, EnvflagError> {
        self.text(variant)
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        v: &T,
    ) -> Result<String, EnvflagError> {
        v.serialize(self)
    }
    fn serialize_bool(self, _: bool) -> Result<String, EnvflagError> {
        Err(self.wrong_type("bool"))
    }
    fn serialize_f32(self, _: f32) -> Result<String, EnvflagError> {
        Err(self.wrong_type("float"))
    }
    fn serialize_f64(self, _: f64) -> Result<String, EnvflagError> {
        Err(self.wrong_type("float"))
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<String, EnvflagError> {
        Err(self.wrong_type("bytes"))
    }
    fn serialize_none(self) -> Result<String, EnvflagError> {
        Err(self.wrong_type("option"))
    }
    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<String, EnvflagError> {
        Err(self.wrong_type("option"))
    }
    fn serialize_unit(self) -> Result<String, EnvflagError> {
        Err(self.wrong_type("unit"))
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<String, EnvflagError> {
        Err(self.wrong_type("unit"))
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<String, EnvflagError> {
        Err(self.wrong_type("enum"))
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, EnvflagError> {
        Err(self.wrong_type("sequence"))
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, EnvflagError> {
        Err(self.wrong_type("tuple"))
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, EnvflagError> {
        Err(self.wrong_type("tuple"))
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, EnvflagError> {
        Err(self.wrong_type("enum"))
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, EnvflagError> {
        Err(self.wrong_type("map"))
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, EnvflagError> {
        Err(self.wrong_type("struct"))
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, EnvflagError> {
        Err(self.wrong_type("enum"))
    }
}
