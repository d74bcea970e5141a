use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use serde::de::{Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::group::MASK;

/// Newtype name that marks a [`Secret`] for the encoder.
pub(crate) const SECRET_TOKEN: &str = "$__envflag_private_Secret";

/// Newtype name that marks an [`Inline`] field for the encoder and decoder.
pub(crate) const INLINE_TOKEN: &str = "$__envflag_private_Inline";

/// A leaf whose value must never be logged.
///
/// Encodes like `T`, but the resulting [`Var`](crate::Var) carries the fixed
/// mask `--------`, so [`Group::masked_dump`](crate::Group::masked_dump)
/// hides it while [`Group::dump`](crate::Group::dump) keeps the raw value.
/// `Debug` prints the mask too.
///
/// Other serializers (JSON, TOML, ...) see a transparent newtype.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Secret<T>(pub T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Secret(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Secret(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl<T: Serialize> Serialize for Secret<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(SECRET_TOKEN, &self.0)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_newtype_struct(SECRET_TOKEN, NewtypeVisitor(PhantomData))
            .map(Secret)
    }

    fn deserialize_in_place<D: Deserializer<'de>>(
        deserializer: D,
        place: &mut Self,
    ) -> Result<(), D::Error> {
        deserializer.deserialize_newtype_struct(SECRET_TOKEN, InPlaceVisitor(&mut place.0))
    }
}

/// A struct field whose children live directly under the parent's path.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Default)]
/// struct Service {
///     common: Inline<Common>, // Common { name } → key `name`, not `common_name`
///     port: u16,
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Inline<T>(pub T);

impl<T> Deref for Inline<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Inline<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for Inline<T> {
    fn from(value: T) -> Self {
        Inline(value)
    }
}

impl<T: Serialize> Serialize for Inline<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(INLINE_TOKEN, &self.0)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Inline<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_newtype_struct(INLINE_TOKEN, NewtypeVisitor(PhantomData))
            .map(Inline)
    }

    fn deserialize_in_place<D: Deserializer<'de>>(
        deserializer: D,
        place: &mut Self,
    ) -> Result<(), D::Error> {
        deserializer.deserialize_newtype_struct(INLINE_TOKEN, InPlaceVisitor(&mut place.0))
    }
}

struct NewtypeVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for NewtypeVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a wrapped value")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, deserializer: D) -> Result<T, D::Error> {
        T::deserialize(deserializer)
    }
}

/// Decodes the wrapped value over an existing one.
struct InPlaceVisitor<'a, T>(&'a mut T);

impl<'de, T: Deserialize<'de>> Visitor<'de> for InPlaceVisitor<'_, T> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a wrapped value")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        T::deserialize_in_place(deserializer, self.0)
    }
}

/// A config operation, independent of any CLI framework.
/// The CLI layer converts parsed clap args into this.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Print every resolved entry, secrets masked.
    List,
    /// Write the defaults as a `KEY=value` dump.
    Gen { output: Option<PathBuf> },
    /// Show one resolved entry by flat key.
    Get { key: String },
}
