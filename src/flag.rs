//! Flag projection: one command-line flag per leaf of a live value.
//!
//! [`Projection::new`] walks the shape of the bound value, derives each
//! leaf's flag name (`db-pool-size`) and env key (`APP__DB_POOL_SIZE`) from
//! the same path, applies env overrides and declared defaults, and checks
//! that names and shorthands are unique. [`Projection::set`] writes a flag
//! value straight into the bound value.
//!
//! Parsing the command line is left to a [`FlagRegistry`]; the clap adapter
//! lives in the `cli` module.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::de::{self, LeafKind, LeafShape};
use crate::error::EnvflagError;
use crate::group::Group;
use crate::path::{env_key, flag_name};
use crate::ser::encode;
use crate::tag::{FieldOptions, FlagSchema, options_for};

/// One registered flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    /// Lower-dash name, used as `--name`.
    pub name: String,
    /// Upper-snake env var consulted before registration.
    pub env_key: String,
    /// Flat key of the bound leaf.
    pub key: String,
    pub kind: LeafKind,
    /// The leaf sits inside an `Option`.
    pub optional: bool,
    pub secret: bool,
    pub options: FieldOptions,
}

impl Flag {
    pub fn required(&self) -> bool {
        self.options.required
    }

    pub fn persistent(&self) -> bool {
        self.options.persistent
    }

    pub fn shorthand(&self) -> Option<char> {
        self.options.shorthand
    }

    pub fn help_for(&self, lang: &str) -> Option<&str> {
        self.options.help_for(lang)
    }

    /// Value for `--name` given without a value. Bool flags default to `true`.
    pub fn no_opt_default(&self) -> Option<&str> {
        match (&self.options.no_opt_default, self.kind) {
            (Some(value), _) => Some(value),
            (None, LeafKind::Bool) => Some("true"),
            (None, _) => None,
        }
    }
}

/// Something that accepts flag definitions: a CLI parser adapter.
pub trait FlagRegistry {
    /// Register `flag`. `current` is the bound leaf's value at registration
    /// time (empty when unset).
    fn register(&mut self, flag: &Flag, current: &str) -> Result<(), EnvflagError>;
}

/// Flags bound to a live value.
pub struct Projection<'a, T> {
    target: &'a mut T,
    flags: Vec<Flag>,
}

impl<'a, T> Projection<'a, T>
where
    T: Serialize + DeserializeOwned + FlagSchema,
{
    /// Project `target` into flags.
    ///
    /// For every leaf, an env var `{PREFIX}__{KEY}` (or `{KEY}` without a
    /// prefix) found in `vars` is written into `target` first. A declared
    /// default is applied only when the leaf is still zero afterwards.
    pub fn new(
        target: &'a mut T,
        env_prefix: Option<&str>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, EnvflagError> {
        let mut env = Group::env(env_prefix.unwrap_or_default());
        for (key, value) in vars {
            env.set(&key, value);
        }

        let shapes = de::leaf_shapes(&*target)?;
        let current = encode("", &*target)?;
        let mut overlay = Group::new("");
        let mut flags = Vec::with_capacity(shapes.len());
        let mut names: HashMap<String, String> = HashMap::new();
        let mut shorthands: HashMap<char, String> = HashMap::new();

        for shape in shapes {
            let options = options_for::<T>(&shape.dotted)?;
            let flag = build_flag(shape, options, env_prefix);

            if let Some(first) = names.insert(flag.name.clone(), flag.key.clone()) {
                return Err(EnvflagError::DuplicateFlagName {
                    name: flag.name,
                    first,
                    second: flag.key,
                });
            }
            if let Some(c) = flag.shorthand() {
                if let Some(first) = shorthands.insert(c, flag.name.clone()) {
                    return Err(EnvflagError::DuplicateShorthand {
                        shorthand: c,
                        first,
                        second: flag.name,
                    });
                }
            }

            if let Some(var) = env.get(&flag.env_key) {
                trace!(flag = %flag.name, env = %flag.env_key, "env override");
                overlay.set(&flag.key, var.value.clone());
            } else if let Some(default) = &flag.options.default {
                let value = current.get(&flag.key).map(|v| v.value.as_str());
                if is_zero(flag.kind, value) {
                    overlay.set(&flag.key, default.clone());
                }
            }
            flags.push(flag);
        }

        if !overlay.is_empty() {
            de::decode_into(&overlay, &mut *target)?;
        }
        debug!(flags = flags.len(), overrides = overlay.len(), "projected flags");
        Ok(Self { target, flags })
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    /// Look a flag up by its name (`db-pool-size`).
    pub fn flag(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub fn target(&self) -> &T {
        &*self.target
    }

    /// Current text of a flag's leaf. Empty when the leaf is unset.
    pub fn value(&self, name: &str) -> Result<String, EnvflagError> {
        let flag = self
            .flag(name)
            .ok_or_else(|| EnvflagError::UnknownFlag(name.to_string()))?;
        let current = encode("", &*self.target)?;
        Ok(current
            .get(&flag.key)
            .map(|v| v.value.clone())
            .unwrap_or_default())
    }

    /// Parse `value` into the leaf behind flag `name`, updating the bound
    /// value in place.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), EnvflagError> {
        let flag = self
            .flag(name)
            .ok_or_else(|| EnvflagError::UnknownFlag(name.to_string()))?;
        let mut overlay = Group::new("");
        overlay.set(&flag.key, value);
        de::decode_into(&overlay, &mut *self.target)
    }

    /// Hand every flag to `registry` with its current value.
    pub fn register(&self, registry: &mut impl FlagRegistry) -> Result<(), EnvflagError> {
        let current = encode("", &*self.target)?;
        for flag in &self.flags {
            let value = current.get(&flag.key).map_or("", |v| v.value.as_str());
            registry.register(flag, value)?;
        }
        Ok(())
    }
}

fn build_flag(shape: LeafShape, options: FieldOptions, env_prefix: Option<&str>) -> Flag {
    Flag {
        name: flag_name(&shape.key),
        env_key: env_key(env_prefix, &shape.key),
        key: shape.key,
        kind: shape.kind,
        optional: shape.optional,
        secret: shape.secret,
        options,
    }
}

/// Whether a leaf's text is its type's zero value. Absent counts as zero.
fn is_zero(kind: LeafKind, value: Option<&str>) -> bool {
    let Some(text) = value.filter(|t| !t.is_empty()) else {
        return true;
    };
    match kind {
        LeafKind::Bool => text.eq_ignore_ascii_case("false") || text == "0",
        LeafKind::Int | LeafKind::Uint | LeafKind::Float => {
            text.parse::<f64>().is_ok_and(|n| n == 0.0)
        }
        LeafKind::Char => text == "\0",
        LeafKind::Str => false,
        LeafKind::Enum(variants) => variants.first() == Some(&text),
    }
}
