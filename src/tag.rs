//! Per-field flag options.
//!
//! Renaming and exclusion are serde's job (`#[serde(rename)]`,
//! `#[serde(skip)]`). Everything a flag needs on top of that lives in a typed
//! [`FieldOptions`], attached to a type through [`FlagSchema`] either as a
//! tag string or built directly:
//!
//! ```text
//! required,persistent,short=p,default=8080,noopt=true
//! ```

use std::collections::BTreeMap;

use crate::error::EnvflagError;

/// Language used when no help text exists for the requested one.
pub const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    /// The flag must be given on the command line.
    pub required: bool,
    /// The flag is inherited by subcommands.
    pub persistent: bool,
    /// Applied when the field is still zero after env overrides.
    pub default: Option<String>,
    /// Value used when the flag is given without one (`--verbose`).
    pub no_opt_default: Option<String>,
    pub shorthand: Option<char>,
    help: BTreeMap<String, String>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a tag string. `field` is only used in error messages.
    ///
    /// Entries are comma separated; values cannot contain commas. Use the
    /// builder methods for those.
    pub fn parse(field: &str, tag: &str) -> Result<Self, EnvflagError> {
        let invalid = |reason: String| EnvflagError::InvalidTag {
            field: field.to_string(),
            reason,
        };

        let mut options = FieldOptions::new();
        for entry in tag.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = match entry.split_once('=') {
                Some((n, v)) => (n.trim(), Some(v.trim())),
                None => (entry, None),
            };
            match (name, value) {
                ("required", None) => options.required = true,
                ("persistent", None) => options.persistent = true,
                ("default", Some(v)) => options.default = Some(v.to_string()),
                ("noopt", Some(v)) => options.no_opt_default = Some(v.to_string()),
                ("short", Some(v)) => {
                    let mut chars = v.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if c.is_ascii_alphanumeric() => {
                            options.shorthand = Some(c)
                        }
                        _ => {
                            return Err(invalid(format!(
                                "short must be one ASCII letter or digit, got '{v}'"
                            )));
                        }
                    }
                }
                ("required" | "persistent", Some(_)) => {
                    return Err(invalid(format!("'{name}' takes no value")));
                }
                ("default" | "noopt" | "short", None) => {
                    return Err(invalid(format!("'{name}' needs a value ({name}=...)")));
                }
                _ => return Err(invalid(format!("unknown option '{entry}'"))),
            }
        }
        Ok(options)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn short(mut self, c: char) -> Self {
        self.shorthand = Some(c);
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn no_opt_default(mut self, value: impl Into<String>) -> Self {
        self.no_opt_default = Some(value.into());
        self
    }

    /// Help text in the fallback language.
    pub fn help(self, text: impl Into<String>) -> Self {
        self.help_in(FALLBACK_LANGUAGE, text)
    }

    pub fn help_in(mut self, lang: &str, text: impl Into<String>) -> Self {
        self.help.insert(lang.to_string(), text.into());
        self
    }

    /// Help text for `lang`, falling back to English.
    pub fn help_for(&self, lang: &str) -> Option<&str> {
        self.help
            .get(lang)
            .or_else(|| self.help.get(FALLBACK_LANGUAGE))
            .map(String::as_str)
    }
}

/// Flag options for the fields of a type, keyed by dotted path
/// (`db.pool_size`). Both methods default to "no options", so an empty impl
/// is enough for types that need none.
pub trait FlagSchema {
    /// A tag string, parsed with [`FieldOptions::parse`] at projection time.
    fn tag(_path: &str) -> Option<&'static str> {
        None
    }

    /// Typed options. Takes precedence over [`tag`](Self::tag).
    fn options(_path: &str) -> Option<FieldOptions> {
        None
    }
}

pub(crate) fn options_for<T: FlagSchema>(path: &str) -> Result<FieldOptions, EnvflagError> {
    if let Some(options) = T::options(path) {
        return Ok(options);
    }
    match T::tag(path) {
        Some(tag) => FieldOptions::parse(path, tag),
        None => Ok(FieldOptions::default()),
    }
}
