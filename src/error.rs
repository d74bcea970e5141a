use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvflagError {
    #[error("Invalid root value: {0}")]
    InvalidRoot(String),

    #[error("Cannot set '{key}': {reason}")]
    Unsettable { key: String, reason: String },

    #[error("Invalid map key type at '{key}': {kind} keys are not supported")]
    InvalidMapKeyType { key: String, kind: &'static str },

    #[error("Invalid map key at '{key}': {reason}")]
    InvalidMapKeyValue { key: String, reason: String },

    #[error("Failed to decode '{key}': {reason}")]
    Unmarshal { key: String, reason: String },

    #[error("Failed to encode '{key}': {reason}")]
    Marshal { key: String, reason: String },

    #[error("Unsupported value at '{key}': {what}")]
    Unsupported { key: String, what: String },

    #[error("Duplicate flag name '--{name}' (from '{first}' and '{second}')")]
    DuplicateFlagName {
        name: String,
        first: String,
        second: String,
    },

    #[error("Duplicate flag shorthand '-{shorthand}' (on '--{first}' and '--{second}')")]
    DuplicateShorthand {
        shorthand: char,
        first: String,
        second: String,
    },

    #[error("Invalid field tag for '{field}': {reason}")]
    InvalidTag { field: String, reason: String },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Unknown flag '--{0}'")]
    UnknownFlag(String),

    #[error("Unknown keys in group {group}: {}", keys.join(", "))]
    UnknownKeys { group: String, keys: Vec<String> },

    #[error("Invalid line {line}: expected KEY=value, got '{text}'")]
    InvalidLine { line: usize, text: String },

    #[error("Failed to write {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Component '{name}' failed: {reason}")]
    Component { name: String, reason: String },

    #[error("App name is required: call .app_name() on the builder")]
    AppNameRequired,

    /// Error raised inside a serde impl before a path was attached.
    #[error("{0}")]
    Message(String),
}

impl EnvflagError {
    /// Attach the failing path to a decode-side error that has none yet.
    pub(crate) fn decoding_at(self, key: &str) -> Self {
        match self {
            EnvflagError::Message(reason) => EnvflagError::Unmarshal {
                key: key.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Attach the failing path to an encode-side error that has none yet.
    pub(crate) fn encoding_at(self, key: &str) -> Self {
        match self {
            EnvflagError::Message(reason) => EnvflagError::Marshal {
                key: key.to_string(),
                reason,
            },
            other => other,
        }
    }
}

impl serde::ser::Error for EnvflagError {
    fn custom<T: Display>(msg: T) -> Self {
        EnvflagError::Message(msg.to_string())
    }
}

impl serde::de::Error for EnvflagError {
    fn custom<T: Display>(msg: T) -> Self {
        EnvflagError::Message(msg.to_string())
    }
}
