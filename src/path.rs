//! Path composition for the flat namespace.
//!
//! A leaf's location in a nested value is a sequence of [`Segment`]s: struct
//! field names, map keys, and sequence indices. [`PathWalker`] keeps that
//! sequence while the encoder, decoder, and flag projection descend, and joins
//! it into a single flat key on demand:
//!
//! ```text
//! Config { database: Db { hosts: ["a", "b"] } }
//!     database → hosts → 1   ==>   database_hosts_1
//! ```
//!
//! Field names are used verbatim, so a snake_case field like `pool_size`
//! becomes `database_pool_size`. Map keys are restricted to ASCII
//! alphanumerics when encoded, which keeps them from colliding with the
//! joiner.

use std::fmt;

/// Joiner between segments of a flat key.
pub const DELIMITER: char = '_';

/// Joiner between a group name and a key (`GROUP__KEY`).
pub const GROUP_DELIMITER: &str = "__";

/// One component of a leaf's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A struct field, by its serialized name.
    Field(&'static str),
    /// A map key, already converted to text.
    Key(String),
    /// A sequence or array index.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Key(key) => f.write_str(key),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&'static str> for Segment {
    fn from(name: &'static str) -> Self {
        Segment::Field(name)
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// A stack of path segments with push/pop semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathWalker {
    segments: Vec<Segment>,
}

impl PathWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a segment. Every segment is kept, even an empty one.
    pub fn enter(&mut self, segment: impl Into<Segment>) {
        self.segments.push(segment.into());
    }

    /// Pop the most recent segment.
    ///
    /// # Panics
    ///
    /// Panics when the path is empty. Every `leave` must match an `enter`.
    pub fn leave(&mut self) -> Segment {
        match self.segments.pop() {
            Some(segment) => segment,
            None => panic!("envflag: leave() called on an empty path"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The flat key: segments joined with [`DELIMITER`].
    pub fn key(&self) -> String {
        self.join(DELIMITER)
    }

    /// Dotted form (`database.pool_size`), used to look up per-field options.
    pub fn dotted(&self) -> String {
        self.join('.')
    }

    /// Flat key for a child segment without mutating the walker.
    pub fn child_key(&self, segment: &Segment) -> String {
        join_key(&self.key(), &segment.to_string())
    }

    fn join(&self, sep: char) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(sep);
            }
            out.push_str(&segment.to_string());
        }
        out
    }
}

impl fmt::Display for PathWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Join a prefix and a child with [`DELIMITER`]. An empty prefix is the
/// root, so the child is returned as is.
pub fn join_key(prefix: &str, child: &str) -> String {
    if prefix.is_empty() {
        child.to_string()
    } else {
        format!("{prefix}{DELIMITER}{child}")
    }
}

/// Lower-dash form of a flat key: `Server_pool_size` → `server-pool-size`.
pub fn flag_name(key: &str) -> String {
    key.to_lowercase().replace(DELIMITER, "-")
}

/// Upper-snake form of a flat key, optionally qualified by a prefix:
/// `server_port` with prefix `MYAPP` → `MYAPP__SERVER_PORT`.
pub fn env_key(prefix: Option<&str>, key: &str) -> String {
    let upper = key.to_uppercase();
    match prefix {
        Some(p) if !p.is_empty() => format!("{}{GROUP_DELIMITER}{upper}", p.to_uppercase()),
        _ => upper,
    }
}
