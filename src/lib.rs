//! Flatten nested config structs into environment variables and CLI flags,
//! and read them back.
//!
//! Envflag maps any `Serialize`/`Deserialize` value onto a flat, string-keyed
//! namespace. The same path-derived key addresses a leaf as an env var, as a
//! line in a `KEY=value` dump, and as a command-line flag:
//!
//! | Field path | Flat key | Env var | Flag |
//! |------------|----------|---------|------|
//! | `port` | `port` | `MYAPP__PORT` | `--port` |
//! | `db.pool_size` | `db_pool_size` | `MYAPP__DB_POOL_SIZE` | `--db-pool-size` |
//! | `peers[2]` | `peers_2` | `MYAPP__PEERS_2` | `--peers-2` |
//! | `labels["zone"]` | `labels_zone` | `MYAPP__LABELS_ZONE` | `--labels-zone` |
//!
//! ```ignore
//! let config: AppConfig = Envflag::builder()
//!     .app_name("myapp")
//!     .load()?;
//! ```
//!
//! That call starts from `AppConfig::default()`, layers every `MYAPP__*`
//! environment variable on top, and hands you a typed struct.
//!
//! # The codec
//!
//! [`encode`] walks a value and writes one [`Var`] per leaf into a
//! [`Group`]; [`decode`] walks the target type and reads each leaf back.
//! Neither needs anything from your types beyond serde derives:
//!
//! - **Structs** contribute one path segment per field, named by its serde
//!   name. `#[serde(rename)]` renames, `#[serde(skip)]` excludes.
//! - **Sequences** use the index as the segment. Decoding sizes a `Vec` from
//!   the highest index present, so `peers_0` and `peers_2` give a length of
//!   three with a zero value in the hole. An index at or past
//!   [`MAX_SEQUENCE_LEN`] is an error. Fixed arrays keep their length and
//!   ignore indices past it.
//! - **Maps** use the key as the segment. String keys must be non-empty
//!   ASCII alphanumerics and integer keys non-negative, so a key can never
//!   contain the `_` joiner.
//! - **Options** are `Some` exactly when something is stored at or below
//!   their key. A present value that writes no leaves (an empty `Vec`, an
//!   empty map) gets an empty entry at its own key, so `Some(vec![])` stays
//!   `Some`.
//! - **Leaves** are anything serde writes as a single scalar or string:
//!   numbers, bools, strings, unit enum variants, and types like
//!   `SocketAddr` or `PathBuf` that serialize as text. They are never taken
//!   apart.
//!
//! Two wrappers change how a field is walked:
//!
//! - [`Secret<T>`] marks a leaf as sensitive. Its [`Var`] carries the mask
//!   `--------`, which [`Group::masked_dump`] shows instead of the value.
//! - [`Inline<T>`] puts a nested struct's fields directly under the parent's
//!   path, without a segment of its own.
//!
//! `#[serde(flatten)]` goes through serde's map machinery and loses field
//! names, so use [`Inline<T>`] instead.
//!
//! # Defaults
//!
//! `decode` leaves missing struct fields to serde: `Option` fields become
//! `None`, `#[serde(default)]` fills the rest, and anything else is a
//! "missing field" error. That holds for structs inside maps, sequences and
//! options too, so a map of `#[serde(default)]` backends picks up the
//! backend defaults for every field the group does not set.
//!
//! [`decode_into`] keeps what the target already holds: it encodes the
//! target, layers the group on top (matching keys ignoring ASCII case), and
//! decodes the result in place. Starting from `T::default()` therefore makes
//! `Default` the lowest layer, and `#[serde(skip)]` fields survive.
//!
//! # Dumps
//!
//! [`Group::dump`] writes sorted `KEY=value` lines. Backslashes, line feeds
//! and carriage returns in values are escaped as `\\`, `\n` and `\r`;
//! [`Group::parse`] undoes them.
//!
//! # Layer precedence
//!
//! ```text
//! Compiled defaults     impl Default
//!        ↑ overridden by
//! Environment vars      PREFIX__KEY
//!        ↑ overridden by
//! Overrides             .set()
//!        ↑ overridden by
//! Command-line flags    Projection::set / cli::apply_matches
//! ```
//!
//! Every layer is **sparse**: unset keys fall through to the layer below.
//!
//! # Flags
//!
//! [`Projection`] binds a live value and derives one [`Flag`] per leaf:
//! name `db-pool-size`, env key `MYAPP__DB_POOL_SIZE`. Env overrides are
//! applied before the flags are handed to a [`FlagRegistry`], and setting a
//! flag writes straight into the bound value. Leaves inside a `None` option
//! get flags too; setting one creates the option, so the struct inside
//! needs `#[serde(default)]` for the fields left unset.
//!
//! Per-field flag options (required, persistent, shorthand, declared
//! default, value when given bare, help per language) come from
//! [`FlagSchema`], as tag strings such as `"short=p,persistent"` or as typed
//! [`FieldOptions`]. Two leaves with the same flag name or shorthand are an
//! error at projection time.
//!
//! # Clap adapter
//!
//! The `cli` module (behind the `clap` feature, on by default) provides
//! `ClapRegistry`, which turns flags into `clap::Arg`s, `apply_matches`,
//! which writes parsed values back, and `ConfigArgs`, which gives your app
//! `config gen|list|get` subcommands. To use envflag without clap:
//!
//! ```toml
//! envflag = { version = "...", default-features = false }
//! ```
//!
//! # Strict mode
//!
//! Strict mode is **on by default**. A `MYAPP__*` variable that does not
//! land on any field fails loading with the full variable name. Turn it off
//! with [`.strict(false)`](EnvflagBuilder::strict) to log a warning instead.
//!
//! # Logging
//!
//! Envflag emits [`tracing`](https://docs.rs/tracing) events and never
//! installs a subscriber. Resolved values are only ever logged masked.
//!
//! # Error handling
//!
//! All fallible operations return [`EnvflagError`]. Leaf errors carry the
//! flat key that failed. A failed `decode_into` leaves its target unchanged.

pub mod error;
pub mod types;

mod builder;
#[cfg(feature = "clap")]
mod cli;
mod de;
mod env;
mod flag;
mod group;
pub mod lifecycle;
mod ops;
pub mod path;
mod ser;
mod tag;

#[cfg(test)]
mod fixtures;

pub use builder::{Envflag, EnvflagBuilder};
#[cfg(feature = "clap")]
pub use cli::{ClapRegistry, ConfigArgs, ConfigSubcommand, apply_matches};
pub use de::{LeafKind, MAX_SEQUENCE_LEN, decode, decode_group, decode_into};
pub use env::from_env;
pub use error::EnvflagError;
pub use flag::{Flag, FlagRegistry, Projection};
pub use group::{Group, KeyCase, MASK, Var};
pub use ops::ConfigResult;
pub use path::PathWalker;
pub use ser::{encode, encode_into};
pub use tag::{FieldOptions, FlagSchema};
pub use types::{ConfigAction, Inline, Secret};
