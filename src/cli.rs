//! Clap adapter for envflag.
//!
//! This module is the **optional integration layer** between envflag's
//! framework-agnostic core and the [clap](https://docs.rs/clap) CLI parser.
//! It is compiled only when the `clap` Cargo feature is enabled (on by
//! default).
//!
//! Two pieces:
//!
//! - [`ClapRegistry`] implements [`FlagRegistry`]: it turns every projected
//!   [`Flag`] into a `clap::Arg`, and [`apply_matches`] writes the values the
//!   user typed back through the [`Projection`].
//! - [`ConfigArgs`] / [`ConfigSubcommand`] give your app
//!   `config gen|list|get` subcommands. [`ConfigArgs::into_action()`]
//!   converts them into a [`ConfigAction`](crate::ConfigAction) for
//!   [`EnvflagBuilder::handle()`](crate::EnvflagBuilder::handle).
//!
//! ```ignore
//! let mut args = ServerArgs::default();
//! let mut projection = Envflag::builder::<ServerArgs>()
//!     .app_name("server")
//!     .project(&mut args)?;
//! let mut registry = ClapRegistry::new();
//! projection.register(&mut registry)?;
//! let matches = registry.apply_to(Command::new("server")).get_matches();
//! apply_matches(&mut projection, &matches)?;
//! ```

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Args, Command, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::de::LeafKind;
use crate::error::EnvflagError;
use crate::flag::{Flag, FlagRegistry, Projection};
use crate::tag::{FALLBACK_LANGUAGE, FlagSchema};
use crate::types::ConfigAction;

/// Collects projected flags as `clap::Arg`s.
#[derive(Debug, Clone)]
pub struct ClapRegistry {
    args: Vec<Arg>,
    language: String,
}

impl Default for ClapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClapRegistry {
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            language: FALLBACK_LANGUAGE.to_string(),
        }
    }

    /// Language for help texts (default `en`).
    pub fn language(mut self, lang: &str) -> Self {
        self.language = lang.to_string();
        self
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Add the collected args to `command`.
    pub fn apply_to(self, command: Command) -> Command {
        command.args(self.args)
    }
}

impl FlagRegistry for ClapRegistry {
    fn register(&mut self, flag: &Flag, current: &str) -> Result<(), EnvflagError> {
        let mut arg = Arg::new(flag.name.clone())
            .long(flag.name.clone())
            .action(ArgAction::Set)
            .required(flag.required())
            // clap rejects global args that are also required.
            .global(flag.persistent() && !flag.required());

        arg = match flag.kind {
            LeafKind::Enum(variants) => {
                arg.value_parser(PossibleValuesParser::new(variants.iter().copied()))
            }
            _ => arg.value_parser(clap::value_parser!(String)),
        };
        if let Some(c) = flag.shorthand() {
            arg = arg.short(c);
        }
        if let Some(help) = flag.help_for(&self.language) {
            arg = arg.help(help.to_string());
        }
        if !current.is_empty() && !flag.required() {
            arg = arg
                .default_value(current.to_string())
                .hide_default_value(flag.secret);
        }
        if let Some(value) = flag.no_opt_default() {
            arg = arg
                .num_args(0..=1)
                .default_missing_value(value.to_string());
        }

        self.args.push(arg);
        Ok(())
    }
}

/// Write every flag given on the command line into the projected value.
///
/// Values that only come from clap defaults are skipped; they are already in
/// the value.
pub fn apply_matches<T>(
    projection: &mut Projection<'_, T>,
    matches: &ArgMatches,
) -> Result<(), EnvflagError>
where
    T: Serialize + DeserializeOwned + FlagSchema,
{
    let names: Vec<String> = projection.flags().iter().map(|f| f.name.clone()).collect();
    for name in names {
        if matches.value_source(&name) != Some(ValueSource::CommandLine) {
            continue;
        }
        let value = matches
            .try_get_one::<String>(&name)
            .map_err(|e| EnvflagError::Unmarshal {
                key: name.clone(),
                reason: e.to_string(),
            })?;
        if let Some(value) = value {
            projection.set(&name, value)?;
        }
    }
    Ok(())
}

/// Clap-derived args for the `config` subcommand group.
///
/// Embed this into your app's clap derive:
/// ```ignore
/// #[derive(Parser)]
/// struct Cli {
///     #[command(subcommand)]
///     command: Commands,
/// }
///
/// #[derive(Subcommand)]
/// enum Commands {
///     Config(ConfigArgs),
/// }
/// ```
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigSubcommand>,
}

/// Available config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show all resolved entries, secrets masked.
    List,
    /// Write the defaults as KEY=value lines.
    Gen {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show one resolved entry.
    Get {
        /// Flat key (e.g. "db_pool_size").
        key: String,
    },
}

impl ConfigArgs {
    /// Convert clap-parsed args into a framework-agnostic `ConfigAction`.
    ///
    /// Bare `config` (no subcommand) and explicit `config list` both map to
    /// `ConfigAction::List`.
    pub fn into_action(self) -> ConfigAction {
        match self.action {
            None | Some(ConfigSubcommand::List) => ConfigAction::List,
            Some(ConfigSubcommand::Gen { output }) => ConfigAction::Gen { output },
            Some(ConfigSubcommand::Get { key }) => ConfigAction::Get { key },
        }
    }
}
