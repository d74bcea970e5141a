use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::de::decode_into;
use crate::env;
use crate::error::EnvflagError;
use crate::flag::Projection;
use crate::group::Group;
use crate::ops::{self, ConfigResult};
use crate::ser::{encode, encode_into};
use crate::tag::FlagSchema;
use crate::types::ConfigAction;

/// Entry point for building an envflag configuration.
pub struct Envflag;

impl Envflag {
    pub fn builder<T>() -> EnvflagBuilder<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        EnvflagBuilder::new()
    }
}

/// Builder for loading a typed value from defaults, env vars, and overrides.
///
/// Layers, lowest first: `T::default()`, `{PREFIX}__*` env vars, then
/// [`set`](Self::set) overrides.
pub struct EnvflagBuilder<T> {
    app_name: Option<String>,
    env_prefix: Option<String>,
    env_enabled: bool,
    env_vars: Option<Vec<(String, String)>>,
    strict: bool,
    overrides: Vec<(String, String)>,
    _phantom: PhantomData<T>,
}

impl<T> EnvflagBuilder<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn new() -> Self {
        Self {
            app_name: None,
            env_prefix: None,
            env_enabled: true,
            env_vars: None,
            strict: true,
            overrides: Vec::new(),
            _phantom: PhantomData,
        }
    }

    /// Set the application name. The env prefix defaults to it, uppercased.
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Override the environment variable prefix (default: uppercased `app_name`).
    /// It is also the group name of the resolved entries.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Disable environment variable loading entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Read these variables instead of the process environment.
    pub fn env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env_vars = Some(vars.into_iter().collect());
        self
    }

    /// Enable or disable strict mode (default: `true`).
    /// In strict mode, a `{PREFIX}__*` variable that matches no field is an
    /// error instead of a warning.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override one leaf by flat key (`db_pool_size`). Highest priority.
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Resolve the effective app name, or error if not set.
    fn effective_app_name(&self) -> Result<&str, EnvflagError> {
        self.app_name
            .as_deref()
            .ok_or(EnvflagError::AppNameRequired)
    }

    /// Resolve the effective env prefix (None if env disabled).
    fn effective_env_prefix(&self) -> Result<Option<String>, EnvflagError> {
        if !self.env_enabled {
            return Ok(None);
        }
        if let Some(prefix) = &self.env_prefix {
            return Ok(Some(prefix.clone()));
        }
        let app = self.effective_app_name()?;
        Ok(Some(app.to_uppercase()))
    }

    fn group_name(&self) -> String {
        match (&self.env_prefix, &self.app_name) {
            (Some(prefix), _) => prefix.clone(),
            (None, Some(app)) => app.to_uppercase(),
            (None, None) => String::new(),
        }
    }

    fn vars(&self) -> Vec<(String, String)> {
        match &self.env_vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        }
    }

    /// Load and resolve the value through all layers.
    pub fn load(self) -> Result<T, EnvflagError> {
        self.resolve().map(|(value, _)| value)
    }

    /// The resolved value and its encoded entries.
    fn resolve(&self) -> Result<(T, Group), EnvflagError> {
        let mut value = T::default();

        if let Some(prefix) = self.effective_env_prefix()? {
            let env = env::from_env(&prefix, self.vars());
            debug!(group = %prefix, entries = env.len(), "loaded environment");
            decode_into(&env, &mut value)?;
            self.check_unknown(&env, &value)?;
        }

        if !self.overrides.is_empty() {
            let mut overrides = Group::new(self.group_name());
            for (key, v) in &self.overrides {
                overrides.set(key, v.clone());
            }
            debug!(entries = overrides.len(), "applying overrides");
            decode_into(&overrides, &mut value)?;
        }

        let resolved = encode(&self.group_name(), &value)?;
        trace!(group = %resolved.name(), config = %resolved.masked_dump(), "resolved");
        Ok((value, resolved))
    }

    /// Env entries that did not land on any leaf of the decoded value.
    fn check_unknown(&self, env: &Group, value: &T) -> Result<(), EnvflagError> {
        let mut known = Group::env(env.name());
        encode_into(&mut known, value)?;

        let mut unknown: Vec<String> = env
            .iter()
            .filter(|var| known.get(&var.key).is_none())
            .map(|var| env.qualified_key(&var.key))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();

        if self.strict {
            return Err(EnvflagError::UnknownKeys {
                group: env.name().to_string(),
                keys: unknown,
            });
        }
        for key in &unknown {
            warn!(key = %key, "ignoring environment variable that matches no field");
        }
        Ok(())
    }

    /// Project `target` into flags. Env overrides are read with the same
    /// prefix and variables as [`load`](Self::load).
    pub fn project<'a>(&self, target: &'a mut T) -> Result<Projection<'a, T>, EnvflagError>
    where
        T: FlagSchema,
    {
        let prefix = self.effective_env_prefix()?;
        let vars = if prefix.is_some() { self.vars() } else { Vec::new() };
        Projection::new(target, prefix.as_deref(), vars)
    }

    /// Handle a `ConfigAction` and print the result to stdout.
    pub fn handle_and_print(self, action: &ConfigAction) -> Result<(), EnvflagError> {
        let result = self.handle(action)?;
        println!("{result}");
        Ok(())
    }

    /// Handle a `ConfigAction` (list / gen / get).
    pub fn handle(self, action: &ConfigAction) -> Result<ConfigResult, EnvflagError> {
        match action {
            ConfigAction::List => {
                let (_, resolved) = self.resolve()?;
                Ok(ops::list_values(&resolved))
            }
            ConfigAction::Gen { output } => match output {
                Some(path) => ops::write_template::<T>(path),
                None => Ok(ConfigResult::Template(ops::generate_template::<T>()?)),
            },
            ConfigAction::Get { key } => {
                let (_, resolved) = self.resolve()?;
                ops::get_value(&resolved, key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{Mode, ServerArgs};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn app_name_sets_prefix() {
        let builder = Envflag::builder::<ServerArgs>().app_name("myapp");
        assert_eq!(
            builder.effective_env_prefix().unwrap(),
            Some("MYAPP".to_string())
        );
        assert_eq!(builder.group_name(), "MYAPP");
    }

    #[test]
    fn override_env_prefix() {
        let builder = Envflag::builder::<ServerArgs>()
            .app_name("myapp")
            .env_prefix("CUSTOM");
        assert_eq!(
            builder.effective_env_prefix().unwrap(),
            Some("CUSTOM".to_string())
        );
    }

    #[test]
    fn no_env_disables_prefix() {
        let builder = Envflag::builder::<ServerArgs>().app_name("myapp").no_env();
        assert_eq!(builder.effective_env_prefix().unwrap(), None);
    }

    #[test]
    fn missing_app_name_errors() {
        let result = Envflag::builder::<ServerArgs>().env_vars(vars(&[])).load();
        assert!(matches!(result, Err(EnvflagError::AppNameRequired)));
    }

    #[test]
    fn no_env_needs_no_app_name() {
        let args = Envflag::builder::<ServerArgs>().no_env().load().unwrap();
        assert_eq!(args, ServerArgs::default());
    }

    // --- Load tests ---

    #[test]
    fn load_defaults_only() {
        let args = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[]))
            .load()
            .unwrap();
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);
        assert!(!args.verbose);
    }

    #[test]
    fn load_keeps_default_map_keys() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Zoned {
            labels: BTreeMap<String, String>,
        }
        impl Default for Zoned {
            fn default() -> Self {
                Self {
                    labels: BTreeMap::from([("zone".to_string(), "eu".to_string())]),
                }
            }
        }

        let plain = Envflag::builder::<Zoned>()
            .app_name("test")
            .env_vars(vars(&[]))
            .load()
            .unwrap();
        assert_eq!(plain.labels, BTreeMap::from([("zone".into(), "eu".into())]));

        let moved = Envflag::builder::<Zoned>()
            .app_name("test")
            .env_vars(vars(&[("TEST__LABELS_ZONE", "us")]))
            .load()
            .unwrap();
        assert_eq!(moved.labels, BTreeMap::from([("zone".into(), "us".into())]));
    }

    #[test]
    fn load_with_env() {
        let args = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[
                ("TEST__PORT", "3000"),
                ("TEST__MODE", "fast"),
                ("TEST__TLS_CERT", "c.pem"),
                ("OTHER__PORT", "1"),
            ]))
            .load()
            .unwrap();
        assert_eq!(args.port, 3000);
        assert_eq!(args.mode, Mode::Fast);
        assert_eq!(args.tls.unwrap().cert, "c.pem");
        assert_eq!(args.host, "127.0.0.1");
    }

    #[test]
    fn empty_env_value_keeps_default() {
        let args = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__PORT", "")]))
            .load()
            .unwrap();
        assert_eq!(args.port, 8080);
    }

    #[test]
    fn override_beats_env() {
        let args = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__PORT", "3000")]))
            .set("port", "9999")
            .load()
            .unwrap();
        assert_eq!(args.port, 9999);
    }

    #[test]
    fn bad_env_value_names_the_key() {
        let err = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__DB_POOL_SIZE", "lots")]))
            .load()
            .unwrap_err();
        assert!(matches!(err, EnvflagError::Unmarshal { ref key, .. } if key == "db_pool_size"));
    }

    #[test]
    fn strict_rejects_unknown_env_key() {
        let err = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__TYPO", "1"), ("TEST__PORT", "1")]))
            .load()
            .unwrap_err();
        match err {
            EnvflagError::UnknownKeys { group, keys } => {
                assert_eq!(group, "TEST");
                assert_eq!(keys, vec!["TEST__TYPO".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lenient_allows_unknown_env_key() {
        let args = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__TYPO", "1"), ("TEST__PORT", "3000")]))
            .strict(false)
            .load()
            .unwrap();
        assert_eq!(args.port, 3000);
    }

    #[test]
    fn map_and_slice_entries_are_known() {
        let args = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__LABELS_ZONE", "eu"), ("TEST__PEERS_0", "a")]))
            .load()
            .unwrap();
        assert_eq!(args.labels["ZONE"], "eu");
        assert_eq!(args.peers, vec!["a".to_string()]);
    }

    // --- Actions ---

    #[test]
    fn handle_list_masks_secrets() {
        let result = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__PASSWORD", "hunter2")]))
            .handle(&ConfigAction::List)
            .unwrap();
        let ConfigResult::Listing { entries } = result else {
            panic!("expected a listing");
        };
        assert!(entries.contains(&("password".into(), "--------".into())));
        assert!(entries.contains(&("port".into(), "8080".into())));
    }

    #[test]
    fn handle_get() {
        let result = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__PORT", "3000")]))
            .handle(&ConfigAction::Get { key: "port".into() })
            .unwrap();
        assert_eq!(
            result,
            ConfigResult::KeyValue {
                key: "port".into(),
                value: "3000".into()
            }
        );
    }

    #[test]
    fn handle_get_unknown_key() {
        let result = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[]))
            .handle(&ConfigAction::Get { key: "nope".into() });
        assert!(matches!(result, Err(EnvflagError::KeyNotFound(_))));
    }

    #[test]
    fn handle_gen_to_stdout_and_file() {
        let builder = || Envflag::builder::<ServerArgs>().app_name("test");
        let ConfigResult::Template(template) =
            builder().handle(&ConfigAction::Gen { output: None }).unwrap()
        else {
            panic!("expected a template");
        };
        assert!(template.contains("port=8080"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("defaults.env");
        builder()
            .handle(&ConfigAction::Gen {
                output: Some(path.clone()),
            })
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), template);
    }

    #[test]
    fn project_uses_builder_env() {
        let builder = Envflag::builder::<ServerArgs>()
            .app_name("test")
            .env_vars(vars(&[("TEST__PORT", "4000")]));
        let mut args = ServerArgs::default();
        let projection = builder.project(&mut args).unwrap();
        assert_eq!(projection.flag("port").unwrap().env_key, "TEST__PORT");
        assert_eq!(projection.target().port, 4000);
    }
}
