//! Config operations: dump generation, key lookup, listing, and result types.
//!
//! Provides the logic behind `config list`, `config gen`, `config get`, and the
//! `ConfigResult` enum that callers use to display results.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::EnvflagError;
use crate::group::Group;
use crate::ser::encode;

/// Result of a config operation. Returned to the caller for display.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigResult {
    /// A generated `KEY=value` dump of the defaults.
    Template(String),
    /// Confirmation that a dump was written to a file.
    TemplateWritten { path: PathBuf },
    /// One resolved entry. Secrets are masked.
    KeyValue { key: String, value: String },
    /// All resolved entries, sorted by key. Secrets are masked.
    Listing { entries: Vec<(String, String)> },
}

impl fmt::Display for ConfigResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigResult::Template(t) => write!(f, "{t}"),
            ConfigResult::TemplateWritten { path } => {
                write!(f, "Config template written to {}", path.display())
            }
            ConfigResult::KeyValue { key, value } => write!(f, "{key}={value}"),
            ConfigResult::Listing { entries } => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{key}={value}")?;
                }
                Ok(())
            }
        }
    }
}

/// The unmasked `KEY=value` dump of `T::default()`, readable back with
/// [`Group::parse`].
pub fn generate_template<T: Serialize + Default>() -> Result<String, EnvflagError> {
    let mut dump = encode("", &T::default())?.dump();
    if !dump.is_empty() {
        dump.push('\n');
    }
    Ok(dump)
}

/// Write [`generate_template`] output to `path`, creating parent directories.
pub fn write_template<T: Serialize + Default>(path: &Path) -> Result<ConfigResult, EnvflagError> {
    let template = generate_template::<T>()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| EnvflagError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, &template).map_err(|e| EnvflagError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(ConfigResult::TemplateWritten {
        path: path.to_path_buf(),
    })
}

/// Look up one resolved entry by flat key.
pub fn get_value(group: &Group, key: &str) -> Result<ConfigResult, EnvflagError> {
    let var = group
        .get(key)
        .ok_or_else(|| EnvflagError::KeyNotFound(key.to_string()))?;
    Ok(ConfigResult::KeyValue {
        key: var.key.clone(),
        value: var.display_value().to_string(),
    })
}

/// Every resolved entry, sorted, secrets masked.
pub fn list_values(group: &Group) -> ConfigResult {
    let entries = group
        .sorted()
        .into_iter()
        .map(|var| (var.key.clone(), var.display_value().to_string()))
        .collect();
    ConfigResult::Listing { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::ServerArgs;
    use tempfile::TempDir;

    #[test]
    fn template_is_sorted_defaults() {
        let template = generate_template::<ServerArgs>().unwrap();
        assert_eq!(
            template,
            "db_pool_size=5\nhost=127.0.0.1\nlabels=\nmode=safe\npassword=\npeers=\nport=8080\nverbose=false\n"
        );
    }

    #[test]
    fn template_parses_back() {
        let template = generate_template::<ServerArgs>().unwrap();
        let group = Group::parse("T", &template).unwrap();
        let args: ServerArgs = crate::de::decode(&group).unwrap();
        assert_eq!(args, ServerArgs::default());
    }

    #[test]
    fn write_template_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/app.env");
        let result = write_template::<ServerArgs>(&path).unwrap();
        assert_eq!(result, ConfigResult::TemplateWritten { path: path.clone() });
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("port=8080"));
    }

    #[test]
    fn get_masks_secrets() {
        let args = ServerArgs {
            password: "hunter2".to_string().into(),
            ..ServerArgs::default()
        };
        let group = encode("APP", &args).unwrap();
        let result = get_value(&group, "password").unwrap();
        assert_eq!(result.to_string(), "password=--------");
    }

    #[test]
    fn get_unknown_key() {
        let group = encode("APP", &ServerArgs::default()).unwrap();
        assert!(matches!(
            get_value(&group, "nope"),
            Err(EnvflagError::KeyNotFound(_))
        ));
    }

    #[test]
    fn listing_display() {
        let mut group = Group::new("T");
        group.set("b", "2");
        group.set("a", "1");
        assert_eq!(list_values(&group).to_string(), "a=1\nb=2");
    }
}
