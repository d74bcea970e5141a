use crate::group::Group;
use crate::path::GROUP_DELIMITER;

/// Build an env [`Group`] from variables matching `{PREFIX}__*`.
///
/// The prefix and its `__` are stripped; the rest is the flat key, so
/// `APP__DATABASE_POOL_SIZE` becomes `DATABASE_POOL_SIZE` and is found by the
/// decoder under `database_pool_size`. Matching ignores case. Empty values
/// are skipped so they never mask a default.
///
/// Takes an iterator so tests can pass synthetic data instead of `std::env::vars()`.
pub fn from_env(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Group {
    let needle = format!("{}{GROUP_DELIMITER}", prefix.to_uppercase());
    let mut group = Group::env(prefix.to_uppercase());

    for (key, value) in vars {
        let upper = key.to_uppercase();
        let Some(rest) = upper.strip_prefix(&needle) else {
            continue;
        };
        if rest.is_empty() || value.is_empty() {
            continue;
        }
        group.set(rest, value);
    }

    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::decode_into;
    use crate::fixtures::test::ServerArgs;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn simple_key() {
        let group = from_env("MYAPP", vars(&[("MYAPP__HOST", "0.0.0.0")]));
        assert_eq!(group.get("host").unwrap().value, "0.0.0.0");
        assert_eq!(group.name(), "MYAPP");
    }

    #[test]
    fn single_underscore_joins_path() {
        let group = from_env("MYAPP", vars(&[("MYAPP__DB_POOL_SIZE", "10")]));
        assert_eq!(group.get("db_pool_size").unwrap().value, "10");
        assert!(group.has_subtree("db"));
    }

    #[test]
    fn values_are_kept_verbatim() {
        let group = from_env("MYAPP", vars(&[("MYAPP__NAME", " hello world ")]));
        assert_eq!(group.get("name").unwrap().value, " hello world ");
    }

    #[test]
    fn prefix_matching_ignores_case() {
        let group = from_env("myapp", vars(&[("MYAPP__PORT", "1"), ("myapp__host", "h")]));
        assert_eq!(group.len(), 2);
        assert_eq!(group.get("PORT").unwrap().value, "1");
    }

    #[test]
    fn empty_values_skipped() {
        let group = from_env("MYAPP", vars(&[("MYAPP__PORT", "")]));
        assert!(group.is_empty());
    }

    #[test]
    fn no_matching_prefix_ignored() {
        let group = from_env("MYAPP", vars(&[("OTHER__HOST", "x")]));
        assert!(group.is_empty());
    }

    #[test]
    fn bare_prefix_ignored() {
        let group = from_env("MYAPP", vars(&[("MYAPP", "x"), ("MYAPP__", "y")]));
        assert!(group.is_empty());
    }

    #[test]
    fn prefix_with_single_underscore_not_matched() {
        let group = from_env("MYAPP", vars(&[("MYAPP_HOST", "x")]));
        assert!(group.is_empty());
    }

    #[test]
    fn decodes_over_defaults() {
        let group = from_env(
            "APP",
            vars(&[
                ("APP__PORT", "3000"),
                ("APP__DB_POOL_SIZE", "20"),
                ("APP__LABELS_ZONE", "eu"),
                ("APP__PEERS_1", "b"),
            ]),
        );
        let mut args = ServerArgs::default();
        decode_into(&group, &mut args).unwrap();
        assert_eq!(args.port, 3000);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.db.pool_size, 20);
        assert_eq!(args.labels["ZONE"], "eu");
        assert_eq!(args.peers, vec!["".to_string(), "b".to_string()]);
    }
}
