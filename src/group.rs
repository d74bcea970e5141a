//! The flat namespace store.
//!
//! A [`Group`] owns every [`Var`] for one configuration root. Keys are flat
//! paths (`database_hosts_0`); the decoder discovers map keys and slice
//! lengths by scanning for deeper keys under a prefix, since the flat form
//! has no explicit "this map has these keys" marker.
//!
//! Groups are plain values with no interior locking. Give each concurrent
//! encode or decode its own group.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use crate::error::EnvflagError;
use crate::path::{DELIMITER, GROUP_DELIMITER, join_key};

/// Fixed-width placeholder substituted for secret values in masked dumps.
pub const MASK: &str = "--------";

/// One flat namespace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub key: String,
    pub value: String,
    /// Replacement shown by [`Group::masked_dump`]. `None` means not secret.
    pub mask: Option<String>,
    /// The leaf was reached through an `Option`.
    pub optional: bool,
}

impl Var {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            mask: None,
            optional: false,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// The value safe for display: the mask if one is set, else the raw value.
    pub fn display_value(&self) -> &str {
        self.mask.as_deref().unwrap_or(&self.value)
    }
}

/// How keys are normalized on insert and lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyCase {
    /// Keys are stored as given. Used for generic storage and dumps.
    #[default]
    Preserve,
    /// Keys are upper-cased, matching environment variable conventions.
    Upper,
    /// Keys are stored as given and looked up ignoring ASCII case. An exact
    /// match wins over a case-insensitive one, and [`Group::merge`] updates
    /// existing keys in place instead of adding a second spelling.
    Insensitive,
}

impl KeyCase {
    fn apply(self, key: &str) -> String {
        match self {
            KeyCase::Preserve | KeyCase::Insensitive => key.to_string(),
            KeyCase::Upper => key.to_uppercase(),
        }
    }
}

/// Unordered map from flat key to [`Var`] for one configuration root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    name: String,
    case: KeyCase,
    values: HashMap<String, Var>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            case: KeyCase::Preserve,
            values: HashMap::new(),
        }
    }

    /// A group whose keys are upper-cased, for environment sourcing.
    pub fn env(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            case: KeyCase::Upper,
            values: HashMap::new(),
        }
    }

    pub fn with_case(name: impl Into<String>, case: KeyCase) -> Self {
        Self {
            name: name.into(),
            case,
            values: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn case(&self) -> KeyCase {
        self.case
    }

    /// The key normalized for this group.
    pub fn normalize(&self, key: &str) -> String {
        self.case.apply(key)
    }

    /// Group-qualified form of a key: `GROUP__KEY`.
    pub fn qualified_key(&self, key: &str) -> String {
        if self.name.is_empty() {
            return self.normalize(key);
        }
        format!("{}{GROUP_DELIMITER}{}", self.name, self.normalize(key))
    }

    /// Insert or replace. Returns the previous entry for the key, if any.
    pub fn add(&mut self, mut var: Var) -> Option<Var> {
        var.key = self.normalize(&var.key);
        self.values.insert(var.key.clone(), var)
    }

    /// Shorthand for adding a plain `key=value` entry.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Option<Var> {
        self.add(Var::new(key, value))
    }

    pub fn get(&self, key: &str) -> Option<&Var> {
        match self.case {
            KeyCase::Preserve => self.values.get(key),
            KeyCase::Upper => self.values.get(&key.to_uppercase()),
            KeyCase::Insensitive => self.values.get(key).or_else(|| {
                self.values
                    .values()
                    .filter(|var| var.key.eq_ignore_ascii_case(key))
                    .min_by(|a, b| a.key.cmp(&b.key))
            }),
        }
    }

    pub fn del(&mut self, key: &str) -> Option<Var> {
        let key = self.normalize(key);
        self.values.remove(&key)
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Var> {
        self.values.values()
    }

    /// Entries sorted by key.
    pub fn sorted(&self) -> Vec<&Var> {
        let mut vars: Vec<&Var> = self.values.values().collect();
        vars.sort_by(|a, b| a.key.cmp(&b.key));
        vars
    }

    /// Entries stored in qualified form (`NAME__key`) with the qualifier
    /// stripped. Keys qualified by other group names are dropped.
    pub fn unqualified(&self) -> Group {
        let needle = format!("{}{GROUP_DELIMITER}", self.normalize(&self.name));
        let mut scoped = Group::with_case(self.name.clone(), self.case);
        for var in self.values.values() {
            if let Some(rest) = self.strip(&var.key, &needle) {
                if !rest.is_empty() {
                    scoped.add(Var {
                        key: rest.to_string(),
                        ..var.clone()
                    });
                }
            }
        }
        scoped
    }

    /// Layer `overlay` on top of this group: its entries win key by key.
    ///
    /// In an [`Insensitive`](KeyCase::Insensitive) group an overlay entry
    /// replaces the value of every key that matches it ignoring case, and
    /// those keys keep their spelling.
    pub fn merge(&mut self, overlay: &Group) {
        for var in overlay.iter() {
            if self.case == KeyCase::Insensitive {
                let matching: Vec<String> = self
                    .values
                    .keys()
                    .filter(|key| key.eq_ignore_ascii_case(&var.key))
                    .cloned()
                    .collect();
                if !matching.is_empty() {
                    for key in matching {
                        let replaced = Var {
                            key: key.clone(),
                            ..var.clone()
                        };
                        self.values.insert(key, replaced);
                    }
                    continue;
                }
            }
            self.add(var.clone());
        }
    }

    /// Every key under `prefix_`, with the prefix stripped, sorted.
    ///
    /// An empty prefix matches every key.
    pub fn map_entries(&self, prefix: &str) -> Vec<String> {
        let needle = self.needle(prefix);
        let mut entries: Vec<String> = self
            .values
            .keys()
            .filter_map(|key| self.strip(key, &needle))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
            .collect();
        entries.sort();
        entries
    }

    /// Distinct leading segments of [`map_entries`](Self::map_entries): the
    /// keys of a map stored under `prefix`.
    pub fn map_keys(&self, prefix: &str) -> Vec<String> {
        let keys: BTreeSet<String> = self
            .map_entries(prefix)
            .into_iter()
            .map(|rest| leading_segment(&rest).to_string())
            .collect();
        keys.into_iter().collect()
    }

    /// Length a sequence under `prefix` needs to hold every stored index:
    /// `max(index) + 1`, or `0` when nothing is stored.
    pub fn slice_length(&self, prefix: &str) -> usize {
        self.map_entries(prefix)
            .iter()
            .filter_map(|rest| leading_segment(rest).parse::<usize>().ok())
            .map(|index| index.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// [`slice_length`](Self::slice_length) for a sequence that may hold at
    /// most `limit` elements.
    ///
    /// The first index (in key order) at or past `limit` is an
    /// [`EnvflagError::Unmarshal`] naming its key. Indices too large for
    /// `usize` are past any limit.
    pub fn bounded_slice_length(&self, prefix: &str, limit: usize) -> Result<usize, EnvflagError> {
        let mut len = 0;
        for rest in self.map_entries(prefix) {
            let head = leading_segment(&rest);
            if !head.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            match head.parse::<usize>() {
                Ok(index) if index < limit => len = len.max(index + 1),
                _ => {
                    return Err(EnvflagError::Unmarshal {
                        key: join_key(prefix, head),
                        reason: format!("index {head} is past the limit of {limit} elements"),
                    });
                }
            }
        }
        Ok(len)
    }

    /// Whether anything is stored at `prefix` or below it.
    pub fn has_subtree(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return !self.values.is_empty();
        }
        if self.get(prefix).is_some() {
            return true;
        }
        let needle = self.needle(prefix);
        self.values.keys().any(|key| self.strip(key, &needle).is_some())
    }

    /// Sorted `KEY=value` lines joined by newlines.
    ///
    /// Backslashes, line feeds, and carriage returns in values are written as
    /// `\\`, `\n`, and `\r`, so every entry stays on one line.
    pub fn dump(&self) -> String {
        self.render(|var| &var.value)
    }

    /// Like [`dump`](Self::dump), with masked values replaced. Safe to log.
    pub fn masked_dump(&self) -> String {
        self.render(Var::display_value)
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.dump().into_bytes()
    }

    pub fn mask_bytes(&self) -> Vec<u8> {
        self.masked_dump().into_bytes()
    }

    /// Read a dump produced by [`dump`](Self::dump) back into a group.
    ///
    /// Blank lines and lines starting with `#` are skipped. The value is
    /// everything after the first `=`, with the escapes written by `dump`
    /// undone. A backslash before any other character is kept as is.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Group, EnvflagError> {
        let mut group = Group::new(name);
        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(EnvflagError::InvalidLine {
                    line: i + 1,
                    text: line.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(EnvflagError::InvalidLine {
                    line: i + 1,
                    text: line.to_string(),
                });
            }
            group.set(key, unescape(value));
        }
        Ok(group)
    }

    fn strip<'k>(&self, key: &'k str, needle: &str) -> Option<&'k str> {
        match self.case {
            KeyCase::Insensitive => {
                let n = needle.len();
                let head = key.get(..n)?;
                head.eq_ignore_ascii_case(needle).then(|| &key[n..])
            }
            KeyCase::Preserve | KeyCase::Upper => key.strip_prefix(needle),
        }
    }

    fn needle(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            String::new()
        } else {
            format!("{}{DELIMITER}", self.normalize(prefix))
        }
    }

    fn render<'a>(&'a self, value: impl Fn(&'a Var) -> &'a str) -> String {
        self.sorted()
            .into_iter()
            .map(|var| format!("{}={}", var.key, escape(value(var))))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn leading_segment(rest: &str) -> &str {
    rest.split_once(DELIMITER).map_or(rest, |(head, _)| head)
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\n', '\r']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(pairs: &[(&str, &str)]) -> Group {
        let mut g = Group::new("TEST");
        for (k, v) in pairs {
            g.set(k, *v);
        }
        g
    }

    #[test]
    fn add_is_upsert_last_writer_wins() {
        let mut g = Group::new("TEST");
        assert!(g.set("port", "1").is_none());
        let old = g.set("port", "2").unwrap();
        assert_eq!(old.value, "1");
        assert_eq!(g.get("port").unwrap().value, "2");
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn get_missing_is_none() {
        let g = group(&[("port", "1")]);
        assert!(g.get("host").is_none());
    }

    #[test]
    fn del_and_reset() {
        let mut g = group(&[("a", "1"), ("b", "2")]);
        assert_eq!(g.del("a").unwrap().value, "1");
        assert!(g.get("a").is_none());
        g.reset();
        assert!(g.is_empty());
    }

    #[test]
    fn map_entries_strips_prefix_and_sorts() {
        let g = group(&[
            ("labels_zone", "eu"),
            ("labels_env", "prod"),
            ("labels", "x"),
            ("labelsx_other", "y"),
        ]);
        assert_eq!(g.map_entries("labels"), vec!["env", "zone"]);
    }

    #[test]
    fn map_keys_dedupes_leading_segments() {
        let g = group(&[
            ("backends_primary_host", "a"),
            ("backends_primary_port", "1"),
            ("backends_replica_host", "b"),
        ]);
        assert_eq!(g.map_keys("backends"), vec!["primary", "replica"]);
    }

    #[test]
    fn slice_length_from_sparse_indices() {
        let g = group(&[("hosts_0", "a"), ("hosts_2", "c"), ("hosts_4_name", "e")]);
        assert_eq!(g.slice_length("hosts"), 5);
    }

    #[test]
    fn slice_length_ignores_non_numeric_and_empty() {
        let g = group(&[("hosts_x", "a")]);
        assert_eq!(g.slice_length("hosts"), 0);
        assert_eq!(g.slice_length("missing"), 0);
    }

    #[test]
    fn has_subtree_exact_or_nested() {
        let g = group(&[("db_url", "pg://"), ("port", "1")]);
        assert!(g.has_subtree("db"));
        assert!(g.has_subtree("port"));
        assert!(!g.has_subtree("d"));
        assert!(!g.has_subtree("host"));
    }

    #[test]
    fn dump_is_sorted_key_value_lines() {
        let g = group(&[("b", "2"), ("a", "1"), ("c_d", "3")]);
        assert_eq!(g.dump(), "a=1\nb=2\nc_d=3");
        assert_eq!(g.bytes(), b"a=1\nb=2\nc_d=3".to_vec());
    }

    #[test]
    fn masked_dump_substitutes_only_masked_vars() {
        let mut g = Group::new("TEST");
        g.add(Var::new("password", "secret").with_mask(MASK));
        g.set("user", "admin");
        assert_eq!(g.dump(), "password=secret\nuser=admin");
        assert_eq!(g.masked_dump(), "password=--------\nuser=admin");
        assert!(!g.dump().contains(MASK));
    }

    #[test]
    fn upper_case_group_normalizes_keys() {
        let mut g = Group::env("APP");
        g.set("database_url", "pg://");
        assert_eq!(g.get("DATABASE_URL").unwrap().value, "pg://");
        assert_eq!(g.get("database_url").unwrap().key, "DATABASE_URL");
        assert!(g.has_subtree("database"));
        assert_eq!(g.qualified_key("port"), "APP__PORT");
    }

    #[test]
    fn merge_overlay_wins() {
        let mut base = group(&[("a", "1"), ("b", "2")]);
        let overlay = group(&[("b", "20"), ("c", "30")]);
        base.merge(&overlay);
        assert_eq!(base.dump(), "a=1\nb=20\nc=30");
    }

    #[test]
    fn unqualified_strips_own_group_name() {
        let mut g = Group::new("TEST");
        g.set("TEST__Slice_0", "0");
        g.set("TEST__Slice_2", "2");
        g.set("OTHER__Slice_1", "1");
        let scoped = g.unqualified();
        assert_eq!(scoped.name(), "TEST");
        assert_eq!(scoped.dump(), "Slice_0=0\nSlice_2=2");
    }

    #[test]
    fn parse_reads_dump_back() {
        let g = group(&[("a", "1"), ("url", "pg://x?a=b")]);
        let parsed = Group::parse("TEST", &g.dump()).unwrap();
        assert_eq!(parsed, g);
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let g = Group::parse("T", "# defaults\n\nport=80\n").unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.get("port").unwrap().value, "80");
    }

    #[test]
    fn dump_escapes_line_breaks_and_parse_restores_them() {
        let g = group(&[("motd", "hello\nport=9"), ("path", "C:\\dir\r")]);
        let dump = g.dump();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.contains("motd=hello\\nport=9"));
        let parsed = Group::parse("TEST", &dump).unwrap();
        assert_eq!(parsed, g);
        assert!(parsed.get("port").is_none());
    }

    #[test]
    fn parse_keeps_unknown_escapes() {
        let g = Group::parse("T", "path=C:\\dir\\x\n").unwrap();
        assert_eq!(g.get("path").unwrap().value, "C:\\dir\\x");
    }

    #[test]
    fn slice_length_saturates_on_huge_index() {
        let g = group(&[("hosts_18446744073709551615", "x")]);
        assert_eq!(g.slice_length("hosts"), usize::MAX);
    }

    #[test]
    fn bounded_slice_length_rejects_far_indices() {
        let g = group(&[("hosts_0", "a"), ("hosts_100000000000", "b")]);
        let err = g.bounded_slice_length("hosts", 1024).unwrap_err();
        assert!(matches!(err, EnvflagError::Unmarshal { ref key, .. } if key == "hosts_100000000000"));

        let g = group(&[("hosts_99999999999999999999999", "x")]);
        assert!(g.bounded_slice_length("hosts", 1024).is_err());

        let g = group(&[("hosts_1", "a"), ("hosts_x", "b")]);
        assert_eq!(g.bounded_slice_length("hosts", 1024).unwrap(), 2);
    }

    #[test]
    fn insensitive_lookup_prefers_exact_spelling() {
        let mut g = Group::with_case("T", KeyCase::Insensitive);
        g.set("labels_a", "1");
        g.set("labels_A", "2");
        assert_eq!(g.len(), 2);
        assert_eq!(g.get("labels_A").unwrap().value, "2");
        assert_eq!(g.get("LABELS_a").unwrap().value, "2");
        assert_eq!(g.map_keys("LABELS"), vec!["A", "a"]);
        assert!(g.has_subtree("Labels"));
    }

    #[test]
    fn insensitive_merge_keeps_existing_spelling() {
        let mut g = Group::with_case("T", KeyCase::Insensitive);
        g.set("labels_zone", "eu");
        g.set("port", "1");
        let mut env = Group::env("APP");
        env.set("LABELS_ZONE", "us");
        env.set("LABELS_REGION", "west");
        g.merge(&env);
        assert_eq!(g.dump(), "LABELS_REGION=west\nlabels_zone=us\nport=1");
        assert_eq!(g.map_keys("labels"), vec!["REGION", "zone"]);
    }

    #[test]
    fn parse_rejects_lines_without_equals() {
        let err = Group::parse("T", "port=80\noops\n").unwrap_err();
        assert!(matches!(err, EnvflagError::InvalidLine { line: 2, .. }));
    }
}
