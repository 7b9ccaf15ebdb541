//! Crate-wide configuration knobs (spec.md SPEC_FULL §B "Config"). Plain
//! struct with a `Default`; there's no file format to parse here, unlike
//! the teacher's `.git/config`. A `WikiStore` owns one `WikiConfig`
//! (`WikiStore::with_config`, read back via `WikiStore::config`); `tree`,
//! `editor` and `apply` read `max_slug_len` off the store for slug
//! generation, and `merge` reads `normalize_line_endings` before a
//! three-way content merge.

/// Tunables for slug generation and content-merge normalization.
#[derive(Debug, Clone)]
pub struct WikiConfig {
    /// Maximum slug length; titles longer than this are truncated before
    /// hyphen-collapsing. `0` disables truncation.
    pub max_slug_len: usize,
    /// Whether CRLF/CR line endings are normalized to LF before a
    /// three-way content merge (spec.md §4.7).
    pub normalize_line_endings: bool,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self { max_slug_len: 0, normalize_line_endings: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WikiStore;
    use crate::tree;

    #[test]
    fn store_config_defaults_disable_slug_truncation() {
        let store = WikiStore::new();
        assert_eq!(store.config().max_slug_len, 0);
    }

    #[test]
    fn configured_slug_limit_truncates_new_space_root_slug() {
        let store = WikiStore::with_config(WikiConfig { max_slug_len: 4, ..Default::default() });
        let space = tree::create_space(&store, "Engineering Handbook", "eng").unwrap();
        let root = store.read(|inner| inner.documents.get(&space.root_group_id.unwrap()).unwrap().slug.clone());
        assert!(root.len() <= 4);
    }
}
