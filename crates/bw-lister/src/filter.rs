//! Key filtering applied while listing.

use serde::{Deserialize, Serialize};

/// Decides which listed keys belong in a snapshot.
///
/// Directory markers (keys ending in `/`) and empty keys are always
/// dropped. An empty suffix list accepts every remaining key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFilter {
    /// Accept only keys ending with one of these suffixes.
    #[serde(default)]
    pub include_suffixes: Vec<String>,
    /// Reject keys starting with any of these prefixes.
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
}

impl KeyFilter {
    /// A filter that keeps every object key.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only keys with one of `suffixes`.
    pub fn suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include_suffixes: suffixes.into_iter().map(Into::into).collect(),
            exclude_prefixes: Vec::new(),
        }
    }

    /// Additionally reject keys under `prefix`.
    pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    pub fn accepts(&self, key: &str) -> bool {
        if key.is_empty() || key.ends_with('/') {
            return false;
        }
        if self.exclude_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return false;
        }
        self.include_suffixes.is_empty()
            || self.include_suffixes.iter().any(|s| key.ends_with(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_directory_markers_and_empty_keys() {
        let filter = KeyFilter::all();
        assert!(!filter.accepts(""));
        assert!(!filter.accepts("scans/"));
        assert!(filter.accepts("scans/a.pdf"));
    }

    #[test]
    fn suffix_allow_list() {
        let filter = KeyFilter::suffixes([".pdf"]);
        assert!(filter.accepts("a.pdf"));
        assert!(!filter.accepts("a.txt"));
        assert!(!filter.accepts("pdf"));
    }

    #[test]
    fn exclude_prefix_wins_over_suffix() {
        let filter = KeyFilter::suffixes([".pdf"]).exclude("tmp/");
        assert!(!filter.accepts("tmp/a.pdf"));
        assert!(filter.accepts("done/a.pdf"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let filter: KeyFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, KeyFilter::all());
    }
}
