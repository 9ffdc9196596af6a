//! Story flags: the string keyed boolean switches that gate content.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StoryFlags {
    flags: BTreeMap<String, bool>,
}

impl StoryFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that was never written reads as unset.
    #[must_use]
    pub fn is_set(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn all_set<S: AsRef<str>>(&self, flags: &[S]) -> bool {
        flags.iter().all(|flag| self.is_set(flag.as_ref()))
    }

    /// First flag in `flags` that is not set.
    #[must_use]
    pub fn first_missing<'a, S: AsRef<str>>(&self, flags: &'a [S]) -> Option<&'a str> {
        flags
            .iter()
            .map(AsRef::as_ref)
            .find(|flag| !self.is_set(flag))
    }

    pub fn set(&mut self, flag: impl Into<String>) {
        self.flags.insert(flag.into(), true);
    }

    pub fn clear(&mut self, flag: impl Into<String>) {
        self.flags.insert(flag.into(), false);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(key, value)| (key.as_str(), *value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StoryFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.set(flag);
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_flag_reads_unset_but_is_kept() {
        let mut flags = StoryFlags::new();
        flags.set("met_elder");
        flags.clear("met_elder");
        assert!(!flags.is_set("met_elder"));
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn first_missing_reports_in_order() {
        let flags: StoryFlags = ["a", "c"].into_iter().collect();
        assert_eq!(flags.first_missing(&["a", "b", "c", "d"]), Some("b"));
        assert!(flags.all_set(&["a", "c"]));
    }
}
