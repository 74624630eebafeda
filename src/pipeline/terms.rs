

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::utils::normalize_whitespace;

/// Comparison key shared by phrases and terms: whitespace-normalized, Unicode lowercase.
pub(crate) fn case_key(text: &str) -> String {
    normalize_whitespace(text).to_lowercase()
}

/// Case-insensitive term set. Keeps the casing of the first occurrence and insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Terms {
    items: Vec<String>,
    #[serde(skip)]
    keys: HashSet<String>,
}

impl Terms {

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }


    pub fn insert(&mut self, term: impl AsRef<str>) -> bool {
        let term = normalize_whitespace(term.as_ref());
        if term.is_empty() {
            return false;
        }

        if !self.keys.insert(case_key(&term)) {
            return false;
        }
        self.items.push(term);
        true
    }


    pub fn extend<I, S>(&mut self, terms: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        terms.into_iter().filter(|t| self.insert(t)).count()
    }


    #[must_use]
    pub fn contains(&self, term: &str) -> bool {
        self.keys.contains(&case_key(term))
    }


    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }


    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.items
    }


    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }


    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartialEq for Terms {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for Terms {}

impl<S: AsRef<str>> FromIterator<S> for Terms {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut terms = Self::new();
        terms.extend(iter);
        terms
    }
}

impl From<Vec<String>> for Terms {
    fn from(items: Vec<String>) -> Self {
        items.into_iter().collect()
    }
}

impl From<Terms> for Vec<String> {
    fn from(terms: Terms) -> Self {
        terms.items
    }
}

/// Aggregated terms per phrase. Only grows: there is no removal API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermSet {
    by_phrase: BTreeMap<String, Terms>,
}

impl TermSet {

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `terms` into the entry for `phrase`.
    pub fn insert(&mut self, phrase: impl Into<String>, terms: Terms) {
        let entry = self.by_phrase.entry(phrase.into()).or_default();
        entry.extend(terms.iter());
    }


    pub fn merge(&mut self, other: TermSet) {
        for (phrase, terms) in other.by_phrase {
            self.insert(phrase, terms);
        }
    }


    #[must_use]
    pub fn get(&self, phrase: &str) -> Option<&Terms> {
        self.by_phrase.get(phrase)
    }


    pub fn iter(&self) -> impl Iterator<Item = (&str, &Terms)> {
        self.by_phrase.iter().map(|(p, t)| (p.as_str(), t))
    }


    #[must_use]
    pub fn len(&self) -> usize {
        self.by_phrase.len()
    }


    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_phrase.is_empty()
    }


    #[must_use]
    pub fn total_terms(&self) -> usize {
        self.by_phrase.values().map(Terms::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_casing() {
        let terms: Terms = ["Diabetes", "diabetes", "DIABETES", "Diabetes Mellitus"]
            .into_iter()
            .collect();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms.as_slice()[0], "Diabetes");
        assert!(terms.contains("diabetes mellitus"));
    }

    #[test]
    fn test_blank_terms_are_ignored() {
        let mut terms = Terms::new();
        assert!(!terms.insert("   "));
        assert!(terms.is_empty());
    }

    #[test]
    fn test_set_equality_ignores_order_and_case() {
        let a: Terms = ["Delirium", "Confusion"].into_iter().collect();
        let b: Terms = ["confusion", "delirium"].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut first = TermSet::new();
        first.insert("ICU patients", ["Critical Care"].into_iter().collect());
        let mut second = TermSet::new();
        second.insert("delirium", ["Delirium", "Acute Confusion"].into_iter().collect());
        second.insert("ICU patients", ["Intensive Care Units", "critical care"].into_iter().collect());

        let mut ab = TermSet::new();
        ab.merge(first.clone());
        ab.merge(second.clone());

        let mut ba = TermSet::new();
        ba.merge(second);
        ba.merge(first);

        assert_eq!(ab, ba);
        assert_eq!(ab.get("ICU patients").unwrap().len(), 2);
        assert_eq!(ab.total_terms(), 4);
    }

    #[test]
    fn test_merge_only_grows() {
        let mut set = TermSet::new();
        set.insert("delirium", ["Delirium", "Confusion"].into_iter().collect());
        set.insert("delirium", Terms::new());
        assert_eq!(set.get("delirium").unwrap().len(), 2);
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_keys() {
        let terms: Terms = ["Delirium", "Confusion"].into_iter().collect();
        let json = serde_json::to_string(&terms).unwrap();
        assert_eq!(json, r#"["Delirium","Confusion"]"#);

        let restored: Terms = serde_json::from_str(&json).unwrap();
        assert!(restored.contains("delirium"));
        assert!(restored.contains("CONFUSION"));
        assert_eq!(restored, terms);
    }
}
