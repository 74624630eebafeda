

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use super::terms::case_key;
use crate::utils::normalize_whitespace;


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
pub enum PicosCategory {
    #[serde(rename = "P")]
    Population,
    #[serde(rename = "I")]
    Intervention,
    #[serde(rename = "C")]
    Comparator,
    #[serde(rename = "O")]
    Outcome,
    #[serde(rename = "S")]
    StudyDesign,
}

impl PicosCategory {

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Population => "P",
            Self::Intervention => "I",
            Self::Comparator => "C",
            Self::Outcome => "O",
            Self::StudyDesign => "S",
        }
    }


    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Population => "Population",
            Self::Intervention => "Intervention",
            Self::Comparator => "Comparator",
            Self::Outcome => "Outcome",
            Self::StudyDesign => "Study design",
        }
    }

    /// Accepts single-letter tags and the usual long-form names, case-insensitively.
    #[must_use]
    pub fn from_label(s: &str) -> Option<Self> {
        let key = s
            .trim()
            .trim_matches(|c: char| c == '*' || c == '"' || c == '\'')
            .to_lowercase()
            .replace(['_', '-'], " ");

        match key.as_str() {
            "p" | "population" | "participants" | "patients" | "patient" | "problem" => {
                Some(Self::Population)
            }
            "i" | "intervention" | "interventions" | "exposure" => Some(Self::Intervention),
            "c" | "comparator" | "comparison" | "comparators" | "control" => Some(Self::Comparator),
            "o" | "outcome" | "outcomes" => Some(Self::Outcome),
            "s" | "study design" | "study" | "design" | "studydesign" | "study type" => {
                Some(Self::StudyDesign)
            }
            _ => None,
        }
    }


    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

impl fmt::Display for PicosCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Phrases per PICOS category. A category is either absent or holds at least one phrase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<PicosCategory, Vec<String>>",
    into = "BTreeMap<PicosCategory, Vec<String>>"
)]
pub struct CategoryPhrases {
    inner: BTreeMap<PicosCategory, Vec<String>>,
}

impl CategoryPhrases {

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds phrases to a category, skipping blanks and case-insensitive duplicates.
    /// Returns the number of phrases actually added.
    pub fn insert<I, S>(&mut self, category: PicosCategory, phrases: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for phrase in phrases {
            let phrase = normalize_whitespace(phrase.as_ref());
            if phrase.is_empty() {
                continue;
            }

            let key = case_key(&phrase);
            let entry = self.inner.entry(category).or_default();
            if entry.iter().any(|p| case_key(p) == key) {
                continue;
            }
            entry.push(phrase);
            added += 1;
        }

        if self.inner.get(&category).is_some_and(Vec::is_empty) {
            self.inner.remove(&category);
        }

        added
    }


    #[must_use]
    pub fn get(&self, category: PicosCategory) -> Option<&[String]> {
        self.inner.get(&category).map(Vec::as_slice)
    }


    pub fn iter(&self) -> impl Iterator<Item = (PicosCategory, &[String])> {
        self.inner.iter().map(|(c, p)| (*c, p.as_slice()))
    }


    pub fn categories(&self) -> impl Iterator<Item = PicosCategory> + '_ {
        self.inner.keys().copied()
    }


    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }


    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Every phrase once, in category order then extraction order.
    #[must_use]
    pub fn distinct_phrases(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.inner
            .values()
            .flatten()
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }
}

impl From<BTreeMap<PicosCategory, Vec<String>>> for CategoryPhrases {
    fn from(map: BTreeMap<PicosCategory, Vec<String>>) -> Self {
        let mut phrases = Self::new();
        for (category, values) in map {
            phrases.insert(category, values);
        }
        phrases
    }
}

impl From<CategoryPhrases> for BTreeMap<PicosCategory, Vec<String>> {
    fn from(phrases: CategoryPhrases) -> Self {
        phrases.inner
    }
}
