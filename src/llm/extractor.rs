//! PICOS extraction: topic text in, labeled phrase groups out.
//!
//! The generative service is asked for a JSON object, but replies are parsed
//! defensively. A reply is first classified as [`ExtractionResponse::Structured`]
//! (a JSON object, possibly wrapped in prose or code fences) or
//! [`ExtractionResponse::RawText`], which then goes through a deterministic
//! label-splitting parser.

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::generation::TextGenerationService;
use crate::core::error::{PicosError, Result};
use crate::pipeline::models::{CategoryPhrases, PicosCategory};
use crate::utils::strip_code_fences;
use crate::safe_truncate_ellipsis;

lazy_static! {
    static ref CATEGORY_LABEL: Option<Regex> = Regex::new(
        r"(?i)(?:^|[\n;|])[ \t]*(?:[-*•][ \t]*)?(?:\*\*)?[ \t]*(?P<label>population|participants|patients|intervention|interventions|exposure|comparator|comparison|control|outcomes?|study[ _-]?design|p|i|c|o|s)[ \t]*(?:\*\*)?[ \t]*(?:\([^)\n]*\))?[ \t]*(?:\*\*)?[ \t]*[:：]"
    )
    .ok();
}

const ITEM_SEPARATORS: &[char] = &[';', ',', '；', '，', '\n', '•'];

const PLACEHOLDERS: &[&str] = &[
    "none",
    "n/a",
    "na",
    "not specified",
    "not mentioned",
    "not applicable",
    "unspecified",
    "-",
];


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResponse {
    Structured(CategoryPhrases),
    RawText(String),
}

impl ExtractionResponse {

    pub fn classify(raw: &str) -> Self {
        let payload = strip_code_fences(raw);

        if let Some(Value::Object(map)) = parse_json_object(payload) {
            return Self::Structured(phrases_from_object(&map));
        }

        Self::RawText(payload.to_string())
    }


    pub fn into_phrases(self) -> CategoryPhrases {
        match self {
            Self::Structured(phrases) => phrases,
            Self::RawText(text) => parse_labeled_text(&text),
        }
    }
}

/// Whole payload first, then the outermost `{...}` span for JSON embedded in prose.
fn parse_json_object(payload: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(payload) {
        return Some(value);
    }

    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&payload[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn phrases_from_object(map: &Map<String, Value>) -> CategoryPhrases {
    let mut phrases = CategoryPhrases::new();
    let mut recognized = false;

    for (key, value) in map {
        let Some(category) = PicosCategory::from_label(key) else {
            debug!("Ignoring unrecognized extraction key '{}'", key);
            continue;
        };
        recognized = true;

        let mut items = Vec::new();
        collect_strings(value, &mut items);
        phrases.insert(category, items.iter().filter_map(|s| clean_item(s)));
    }

    // {"PICOS": {"P": [...], ...}}
    if !recognized && map.len() == 1 {
        if let Some(Value::Object(inner)) = map.values().next() {
            return phrases_from_object(inner);
        }
    }

    phrases
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Bool(_) | Value::Null => {}
    }
}

/// Splits free text on category labels, then each section on item separators.
pub fn parse_labeled_text(text: &str) -> CategoryPhrases {
    let Some(label_pattern) = CATEGORY_LABEL.as_ref() else {
        warn!("Category label pattern unavailable, raw text cannot be parsed");
        return CategoryPhrases::new();
    };

    let labels: Vec<(usize, usize, PicosCategory)> = label_pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let category = PicosCategory::from_label(caps.name("label")?.as_str())?;
            Some((whole.start(), whole.end(), category))
        })
        .collect();

    let mut phrases = CategoryPhrases::new();
    for (idx, (_, body_start, category)) in labels.iter().enumerate() {
        let body_end = labels.get(idx + 1).map_or(text.len(), |next| next.0);
        let section = &text[*body_start..body_end];

        phrases.insert(
            *category,
            section.split(ITEM_SEPARATORS).filter_map(clean_item),
        );
    }

    phrases
}

fn clean_item(item: &str) -> Option<String> {
    let cleaned = item
        .trim()
        .trim_start_matches(['-', '*', '•', ' '])
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim_end_matches(['.', ' '])
        .trim();

    if cleaned.is_empty() || PLACEHOLDERS.iter().any(|p| p.eq_ignore_ascii_case(cleaned)) {
        return None;
    }
    Some(cleaned.to_string())
}


pub struct PicosExtractor {
    generator: Arc<dyn TextGenerationService>,
    call_timeout: Option<Duration>,
}

impl PicosExtractor {

    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerationService>) -> Self {
        Self {
            generator,
            call_timeout: None,
        }
    }


    #[must_use]
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// Every call is a fresh generation; nothing is cached between calls.
    pub async fn extract(&self, topic: &str) -> Result<CategoryPhrases> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PicosError::ExtractionFailed("research topic is empty".to_string()));
        }
        info!("Extracting PICOS elements from topic: {}", safe_truncate_ellipsis(topic, 60));

        let call = self.generator.picos_breakdown(topic);
        let raw = match self.call_timeout {
            Some(t) => tokio::time::timeout(t, call).await.map_err(|_| {
                PicosError::ExtractionFailed(format!("generation timed out after {}s", t.as_secs()))
            })?,
            None => call.await,
        }
        .map_err(|e| PicosError::ExtractionFailed(e.to_string()))?;

        if raw.trim().is_empty() {
            return Err(PicosError::ExtractionFailed(
                "generative service returned no content".to_string(),
            ));
        }

        let response = ExtractionResponse::classify(&raw);
        if matches!(response, ExtractionResponse::RawText(_)) {
            warn!("PICOS response was not a JSON object, falling back to label parsing");
        }

        let phrases = response.into_phrases();
        if phrases.is_empty() {
            return Err(PicosError::ExtractionFailed(format!(
                "no PICOS category could be parsed from: {}",
                safe_truncate_ellipsis(&raw, 120)
            )));
        }

        info!(
            "Extracted {} PICOS categories ({} phrases)",
            phrases.len(),
            phrases.iter().map(|(_, p)| p.len()).sum::<usize>()
        );
        Ok(phrases)
    }
}
