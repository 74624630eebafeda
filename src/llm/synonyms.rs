

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::generation::TextGenerationService;
use crate::utils::strip_code_fences;

#[derive(Debug, Deserialize)]
struct SynonymPayload {
    synonyms: Vec<String>,
}

/// Parses `{"synonyms": [...]}`. Anything else yields `None`.
pub fn parse_synonyms(raw: &str) -> Option<Vec<String>> {
    let payload: SynonymPayload = serde_json::from_str(strip_code_fences(raw)).ok()?;
    Some(
        payload
            .synonyms
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// Synonym fallback used when the controlled vocabulary comes back thin.
///
/// Never fails: a transport error, timeout or malformed reply degrades to an
/// empty list and a warning.
pub struct SynonymGenerator {
    generator: Arc<dyn TextGenerationService>,
    call_timeout: Option<Duration>,
}

impl SynonymGenerator {

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


    pub async fn generate(&self, phrase: &str) -> Vec<String> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Vec::new();
        }

        let call = self.generator.synonyms(phrase);
        let result = match self.call_timeout {
            Some(t) => match tokio::time::timeout(t, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Synonym generation for '{}' timed out after {}s", phrase, t.as_secs());
                    return Vec::new();
                }
            },
            None => call.await,
        };

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Synonym generation for '{}' failed: {}", phrase, e);
                return Vec::new();
            }
        };

        match parse_synonyms(&raw) {
            Some(synonyms) => {
                debug!("Generated {} synonyms for '{}'", synonyms.len(), phrase);
                synonyms
            }
            None => {
                warn!("Discarding malformed synonym response for '{}'", phrase);
                Vec::new()
            }
        }
    }
}
