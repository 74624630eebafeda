

pub mod mesh;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::debug;

pub use mesh::MeshClient;


#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lookup service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unparseable lookup payload: {0}")]
    Payload(String),

    #[error("Lookup timed out after {0}s")]
    Timeout(u64),
}


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MatchMode {
    Exact,
    #[default]
    Contains,
    #[strum(to_string = "startswith", serialize = "starts_with")]
    StartsWith,
}

impl MatchMode {

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Controlled-vocabulary lookup service. Zero matches is `Ok(vec![])`.
#[async_trait]
pub trait VocabularyLookup: Send + Sync {

    async fn lookup(
        &self,
        phrase: &str,
        match_mode: MatchMode,
        limit: usize,
    ) -> Result<Vec<String>, VocabularyError>;


    fn service_name(&self) -> &str;
}


pub struct VocabularyResolver {
    lookup: Arc<dyn VocabularyLookup>,
    call_timeout: Option<Duration>,
}

impl VocabularyResolver {

    pub fn new(lookup: Arc<dyn VocabularyLookup>) -> Self {
        Self {
            lookup,
            call_timeout: None,
        }
    }


    #[must_use]
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// Canonical descriptor labels for `phrase`, at most `limit` of them.
    pub async fn resolve(
        &self,
        phrase: &str,
        match_mode: MatchMode,
        limit: usize,
    ) -> Result<Vec<String>, VocabularyError> {
        let phrase = phrase.trim();
        if phrase.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let call = self.lookup.lookup(phrase, match_mode, limit);
        let labels = match self.call_timeout {
            Some(t) => tokio::time::timeout(t, call)
                .await
                .map_err(|_| VocabularyError::Timeout(t.as_secs()))??,
            None => call.await?,
        };

        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .take(limit)
            .collect();

        debug!(
            "{} resolved '{}' ({}) -> {} descriptors",
            self.lookup.service_name(),
            phrase,
            match_mode.as_str(),
            labels.len()
        );

        Ok(labels)
    }
}
