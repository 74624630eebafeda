

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use super::models::CategoryPhrases;
use super::terms::{TermSet, Terms};
use crate::core::config::PicosConfig;
use crate::core::error::{PicosError, Result};
use crate::llm::SynonymGenerator;
use crate::vocabulary::{MatchMode, VocabularyResolver};
use crate::{DEFAULT_FALLBACK_THRESHOLD, DEFAULT_MAX_PARALLEL};

/// Merges vocabulary terms with generated synonyms for one phrase.
///
/// Synonyms are requested only when fewer than `threshold` distinct vocabulary
/// terms came back. The result is never empty: the phrase itself is the last resort.
pub async fn aggregate(
    phrase: &str,
    vocab_terms: Vec<String>,
    threshold: usize,
    synonyms: &SynonymGenerator,
) -> Terms {
    let mut terms: Terms = vocab_terms.into_iter().collect();
    if terms.len() < threshold {
        let added = terms.extend(synonyms.generate(phrase).await);
        debug!(
            "'{}' had {} vocabulary terms, added {} synonyms",
            phrase,
            terms.len() - added,
            added
        );
    }

    if terms.is_empty() {
        terms.insert(phrase);
    }
    terms
}


#[derive(Debug, Clone, Copy)]
pub struct AggregationOptions {
    pub match_mode: MatchMode,
    pub limit: usize,
    pub threshold: usize,
    pub max_parallel: usize,
    /// Surface the first vocabulary error instead of falling back to synonyms.
    pub strict: bool,
}

impl AggregationOptions {

    pub fn from_config(config: &PicosConfig) -> Self {
        Self {
            match_mode: config.mesh_match_mode,
            limit: config.mesh_limit,
            threshold: config.synonym_threshold,
            max_parallel: config.max_parallel_lookups,
            strict: config.strict_vocabulary,
        }
    }
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::Contains,
            limit: 10,
            threshold: DEFAULT_FALLBACK_THRESHOLD,
            max_parallel: DEFAULT_MAX_PARALLEL,
            strict: false,
        }
    }
}


pub struct TermAggregator {
    resolver: Arc<VocabularyResolver>,
    synonyms: Arc<SynonymGenerator>,
    options: AggregationOptions,
}

impl TermAggregator {

    pub fn new(
        resolver: Arc<VocabularyResolver>,
        synonyms: Arc<SynonymGenerator>,
        options: AggregationOptions,
    ) -> Self {
        Self {
            resolver,
            synonyms,
            options,
        }
    }


    pub fn resolver(&self) -> &VocabularyResolver {
        &self.resolver
    }

    /// Resolves and aggregates every distinct phrase, at most `max_parallel` at a time.
    pub async fn aggregate_all(&self, phrases: &CategoryPhrases) -> Result<TermSet> {
        let distinct = phrases.distinct_phrases();
        info!(
            "Resolving {} phrases (parallel={}, threshold={})",
            distinct.len(),
            self.options.max_parallel,
            self.options.threshold
        );

        let term_set = stream::iter(distinct)
            .map(|phrase| self.aggregate_phrase(phrase))
            .buffer_unordered(self.options.max_parallel.max(1))
            .try_fold(TermSet::new(), |mut set, (phrase, terms)| async move {
                set.insert(phrase, terms);
                Ok(set)
            })
            .await?;

        info!(
            "Aggregated {} terms across {} phrases",
            term_set.total_terms(),
            term_set.len()
        );
        Ok(term_set)
    }

    async fn aggregate_phrase(&self, phrase: String) -> Result<(String, Terms)> {
        let vocab = match self
            .resolver
            .resolve(&phrase, self.options.match_mode, self.options.limit)
            .await
        {
            Ok(labels) => labels,
            Err(e) if self.options.strict => return Err(PicosError::VocabularyService(e)),
            Err(e) => {
                warn!("Vocabulary lookup for '{}' failed, using synonyms: {}", phrase, e);
                Vec::new()
            }
        };

        let terms = aggregate(&phrase, vocab, self.options.threshold, &self.synonyms).await;
        Ok((phrase, terms))
    }
}
