

use std::sync::Arc;

use tracing::info;

use super::aggregator::{AggregationOptions, TermAggregator};
use super::state::{PipelineStage, PipelineState};
use super::synthesizer::synthesize;
use crate::core::config::PicosConfig;
use crate::core::error::{PicosError, Result};
use crate::llm::{LlmProviderFactory, LlmTextGenerator, PicosExtractor, SynonymGenerator, TextGenerationService};
use crate::search::{PubMedClient, SearchExecutor};
use crate::vocabulary::{MeshClient, VocabularyResolver};
use crate::safe_truncate_ellipsis;

/// Stage orchestrator. Holds the injected services only; every piece of
/// per-run data lives in the [`PipelineState`] the caller passes in.
///
/// A stage that fails leaves the state untouched, so the caller can retry it.
pub struct QueryPipeline {
    extractor: PicosExtractor,
    aggregator: TermAggregator,
    executor: SearchExecutor,
    default_max_results: usize,
}

impl QueryPipeline {

    pub fn new(
        extractor: PicosExtractor,
        aggregator: TermAggregator,
        executor: SearchExecutor,
        default_max_results: usize,
    ) -> Self {
        Self {
            extractor,
            aggregator,
            executor,
            default_max_results,
        }
    }

    /// Wires the LLM provider, MeSH client and PubMed client from configuration.
    pub fn from_config(config: &PicosConfig) -> Result<Self> {
        let call_timeout = config.call_timeout();

        let provider = LlmProviderFactory::from_config(config)?;
        let generator: Arc<dyn TextGenerationService> = Arc::new(LlmTextGenerator::new(provider));

        let mesh = MeshClient::from_config(config)
            .map_err(|e| PicosError::Config(format!("Failed to initialize MeSH client: {e}")))?;
        let pubmed = PubMedClient::from_config(config)
            .map_err(|e| PicosError::Config(format!("Failed to initialize PubMed client: {e}")))?;

        let aggregator = TermAggregator::new(
            Arc::new(VocabularyResolver::new(Arc::new(mesh)).with_timeout(call_timeout)),
            Arc::new(SynonymGenerator::new(generator.clone()).with_timeout(call_timeout)),
            AggregationOptions::from_config(config),
        );

        info!(
            "Query pipeline ready (llm={}/{}, match={}, threshold={})",
            config.llm_provider,
            config.llm_model,
            config.mesh_match_mode.as_str(),
            config.synonym_threshold
        );

        Ok(Self::new(
            PicosExtractor::new(generator).with_timeout(call_timeout),
            aggregator,
            SearchExecutor::new(Arc::new(pubmed)).with_timeout(call_timeout),
            config.pubmed_max_results,
        ))
    }


    pub fn resolver(&self) -> &VocabularyResolver {
        self.aggregator.resolver()
    }


    pub fn executor(&self) -> &SearchExecutor {
        &self.executor
    }


    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    /// Runs from any stage and discards whatever the state derived earlier.
    pub async fn extract(&self, state: &mut PipelineState) -> Result<()> {
        let phrases = self.extractor.extract(&state.topic).await?;
        state.record_extraction(phrases);
        Ok(())
    }


    pub async fn resolve(&self, state: &mut PipelineState) -> Result<()> {
        state.require("resolve", PipelineStage::Extracted)?;

        let phrases = state.phrases().cloned().unwrap_or_default();
        let terms = self.aggregator.aggregate_all(&phrases).await?;
        state.record_resolution(terms)
    }


    pub async fn synthesize(&self, state: &mut PipelineState) -> Result<String> {
        state.require("synthesize", PipelineStage::Resolved)?;

        let expression = match (state.phrases(), state.terms()) {
            (Some(phrases), Some(terms)) => synthesize(phrases, terms),
            _ => String::new(),
        };
        if expression.is_empty() {
            return Err(PicosError::SynthesisEmpty);
        }

        info!("Synthesized expression: {}", safe_truncate_ellipsis(&expression, 120));
        state.record_synthesis(expression.clone())?;
        Ok(expression)
    }

    /// `max_results` defaults to the configured PubMed limit.
    pub async fn search(&self, state: &mut PipelineState, max_results: Option<usize>) -> Result<usize> {
        state.require("search", PipelineStage::Synthesized)?;

        let expression = state.expression().unwrap_or_default().to_string();
        if expression.is_empty() {
            return Err(PicosError::SynthesisEmpty);
        }

        let records = self
            .executor
            .search(&expression, max_results.unwrap_or(self.default_max_results))
            .await?;
        let count = records.len();
        state.record_search(records)?;
        Ok(count)
    }

    /// Drives `state` through every stage it has not reached yet.
    ///
    /// On error the state keeps everything completed so far, so the caller can
    /// persist it and resume later with the same call.
    pub async fn run(&self, state: &mut PipelineState) -> Result<usize> {
        info!(
            "Run {} for topic '{}' starting at stage {}",
            state.run_id,
            safe_truncate_ellipsis(&state.topic, 60),
            state.stage()
        );

        if state.stage() == PipelineStage::NotStarted {
            self.extract(state).await?;
        }
        if state.stage() == PipelineStage::Extracted {
            self.resolve(state).await?;
        }
        if state.stage() == PipelineStage::Resolved {
            self.synthesize(state).await?;
        }
        if state.stage() == PipelineStage::Synthesized {
            self.search(state, None).await?;
        }

        let count = state.records().map_or(0, <[_]>::len);
        info!("Run {} finished with {} records", state.run_id, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::base::LlmProviderError;
    use crate::pipeline::models::PicosCategory;
    use crate::search::{BibliographicRecord, LiteratureDatabase, SearchError};
    use crate::vocabulary::{MatchMode, VocabularyError, VocabularyLookup};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCENARIO_TOPIC: &str = "effect of early mobilization on ICU delirium";

    struct ScenarioLlm {
        picos: &'static str,
        synonym_requests: Mutex<Vec<String>>,
        picos_calls: AtomicUsize,
    }

    impl ScenarioLlm {
        fn new(picos: &'static str) -> Self {
            Self {
                picos,
                synonym_requests: Mutex::new(Vec::new()),
                picos_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerationService for ScenarioLlm {
        async fn picos_breakdown(&self, _topic: &str) -> std::result::Result<String, LlmProviderError> {
            self.picos_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.picos.to_string())
        }

        async fn synonyms(&self, phrase: &str) -> std::result::Result<String, LlmProviderError> {
            self.synonym_requests.lock().unwrap().push(phrase.to_string());
            let reply = match phrase {
                "ICU patients" => {
                    r#"{"synonyms": ["critically ill patients", "intensive care unit patients"]}"#
                }
                _ => r#"{"synonyms": []}"#,
            };
            Ok(reply.to_string())
        }
    }

    struct ScenarioMesh(HashMap<&'static str, Vec<&'static str>>);

    impl ScenarioMesh {
        fn new() -> Self {
            Self(HashMap::from([
                (
                    "early mobilization",
                    vec![
                        "Early Ambulation",
                        "Exercise Therapy",
                        "Mobility Limitation",
                        "Physical Therapy Modalities",
                        "Rehabilitation",
                    ],
                ),
                (
                    "delirium",
                    vec![
                        "Delirium",
                        "Emergence Delirium",
                        "Confusion",
                        "Alcohol Withdrawal Delirium",
                        "Postoperative Delirium",
                    ],
                ),
            ]))
        }
    }

    #[async_trait]
    impl VocabularyLookup for ScenarioMesh {
        async fn lookup(
            &self,
            phrase: &str,
            _match_mode: MatchMode,
            limit: usize,
        ) -> std::result::Result<Vec<String>, VocabularyError> {
            Ok(self
                .0
                .get(phrase)
                .map(|labels| labels.iter().take(limit).map(|s| s.to_string()).collect())
                .unwrap_or_default())
        }

        fn service_name(&self) -> &str {
            "scenario-mesh"
        }
    }

    #[derive(Default)]
    struct EmptyPubMed {
        expressions: Mutex<Vec<String>>,
        fetches: AtomicUsize,
        unavailable: bool,
    }

    #[async_trait]
    impl LiteratureDatabase for EmptyPubMed {
        async fn search_ids(
            &self,
            expression: &str,
            _max_results: usize,
        ) -> std::result::Result<Vec<String>, SearchError> {
            self.expressions.lock().unwrap().push(expression.to_string());
            if self.unavailable {
                return Err(SearchError::Timeout(1));
            }
            Ok(Vec::new())
        }

        async fn fetch_records(
            &self,
            _ids: &[String],
        ) -> std::result::Result<Vec<BibliographicRecord>, SearchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn database_name(&self) -> &str {
            "empty"
        }
    }

    struct Harness {
        pipeline: QueryPipeline,
        llm: Arc<ScenarioLlm>,
        pubmed: Arc<EmptyPubMed>,
    }

    fn harness(picos: &'static str) -> Harness {
        harness_with(picos, EmptyPubMed::default())
    }

    fn harness_with(picos: &'static str, pubmed: EmptyPubMed) -> Harness {
        let llm = Arc::new(ScenarioLlm::new(picos));
        let pubmed = Arc::new(pubmed);

        let aggregator = TermAggregator::new(
            Arc::new(VocabularyResolver::new(Arc::new(ScenarioMesh::new()))),
            Arc::new(SynonymGenerator::new(llm.clone())),
            AggregationOptions::default(),
        );
        let pipeline = QueryPipeline::new(
            PicosExtractor::new(llm.clone()),
            aggregator,
            SearchExecutor::new(pubmed.clone()),
            10,
        );

        Harness {
            pipeline,
            llm,
            pubmed,
        }
    }

    const SCENARIO_PICOS: &str = r#"{"P": ["ICU patients"], "I": ["early mobilization"], "C": [], "O": ["delirium"], "S": []}"#;

    #[tokio::test]
    async fn test_icu_delirium_scenario() {
        let h = harness(SCENARIO_PICOS);
        let mut state = PipelineState::new(SCENARIO_TOPIC);
        assert_eq!(h.pipeline.run(&mut state).await.unwrap(), 0);

        let phrases = state.phrases().unwrap();
        assert_eq!(
            phrases.categories().collect::<Vec<_>>(),
            vec![PicosCategory::Population, PicosCategory::Intervention, PicosCategory::Outcome]
        );

        assert_eq!(*h.llm.synonym_requests.lock().unwrap(), vec!["ICU patients".to_string()]);

        let expected = "(P: ICU patients OR critically ill patients OR intensive care unit patients) \
            AND (I: early mobilization OR Early Ambulation OR Exercise Therapy OR Mobility Limitation OR Physical Therapy Modalities OR Rehabilitation) \
            AND (O: delirium OR Emergence Delirium OR Confusion OR Alcohol Withdrawal Delirium OR Postoperative Delirium)";
        assert_eq!(state.expression(), Some(expected));
        assert_eq!(*h.pubmed.expressions.lock().unwrap(), vec![expected.to_string()]);

        assert_eq!(state.stage(), PipelineStage::Searched);
        assert!(state.records().is_some_and(|records| records.is_empty()));
        assert_eq!(h.pubmed.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_at_extracted_is_out_of_order() {
        let h = harness(SCENARIO_PICOS);
        let mut state = PipelineState::new(SCENARIO_TOPIC);
        h.pipeline.extract(&mut state).await.unwrap();

        let err = h.pipeline.search(&mut state, None).await.unwrap_err();
        assert!(matches!(
            err,
            PicosError::StageOutOfOrder {
                stage: "search",
                required: PipelineStage::Synthesized,
                actual: PipelineStage::Extracted,
            }
        ));
        assert_eq!(state.stage(), PipelineStage::Extracted);
        assert!(h.pubmed.expressions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_before_extract_is_out_of_order() {
        let h = harness(SCENARIO_PICOS);
        let mut state = PipelineState::new(SCENARIO_TOPIC);

        let err = h.pipeline.resolve(&mut state).await.unwrap_err();
        assert!(matches!(err, PicosError::StageOutOfOrder { actual: PipelineStage::NotStarted, .. }));
    }

    #[tokio::test]
    async fn test_stages_across_invocations_with_reextraction() {
        let h = harness(SCENARIO_PICOS);
        let mut state = PipelineState::new(SCENARIO_TOPIC);

        h.pipeline.extract(&mut state).await.unwrap();
        h.pipeline.resolve(&mut state).await.unwrap();
        let expression = h.pipeline.synthesize(&mut state).await.unwrap();
        assert!(expression.starts_with("(P: ICU patients"));

        h.pipeline.extract(&mut state).await.unwrap();
        assert_eq!(state.stage(), PipelineStage::Extracted);
        assert!(state.terms().is_none());
        assert!(state.expression().is_none());
        assert_eq!(h.llm.picos_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_state_unchanged() {
        let h = harness("no structure here at all");
        let mut state = PipelineState::new(SCENARIO_TOPIC);

        let err = h.pipeline.extract(&mut state).await.unwrap_err();
        assert!(matches!(err, PicosError::ExtractionFailed(_)));
        assert_eq!(state.stage(), PipelineStage::NotStarted);
        assert!(state.phrases().is_none());
    }

    #[tokio::test]
    async fn test_failed_search_keeps_earlier_stages_and_resumes() {
        let h = harness_with(
            SCENARIO_PICOS,
            EmptyPubMed {
                unavailable: true,
                ..EmptyPubMed::default()
            },
        );
        let mut state = PipelineState::new(SCENARIO_TOPIC);

        let err = h.pipeline.run(&mut state).await.unwrap_err();
        assert!(matches!(err, PicosError::SearchService(SearchError::Timeout(1))));
        assert_eq!(state.stage(), PipelineStage::Synthesized);
        assert!(state.phrases().is_some());
        assert!(state.terms().is_some());
        assert!(state.expression().is_some_and(|e| e.starts_with("(P: ICU patients")));
        assert!(state.records().is_none());

        let healthy = harness(SCENARIO_PICOS);
        assert_eq!(healthy.pipeline.run(&mut state).await.unwrap(), 0);
        assert_eq!(state.stage(), PipelineStage::Searched);
        assert_eq!(healthy.llm.picos_calls.load(Ordering::SeqCst), 0);
        assert!(healthy.llm.synonym_requests.lock().unwrap().is_empty());
    }
}
