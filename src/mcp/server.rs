use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::PicosConfig;
use crate::core::error::PicosError;
use crate::pipeline::{CategoryPhrases, PipelineState, QueryPipeline, TermSet};
use crate::search::BibliographicRecord;
use crate::vocabulary::MatchMode;
use crate::safe_truncate_ellipsis;


#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct BuildSearchQueryParams {
    #[schemars(description = "Free-text research topic, e.g. 'effect of early mobilization on ICU delirium'")]
    pub topic: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchLiteratureParams {
    #[schemars(description = "Boolean search expression, usually the output of build_search_query")]
    pub expression: String,
    #[schemars(description = "Max records to return (default: configured PubMed limit)")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct LookupMeshParams {
    #[schemars(description = "Phrase to resolve against MeSH descriptors")]
    pub phrase: String,
    #[schemars(description = "Match mode: 'exact', 'contains' (default), 'startswith'")]
    pub match_mode: Option<String>,
    #[schemars(description = "Max descriptors (default: configured MeSH limit)")]
    pub limit: Option<usize>,
}


#[derive(Debug, Serialize)]
pub struct QueryBuildResult {
    pub run_id: String,
    pub topic: String,
    pub picos: CategoryPhrases,
    pub terms: TermSet,
    pub expression: String,
}

impl QueryBuildResult {
    fn from_state(state: &PipelineState) -> Self {
        Self {
            run_id: state.run_id.to_string(),
            topic: state.topic.clone(),
            picos: state.phrases().cloned().unwrap_or_default(),
            terms: state.terms().cloned().unwrap_or_default(),
            expression: state.expression().unwrap_or_default().to_string(),
        }
    }
}


#[derive(Clone)]
pub struct PicosMcpServer {
    pipeline: Arc<QueryPipeline>,
    config: Arc<PicosConfig>,
    tool_router: ToolRouter<Self>,
}

impl PicosMcpServer {

    pub fn new(pipeline: QueryPipeline, config: PicosConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }


    fn convert_error(err: PicosError) -> McpError {
        match err {
            PicosError::ExtractionFailed(_)
            | PicosError::SynthesisEmpty
            | PicosError::StageOutOfOrder { .. }
            | PicosError::Config(_) => McpError::invalid_params(err.to_string(), None),
            other => McpError::internal_error(other.to_string(), None),
        }
    }


    fn parse_match_mode(value: Option<&str>, default: MatchMode) -> Result<MatchMode, McpError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(default),
            Some(v) => MatchMode::from_str(v).map_err(|_| {
                McpError::invalid_params(
                    format!("Unknown match_mode '{v}'. Expected exact, contains or startswith"),
                    None,
                )
            }),
        }
    }


    fn result_to_json<T: Serialize>(result: T) -> Result<String, McpError> {
        serde_json::to_string_pretty(&result)
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    /// Public settings only; API keys never leave the process.
    fn config_summary(config: &PicosConfig) -> Value {
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "llm": {
                "provider": config.llm_provider,
                "model": config.llm_model,
                "fallback_enabled": config.llm_fallback_enabled,
            },
            "mesh": {
                "base_url": config.mesh_base_url,
                "match_mode": config.mesh_match_mode.as_str(),
                "year": config.mesh_year,
                "limit": config.mesh_limit,
            },
            "aggregation": {
                "synonym_threshold": config.synonym_threshold,
                "max_parallel_lookups": config.max_parallel_lookups,
                "strict_vocabulary": config.strict_vocabulary,
            },
            "pubmed": {
                "base_url": config.pubmed_base_url,
                "max_results": config.pubmed_max_results,
                "search_field": config.search_field,
                "api_key_configured": config.pubmed_api_key.is_some(),
            },
            "timeout_secs": config.timeout,
            "tools": ["build_search_query", "search_literature", "lookup_mesh"],
        })
    }
}


#[tool_router]
impl PicosMcpServer {
    #[tool(description = "Turn a free-text research topic into a PubMed boolean query. Extracts PICOS elements, resolves each phrase against MeSH (with LLM synonyms when coverage is thin) and joins them as (P: ...) AND (I: ...). Returns: {run_id, topic, picos, terms, expression}")]
    async fn build_search_query(
        &self,
        Parameters(params): Parameters<BuildSearchQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("🧩 Building query for topic: {}", safe_truncate_ellipsis(&params.topic, 60));

        let mut state = PipelineState::new(params.topic);
        self.pipeline
            .extract(&mut state)
            .await
            .map_err(Self::convert_error)?;
        self.pipeline
            .resolve(&mut state)
            .await
            .map_err(Self::convert_error)?;
        self.pipeline
            .synthesize(&mut state)
            .await
            .map_err(Self::convert_error)?;

        info!("✅ Query built (run={})", state.run_id);

        let json = Self::result_to_json(QueryBuildResult::from_state(&state))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Run a boolean expression against PubMed. Returns: [{pmid, title, authors, year, journal}]; an empty list means no matches")]
    async fn search_literature(
        &self,
        Parameters(params): Parameters<SearchLiteratureParams>,
    ) -> Result<CallToolResult, McpError> {
        let expression = params.expression.trim();
        if expression.is_empty() {
            return Err(McpError::invalid_params("expression must not be empty", None));
        }

        let max_results = params
            .max_results
            .unwrap_or(self.pipeline.default_max_results());
        info!(
            "🔍 Searching PubMed (max={}): {}",
            max_results,
            safe_truncate_ellipsis(expression, 60)
        );

        let records: Vec<BibliographicRecord> = self
            .pipeline
            .executor()
            .search(expression, max_results)
            .await
            .map_err(|e| Self::convert_error(e.into()))?;

        info!("✅ Found {} records", records.len());
        let json = Self::result_to_json(&records)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Look up MeSH descriptor labels for a phrase. Match modes: 'exact', 'contains', 'startswith'. Returns: [label, ...]")]
    async fn lookup_mesh(
        &self,
        Parameters(params): Parameters<LookupMeshParams>,
    ) -> Result<CallToolResult, McpError> {
        let match_mode =
            Self::parse_match_mode(params.match_mode.as_deref(), self.config.mesh_match_mode)?;
        let limit = params.limit.unwrap_or(self.config.mesh_limit);

        let labels = self
            .pipeline
            .resolver()
            .resolve(&params.phrase, match_mode, limit)
            .await
            .map_err(|e| Self::convert_error(e.into()))?;

        if labels.is_empty() {
            warn!("⚠️ No MeSH descriptors for '{}'", params.phrase);
        }

        let json = Self::result_to_json(&labels)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}


#[tool_handler]
impl ServerHandler for PicosMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "picos-search".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "PICOS literature search. Use build_search_query to turn a research topic into a \
                 PubMed boolean expression, search_literature to run it, and lookup_mesh to inspect \
                 MeSH coverage of a single phrase."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![
                RawResource::new("config://picos", "picos-config".to_string()).no_annotation(),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match uri.as_str() {
            "config://picos" => {
                let content = Self::result_to_json(Self::config_summary(&self.config))?;
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(content, uri)],
                })
            }
            _ => Err(McpError::resource_not_found(
                format!("Unknown resource: {}", uri),
                Some(json!({ "uri": uri })),
            )),
        }
    }
}


pub async fn run_server() -> anyhow::Result<()> {
    info!("🚀 Initializing PICOS MCP Server...");

    let config = PicosConfig::from_env()?;
    let pipeline = QueryPipeline::from_config(&config)?;

    info!("✅ PICOS MCP Server ready");
    info!("   🤖 LLM: {}/{}", config.llm_provider, config.llm_model);
    info!("   📚 MeSH: {}", config.mesh_base_url);
    info!("   🔎 PubMed: {}", config.pubmed_base_url);

    let server = PicosMcpServer::new(pipeline, config);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
