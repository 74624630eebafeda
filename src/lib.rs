pub mod core;
pub mod llm;
pub mod mcp;
pub mod pipeline;
pub mod search;
pub mod utils;
pub mod vocabulary;

pub use utils::{safe_truncate, safe_truncate_ellipsis};


pub use core::config::PicosConfig;
pub use core::error::{PicosError, Result};
pub use llm::{LlmTextGenerator, PicosExtractor, SynonymGenerator, TextGenerationService};
pub use pipeline::{
    CategoryPhrases, PicosCategory, PipelineStage, PipelineState, QueryPipeline, TermSet, Terms,
};
pub use search::{BibliographicRecord, PubMedClient, SearchExecutor};
pub use vocabulary::{MatchMode, MeshClient, VocabularyResolver};


pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";


pub const DEFAULT_LLM_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";


pub const DEFAULT_LLM_MODEL: &str = "qwen-plus";


pub const DEFAULT_MESH_URL: &str = "https://id.nlm.nih.gov/mesh";


pub const DEFAULT_PUBMED_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Fewer vocabulary terms than this triggers the synonym fallback.
pub const DEFAULT_FALLBACK_THRESHOLD: usize = 5;


pub const DEFAULT_MAX_PARALLEL: usize = 4;
