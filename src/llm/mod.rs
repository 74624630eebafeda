

pub mod extractor;
pub mod factory;
pub mod generation;
pub mod prompts;
pub mod providers;
pub mod synonyms;

pub use extractor::{ExtractionResponse, PicosExtractor};
pub use factory::LlmProviderFactory;
pub use generation::{LlmTextGenerator, TextGenerationService};
pub use providers::{LlmMetadata, LlmProvider, LlmProviderError};
pub use synonyms::SynonymGenerator;
