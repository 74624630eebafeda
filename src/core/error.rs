

use thiserror::Error;

use crate::pipeline::PipelineStage;
use crate::search::SearchError;
use crate::vocabulary::VocabularyError;


#[derive(Error, Debug)]
pub enum PicosError {
    #[error("PICOS extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Vocabulary service error: {0}")]
    VocabularyService(#[from] VocabularyError),

    #[error("Search service error: {0}")]
    SearchService(#[from] SearchError),

    #[error("No search clauses could be built from the extracted topic; refine the research topic")]
    SynthesisEmpty,

    #[error("Stage '{stage}' requires the pipeline to be at '{required}', but it is at '{actual}'")]
    StageOutOfOrder {
        stage: &'static str,
        required: PipelineStage,
        actual: PipelineStage,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PicosError {

    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Self::SynthesisEmpty | Self::ExtractionFailed(_))
    }


    pub fn is_service_failure(&self) -> bool {
        matches!(self, Self::VocabularyService(_) | Self::SearchService(_))
    }
}

impl From<config::ConfigError> for PicosError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}


pub type Result<T> = std::result::Result<T, PicosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_out_of_order_message() {
        let err = PicosError::StageOutOfOrder {
            stage: "search",
            required: PipelineStage::Synthesized,
            actual: PipelineStage::Extracted,
        };
        let msg = err.to_string();
        assert!(msg.contains("search"));
        assert!(msg.contains("synthesized"));
        assert!(msg.contains("extracted"));
    }

    #[test]
    fn test_error_classification() {
        assert!(PicosError::SynthesisEmpty.is_user_actionable());
        assert!(!PicosError::SynthesisEmpty.is_service_failure());
        assert!(PicosError::SearchService(SearchError::Timeout(30)).is_service_failure());
    }
}
