

pub mod aggregator;
pub mod models;
pub mod runner;
pub mod state;
pub mod synthesizer;
pub mod terms;

pub use aggregator::{AggregationOptions, TermAggregator, aggregate};
pub use models::{CategoryPhrases, PicosCategory};
pub use runner::QueryPipeline;
pub use state::{PipelineStage, PipelineState};
pub use synthesizer::synthesize;
pub use terms::{TermSet, Terms};
