

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::CategoryPhrases;
use super::terms::TermSet;
use crate::core::error::{PicosError, Result};
use crate::search::BibliographicRecord;


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    NotStarted,
    Extracted,
    Resolved,
    Synthesized,
    Searched,
}

/// One pipeline run, carried by the caller between otherwise independent invocations.
///
/// Artifacts are derived from each other: re-extraction drops everything downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub topic: String,
    stage: PipelineStage,
    phrases: Option<CategoryPhrases>,
    terms: Option<TermSet>,
    expression: Option<String>,
    records: Option<Vec<BibliographicRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {

    pub fn new(topic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            topic: topic.into(),
            stage: PipelineStage::NotStarted,
            phrases: None,
            terms: None,
            expression: None,
            records: None,
            created_at: now,
            updated_at: now,
        }
    }


    #[must_use]
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }


    pub fn phrases(&self) -> Option<&CategoryPhrases> {
        self.phrases.as_ref()
    }


    pub fn terms(&self) -> Option<&TermSet> {
        self.terms.as_ref()
    }


    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }


    pub fn records(&self) -> Option<&[BibliographicRecord]> {
        self.records.as_deref()
    }

    /// Fails with `StageOutOfOrder` unless the cursor is exactly at `required`.
    pub fn require(&self, stage: &'static str, required: PipelineStage) -> Result<()> {
        if self.stage != required {
            return Err(PicosError::StageOutOfOrder {
                stage,
                required,
                actual: self.stage,
            });
        }
        Ok(())
    }

    /// Valid from any stage. Resets the cursor to `Extracted` and discards downstream artifacts.
    pub fn record_extraction(&mut self, phrases: CategoryPhrases) {
        if self.stage > PipelineStage::Extracted {
            debug!(
                "Re-extraction at stage {} discards downstream artifacts (run={})",
                self.stage, self.run_id
            );
        }
        self.phrases = Some(phrases);
        self.terms = None;
        self.expression = None;
        self.records = None;
        self.advance(PipelineStage::Extracted);
    }


    pub fn record_resolution(&mut self, terms: TermSet) -> Result<()> {
        self.require("resolve", PipelineStage::Extracted)?;
        self.terms = Some(terms);
        self.advance(PipelineStage::Resolved);
        Ok(())
    }


    pub fn record_synthesis(&mut self, expression: String) -> Result<()> {
        self.require("synthesize", PipelineStage::Resolved)?;
        self.expression = Some(expression);
        self.advance(PipelineStage::Synthesized);
        Ok(())
    }


    pub fn record_search(&mut self, records: Vec<BibliographicRecord>) -> Result<()> {
        self.require("search", PipelineStage::Synthesized)?;
        self.records = Some(records);
        self.advance(PipelineStage::Searched);
        Ok(())
    }

    fn advance(&mut self, stage: PipelineStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }


    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Saved pipeline state ({}) to {}", self.stage, path.display());
        Ok(())
    }


    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&json)?;
        debug!("Loaded pipeline state run={} stage={}", state.run_id, state.stage);
        Ok(state)
    }
}
