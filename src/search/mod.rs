

pub mod models;
pub mod pubmed;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

pub use models::{BibliographicRecord, NOT_AVAILABLE};
pub use pubmed::PubMedClient;


#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unparseable search response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Search service reported an error: {0}")]
    Service(String),

    #[error("Unparseable record XML: {0}")]
    Xml(String),

    #[error("Search call timed out after {0}s")]
    Timeout(u64),
}

/// Bibliographic database with separate identifier search and bulk metadata fetch.
#[async_trait]
pub trait LiteratureDatabase: Send + Sync {

    async fn search_ids(&self, expression: &str, max_results: usize)
    -> Result<Vec<String>, SearchError>;


    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<BibliographicRecord>, SearchError>;


    fn database_name(&self) -> &str;
}


pub struct SearchExecutor {
    database: Arc<dyn LiteratureDatabase>,
    call_timeout: Option<Duration>,
}

impl SearchExecutor {

    pub fn new(database: Arc<dyn LiteratureDatabase>) -> Self {
        Self {
            database,
            call_timeout: None,
        }
    }


    #[must_use]
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// Zero hits is `Ok(vec![])` and skips the metadata fetch.
    pub async fn search(
        &self,
        expression: &str,
        max_results: usize,
    ) -> Result<Vec<BibliographicRecord>, SearchError> {
        let preview = crate::safe_truncate_ellipsis(expression, 80);
        info!(
            "Searching {} (max={}): {}",
            self.database.database_name(),
            max_results,
            preview
        );

        let ids = self
            .bounded(self.database.search_ids(expression, max_results))
            .await?;

        if ids.is_empty() {
            info!("No records matched the expression");
            return Ok(Vec::new());
        }
        debug!("Identifier search returned {} ids", ids.len());

        let records = self.bounded(self.database.fetch_records(&ids)).await?;
        info!("Fetched {} records", records.len());
        Ok(records)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, SearchError>
    where
        F: Future<Output = Result<T, SearchError>>,
    {
        match self.call_timeout {
            Some(t) => tokio::time::timeout(t, call)
                .await
                .map_err(|_| SearchError::Timeout(t.as_secs()))?,
            None => call.await,
        }
    }
}
