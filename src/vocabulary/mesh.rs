

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{MatchMode, VocabularyError, VocabularyLookup};
use crate::core::config::PicosConfig;

#[derive(Debug, Deserialize)]
struct MeshDescriptor {
    #[serde(default)]
    resource: Option<String>,
    label: String,
}

/// NLM MeSH lookup API (`/lookup/descriptor`).
pub struct MeshClient {
    base_url: String,
    year: String,
    client: Client,
}

impl MeshClient {

    pub fn new(
        base_url: impl Into<String>,
        year: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, VocabularyError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let year = year.into();
        info!("MeSH client initialized (url={}, year={})", base_url, year);
        Ok(Self {
            base_url,
            year,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?,
        })
    }


    pub fn from_config(config: &PicosConfig) -> Result<Self, VocabularyError> {
        Self::new(&config.mesh_base_url, &config.mesh_year, config.timeout)
    }
}

#[async_trait]
impl VocabularyLookup for MeshClient {
    async fn lookup(
        &self,
        phrase: &str,
        match_mode: MatchMode,
        limit: usize,
    ) -> Result<Vec<String>, VocabularyError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/lookup/descriptor", self.base_url))
            .query(&[
                ("label", phrase),
                ("match", match_mode.as_str()),
                ("year", self.year.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VocabularyError::Status {
                status: status.as_u16(),
                body: crate::safe_truncate(&body, 200),
            });
        }

        let body = response.text().await?;
        let descriptors: Vec<MeshDescriptor> =
            serde_json::from_str(&body).map_err(|e| VocabularyError::Payload(e.to_string()))?;

        if descriptors.is_empty() {
            debug!("No MeSH descriptor matches '{}'", phrase);
        }

        Ok(descriptors
            .into_iter()
            .inspect(|d| debug!("MeSH {} -> {:?}", d.label, d.resource))
            .map(|d| d.label)
            .collect())
    }

    fn service_name(&self) -> &str {
        "mesh"
    }
}
