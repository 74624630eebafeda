

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::error::{PicosError, Result};
use crate::vocabulary::MatchMode;
use crate::{
    DEFAULT_FALLBACK_THRESHOLD, DEFAULT_LLM_MODEL, DEFAULT_MAX_PARALLEL, DEFAULT_MESH_URL,
    DEFAULT_OLLAMA_URL, DEFAULT_PUBMED_URL,
};


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicosConfig {

    pub llm_provider: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    /// Unset means the provider's own endpoint (DashScope or local Ollama).
    pub llm_base_url: Option<String>,
    pub llm_temperature: f64,


    pub llm_fallback_enabled: bool,
    pub llm_fallback_url: String,
    pub llm_fallback_model: String,


    pub mesh_base_url: String,
    pub mesh_match_mode: MatchMode,
    pub mesh_year: String,
    pub mesh_limit: usize,
    pub synonym_threshold: usize,
    pub max_parallel_lookups: usize,
    pub strict_vocabulary: bool,


    pub pubmed_base_url: String,
    pub pubmed_api_key: Option<String>,
    pub pubmed_max_results: usize,
    pub search_field: Option<String>,

    pub timeout: u64,
}

impl PicosConfig {

    pub fn new() -> Self {
        Self {
            llm_provider: "openai".to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_base_url: None,
            llm_temperature: 0.3,

            llm_fallback_enabled: false,
            llm_fallback_url: DEFAULT_OLLAMA_URL.to_string(),
            llm_fallback_model: "llama3.2".to_string(),

            mesh_base_url: DEFAULT_MESH_URL.to_string(),
            mesh_match_mode: MatchMode::Contains,
            mesh_year: "current".to_string(),
            mesh_limit: 10,
            synonym_threshold: DEFAULT_FALLBACK_THRESHOLD,
            max_parallel_lookups: DEFAULT_MAX_PARALLEL,
            strict_vocabulary: false,

            pubmed_base_url: DEFAULT_PUBMED_URL.to_string(),
            pubmed_api_key: None,
            pubmed_max_results: 10,
            search_field: None,

            timeout: 30,
        }
    }

    /// Layers built-in defaults, an optional config file and `PICOS_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::new();
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        if let Some(path) = path {
            debug!("Loading config file: {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("PICOS").try_parsing(true));

        let mut config: Self = builder.build()?.try_deserialize()?;

        if config.llm_api_key.is_none() {
            config.llm_api_key = std::env::var("DASHSCOPE_API_KEY").ok();
        }

        config.validate()?;
        Ok(config)
    }


    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }


    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mesh_base_url", Some(self.mesh_base_url.as_str())),
            ("pubmed_base_url", Some(self.pubmed_base_url.as_str())),
            ("llm_fallback_url", Some(self.llm_fallback_url.as_str())),
            ("llm_base_url", self.llm_base_url.as_deref()),
        ] {
            if let Some(value) = value {
                Url::parse(value)
                    .map_err(|e| PicosError::Config(format!("{name} is not a valid URL ({value}): {e}")))?;
            }
        }

        if self.mesh_limit == 0 {
            return Err(PicosError::Config("mesh_limit must be greater than 0".to_string()));
        }
        if self.pubmed_max_results == 0 {
            return Err(PicosError::Config("pubmed_max_results must be greater than 0".to_string()));
        }
        if self.synonym_threshold == 0 {
            return Err(PicosError::Config("synonym_threshold must be greater than 0".to_string()));
        }
        if self.max_parallel_lookups == 0 {
            return Err(PicosError::Config("max_parallel_lookups must be greater than 0".to_string()));
        }
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(PicosError::Config(format!(
                "llm_temperature must be within 0.0..=2.0, got {}",
                self.llm_temperature
            )));
        }

        Ok(())
    }


    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for PicosConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PicosConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.synonym_threshold, 5);
        assert_eq!(config.mesh_match_mode, MatchMode::Contains);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = PicosConfig::default();
        config.mesh_base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(PicosError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = PicosConfig::default();
        config.max_parallel_lookups = 0;
        assert!(config.validate().is_err());

        let mut config = PicosConfig::default();
        config.pubmed_max_results = 0;
        assert!(config.validate().is_err());

        let mut config = PicosConfig::default();
        config.synonym_threshold = 0;
        assert!(matches!(config.validate(), Err(PicosError::Config(msg)) if msg.contains("synonym_threshold")));
    }

    #[test]
    fn test_llm_base_url_unset_by_default() {
        let config = PicosConfig::default();
        assert!(config.llm_base_url.is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
llm_model = "qwen-max"
mesh_match_mode = "exact"
pubmed_max_results = 25
"#
        )
        .unwrap();

        let config = PicosConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.llm_model, "qwen-max");
        assert_eq!(config.mesh_match_mode, MatchMode::Exact);
        assert_eq!(config.pubmed_max_results, 25);
        assert_eq!(config.mesh_limit, 10);
    }
}
