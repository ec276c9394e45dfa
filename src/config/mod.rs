//! Configuration management for leadforge
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! API keys never live in the file; it only names the environment variables
//! that hold them.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::integrity::RewriteMode;
use crate::positioning::{Metric, Scope};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scrape service configuration
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Generation service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Batch pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Content integrity configuration
    #[serde(default)]
    pub integrity: IntegrityConfig,

    /// Comparative positioning configuration
    #[serde(default)]
    pub positioning: PositioningConfig,

    /// Cost estimation configuration
    #[serde(default)]
    pub costs: CostConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Scrape service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Base URL of the scrape API
    #[serde(default = "default_scrape_base_url")]
    pub base_url: String,

    /// Environment variable name for the scrape API key
    #[serde(default = "default_scrape_api_key_env")]
    pub api_key_env: String,

    /// Delay between consecutive scrape calls (milliseconds)
    #[serde(default = "default_scrape_delay_ms")]
    pub delay_ms: u64,

    /// Ask the scraper to strip navigation and boilerplate
    #[serde(default = "default_only_main_content")]
    pub only_main_content: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Environment variable name for the generation API key
    #[serde(default = "default_generation_api_key_env")]
    pub api_key_env: String,

    /// Model identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    /// Delay between consecutive generation calls (milliseconds)
    #[serde(default = "default_generation_delay_ms")]
    pub delay_ms: u64,

    /// Source text is truncated to this many characters in the prompt
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,

    /// Rewrite mode (patient_experience, clinical_scope)
    #[serde(default = "default_rewrite_mode")]
    pub rewrite_mode: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Batch pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Leads processed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep running batches until no work remains
    #[serde(default = "default_auto_continue")]
    pub auto_continue: bool,
}

/// Content integrity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Maximum chunk-pair similarity before a rewrite is flagged
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Target chunk size in words
    #[serde(default = "default_chunk_target_words")]
    pub chunk_target_words: usize,

    /// Excerpt length kept for the worst chunk pair
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

/// Comparative positioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositioningConfig {
    /// Attach positions to leads as they are processed
    #[serde(default = "default_attach_on_generate")]
    pub attach_on_generate: bool,

    /// Scope used when attaching (city, neighborhood, service_cluster)
    #[serde(default = "default_positioning_scope")]
    pub scope: String,

    /// Metrics to attach (rating, reviews, years_active)
    #[serde(default = "default_positioning_metrics")]
    pub metrics: Vec<String>,
}

/// Cost estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Estimated USD per successful scrape
    #[serde(default = "default_scrape_unit_cost")]
    pub scrape_unit_cost: f64,

    /// Estimated USD per generation
    #[serde(default = "default_generation_unit_cost")]
    pub generation_unit_cost: f64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for leadforge data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

/// Resolved settings handed to the pipeline at construction.
///
/// Built from [`Config`] plus the API keys read from the environment.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scrape_api_key: String,
    pub generation_api_key: String,
    pub batch_size: usize,
    pub scrape_delay_ms: u64,
    pub generation_delay_ms: u64,
    pub similarity_threshold: f64,
}

impl PipelineSettings {
    pub fn scrape_delay(&self) -> Duration {
        Duration::from_millis(self.scrape_delay_ms)
    }

    pub fn generation_delay(&self) -> Duration {
        Duration::from_millis(self.generation_delay_ms)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scrape_api_key: String::new(),
            generation_api_key: String::new(),
            batch_size: default_batch_size(),
            scrape_delay_ms: default_scrape_delay_ms(),
            generation_delay_ms: default_generation_delay_ms(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: default_scrape_base_url(),
            api_key_env: default_scrape_api_key_env(),
            delay_ms: default_scrape_delay_ms(),
            only_main_content: default_only_main_content(),
            timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            api_key_env: default_generation_api_key_env(),
            model: default_generation_model(),
            temperature: default_generation_temperature(),
            delay_ms: default_generation_delay_ms(),
            max_source_chars: default_max_source_chars(),
            rewrite_mode: default_rewrite_mode(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            auto_continue: default_auto_continue(),
        }
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            chunk_target_words: default_chunk_target_words(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            attach_on_generate: default_attach_on_generate(),
            scope: default_positioning_scope(),
            metrics: default_positioning_metrics(),
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            scrape_unit_cost: default_scrape_unit_cost(),
            generation_unit_cost: default_generation_unit_cost(),
        }
    }
}

impl Config {
    /// Get the default base directory for leadforge (~/.leadforge)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadforge")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("leads.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("leads.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Read the scrape API key from the configured environment variable
    pub fn scrape_api_key(&self) -> Result<String> {
        read_key(&self.scrape.api_key_env)
    }

    /// Read the generation API key from the configured environment variable
    pub fn generation_api_key(&self) -> Result<String> {
        read_key(&self.generation.api_key_env)
    }

    /// Resolve the settings the pipeline is constructed with
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            scrape_api_key: self.scrape_api_key()?,
            generation_api_key: self.generation_api_key()?,
            batch_size: self.pipeline.batch_size,
            scrape_delay_ms: self.scrape.delay_ms,
            generation_delay_ms: self.generation.delay_ms,
            similarity_threshold: self.integrity.similarity_threshold,
        })
    }

    /// Parsed rewrite mode
    pub fn rewrite_mode(&self) -> Result<RewriteMode> {
        self.generation.rewrite_mode.parse()
    }

    /// Parsed positioning scope and metrics
    pub fn positioning_targets(&self) -> Result<(Scope, Vec<Metric>)> {
        let scope = self.positioning.scope.parse()?;
        let metrics = self
            .positioning
            .metrics
            .iter()
            .map(|m| m.parse())
            .collect::<Result<Vec<Metric>>>()?;
        Ok((scope, metrics))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config(
                "pipeline.batch_size must be at least 1".to_string(),
            ));
        }

        let threshold = self.integrity.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::Config(
                "integrity.similarity_threshold must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.integrity.chunk_target_words == 0 {
            return Err(Error::Config(
                "integrity.chunk_target_words must be at least 1".to_string(),
            ));
        }

        if self.generation.max_source_chars == 0 {
            return Err(Error::Config(
                "generation.max_source_chars must be at least 1".to_string(),
            ));
        }

        if self.costs.scrape_unit_cost < 0.0 || self.costs.generation_unit_cost < 0.0 {
            return Err(Error::Config("costs must not be negative".to_string()));
        }

        self.rewrite_mode()
            .map_err(|e| Error::Config(format!("generation.rewrite_mode: {}", e)))?;
        self.positioning_targets()
            .map_err(|e| Error::Config(format!("positioning: {}", e)))?;

        Ok(())
    }
}

fn read_key(env_name: &str) -> Result<String> {
    match std::env::var(env_name) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::MissingCredential(env_name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.batch_size, 5);
        assert_eq!(config.scrape.delay_ms, 2000);
        assert_eq!(config.generation.delay_ms, 1000);
        assert!((config.integrity.similarity_threshold - 0.85).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.pipeline.batch_size = 12;
        config.generation.rewrite_mode = "clinical_scope".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.pipeline.batch_size, 12);
        assert_eq!(loaded.rewrite_mode().unwrap(), RewriteMode::ClinicalScope);
        assert_eq!(loaded.paths.db_file, tmp.path().join("leads.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nbatch_size = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.pipeline.batch_size, 3);
        assert_eq!(config.scrape.api_key_env, "FIRECRAWL_API_KEY");
        assert_eq!(config.positioning.metrics, vec!["rating", "reviews"]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());
        config.pipeline.batch_size = 5;

        config.integrity.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
        config.integrity.similarity_threshold = 0.9;
        assert!(config.validate().is_ok());

        config.positioning.scope = "galaxy".to_string();
        assert!(config.validate().is_err());
        config.positioning.scope = "neighborhood".to_string();

        config.positioning.metrics = vec!["rating".to_string(), "smiles".to_string()];
        assert!(config.validate().is_err());
        config.positioning.metrics = vec!["years_active".to_string()];

        config.generation.rewrite_mode = "poetry".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credential() {
        let mut config = Config::default();
        config.scrape.api_key_env = "LEADFORGE_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        match config.pipeline_settings() {
            Err(Error::MissingCredential(name)) => {
                assert_eq!(name, "LEADFORGE_TEST_KEY_THAT_IS_NEVER_SET")
            }
            other => panic!("expected missing credential, got {:?}", other),
        }
    }
}
