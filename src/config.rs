use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub analysis: AnalysisConfig,
    pub analyzers: AnalyzerConfig,
    pub enrichment: EnrichmentConfig,
    pub output: OutputConfig,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

/// Discovery, parsing and resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Per-file parse budget handed to each adapter call
    pub parse_timeout_ms: u64,
    /// Files above this size are skipped with a diagnostic
    pub max_file_bytes: u64,
    pub max_files: usize,
    pub max_edges: usize,
    /// Parser worker threads, 0 means one per core
    pub threads: usize,
}

/// Which built-in analyzers contribute annotation batches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub security: bool,
    pub quality: bool,
    pub refactoring: bool,
}

/// Enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub provider: ProviderKind,
    pub model: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub concurrency: usize,
    /// Character budget for a single context payload
    pub budget_chars: usize,
    pub units: EnrichmentUnits,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub pretty: bool,
    /// File count above which the dependency diagram groups by top directory
    pub diagram_max_nodes: usize,
    /// Mermaid layout direction: TB, TD, BT, LR or RL
    pub diagram_direction: String,
}

/// Layout directions Mermaid accepts for `graph`
pub const DIAGRAM_DIRECTIONS: &[&str] = &["TB", "TD", "BT", "LR", "RL"];

/// Enrichment provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Mock,
    Ollama,
    OpenAI,
}

/// Granularity of enrichment requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentUnits {
    #[default]
    Files,
    Functions,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Untitled Project".to_string(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*".to_string()],
            exclude: vec![
                "target/**".to_string(),
                "node_modules/**".to_string(),
                "vendor/**".to_string(),
                "venv/**".to_string(),
                ".venv/**".to_string(),
                "__pycache__/**".to_string(),
                ".git/**".to_string(),
                "dist/**".to_string(),
                "build/**".to_string(),
            ],
            parse_timeout_ms: 5_000,
            max_file_bytes: 2 * 1024 * 1024,
            max_files: 50_000,
            max_edges: 2_000_000,
            threads: 0,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            security: false,
            quality: true,
            refactoring: true,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProviderKind::default(),
            model: "llama3".to_string(),
            api_url: None,
            api_key: None,
            timeout_ms: 20_000,
            concurrency: 4,
            budget_chars: 4_000,
            units: EnrichmentUnits::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./codewiki-docs"),
            pretty: true,
            diagram_max_nodes: 100,
            diagram_direction: "LR".to_string(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file if present, otherwise return defaults.
    ///
    /// A file that exists but does not parse or validate is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge CLI arguments into config (CLI takes precedence)
    pub fn merge_cli(
        &mut self,
        output: Option<PathBuf>,
        exclude: Vec<String>,
        ai: bool,
        ai_provider: Option<ProviderKind>,
        security: bool,
    ) {
        if let Some(out) = output {
            self.output.directory = out;
        }

        if !exclude.is_empty() {
            self.analysis.exclude.extend(exclude);
        }

        if ai {
            self.enrichment.enabled = true;
        }

        if let Some(provider) = ai_provider {
            self.enrichment.provider = provider;
        }

        if security {
            self.analyzers.security = true;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.analysis.include.is_empty() {
            return Err(Error::config_validation("at least one include pattern required"));
        }

        for pattern in self.analysis.include.iter().chain(&self.analysis.exclude) {
            glob::Pattern::new(pattern)?;
        }

        if self.analysis.parse_timeout_ms == 0 {
            return Err(Error::config_validation("parse_timeout_ms must be positive"));
        }

        if self.analysis.max_files == 0 || self.analysis.max_edges == 0 {
            return Err(Error::config_validation("resource limits must be positive"));
        }

        if self.enrichment.timeout_ms == 0 {
            return Err(Error::config_validation("enrichment timeout_ms must be positive"));
        }

        if self.enrichment.concurrency == 0 {
            return Err(Error::config_validation("enrichment concurrency must be at least 1"));
        }

        if self.enrichment.budget_chars < 64 {
            return Err(Error::config_validation("budget_chars must be at least 64"));
        }

        if self.output.diagram_max_nodes == 0 {
            return Err(Error::config_validation("diagram_max_nodes must be positive"));
        }

        if !DIAGRAM_DIRECTIONS.contains(&self.output.diagram_direction.as_str()) {
            return Err(Error::config_validation(format!(
                "diagram_direction must be one of {}, got {:?}",
                DIAGRAM_DIRECTIONS.join(", "),
                self.output.diagram_direction
            )));
        }

        Ok(())
    }
}
