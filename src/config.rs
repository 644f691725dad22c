//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::classify::{ClassifierConfig, HfInferenceClient, HybridClassifier, InferenceConfig};
use crate::marketplace::models::{MaxPages, SearchConfig, DEFAULT_USER_AGENT};
use crate::marketplace::selectors::ExtractionRules;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Terms searched when none are given on the command line.
pub const DEFAULT_TERMS: &[&str] =
    &["Frasco de dieta enteral", "Equipo de dieta enteral", "Seringa 20ML de dieta enteral"];

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Run the browser without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Base delay between result pages in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added to the page delay (0 to this value)
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// Pause between search terms in milliseconds
    #[serde(default = "default_term_delay_ms")]
    pub term_delay_ms: u64,

    /// Result pages per term: a positive number or "all"
    #[serde(default)]
    pub max_pages: MaxPages,

    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    #[serde(default = "default_selector_timeout_secs")]
    pub selector_timeout_secs: u64,

    /// Marketplace home page
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Host serving result listings, used for direct search URLs
    #[serde(default = "default_listing_base_url")]
    pub listing_base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Chromium binary; auto-detected when unset
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// TOML extraction-rule table replacing the built-in one
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// Default search terms
    #[serde(default = "default_terms")]
    pub terms: Vec<String>,

    /// JSON file records are saved to
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub inference: InferenceConfig,
}

fn default_headless() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_delay_jitter_ms() -> u64 {
    500
}

fn default_term_delay_ms() -> u64 {
    2000
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_selector_timeout_secs() -> u64 {
    15
}

fn default_base_url() -> String {
    "https://www.mercadolivre.com.br".to_string()
}

fn default_listing_base_url() -> String {
    "https://lista.mercadolivre.com.br".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_terms() -> Vec<String> {
    DEFAULT_TERMS.iter().map(|t| t.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            term_delay_ms: default_term_delay_ms(),
            max_pages: MaxPages::default(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            selector_timeout_secs: default_selector_timeout_secs(),
            base_url: default_base_url(),
            listing_base_url: default_listing_base_url(),
            user_agent: default_user_agent(),
            chrome_executable: None,
            rules_path: None,
            terms: default_terms(),
            store_path: None,
            format: OutputFormat::Table,
            classifier: ClassifierConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("ml-harvester.toml");
        if local_config.exists() {
            debug!("Found ml-harvester.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("ml-harvester").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(delay) = std::env::var("HARVESTER_DELAY") {
            if let Ok(d) = delay.parse() {
                self.delay_ms = d;
            }
        }

        if let Ok(pages) = std::env::var("HARVESTER_MAX_PAGES") {
            match pages.parse() {
                Ok(p) => self.max_pages = p,
                Err(e) => warn!("Ignoring HARVESTER_MAX_PAGES: {}", e),
            }
        }

        if let Some(headless) = std::env::var("HARVESTER_HEADLESS").ok().as_deref().and_then(parse_flag) {
            self.headless = headless;
        }

        if let Some(enable) = std::env::var("HARVESTER_ENABLE_AI").ok().as_deref().and_then(parse_flag) {
            self.classifier.enable_ai = enable;
        }

        if let Ok(token) = std::env::var("HUGGINGFACE_TOKEN") {
            if !token.trim().is_empty() {
                self.inference.token = Some(token);
            }
        }

        self
    }

    /// Session settings derived from this configuration.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            headless: self.headless,
            delay_ms: self.delay_ms,
            delay_jitter_ms: self.delay_jitter_ms,
            term_delay_ms: self.term_delay_ms,
            max_pages: self.max_pages,
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            selector_timeout: Duration::from_secs(self.selector_timeout_secs),
            base_url: self.base_url.clone(),
            listing_base_url: self.listing_base_url.clone(),
            user_agent: self.user_agent.clone(),
            chrome_executable: self.chrome_executable.clone(),
        }
    }

    /// Extraction rules from `rules_path`, or the built-in table.
    pub fn extraction_rules(&self) -> Result<ExtractionRules> {
        ExtractionRules::load(self.rules_path.as_deref())
    }

    /// Builds the classifier. Model escalation without a usable token falls
    /// back to keyword rules with a warning.
    pub fn classifier(&self) -> HybridClassifier {
        if !self.classifier.enable_ai {
            return HybridClassifier::new(self.classifier);
        }

        match HfInferenceClient::new(&self.inference) {
            Ok(client) => HybridClassifier::with_model(self.classifier, Arc::new(client)),
            Err(e) => {
                warn!("AI classification disabled: {:#}", e);
                HybridClassifier::new(ClassifierConfig { enable_ai: false, ..self.classifier })
            }
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
