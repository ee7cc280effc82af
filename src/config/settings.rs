use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Local search asks the text index for `max(limit * 3, floor)` rows.
    #[serde(default = "default_fts_candidate_floor")]
    pub fts_candidate_floor: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// Items scored below this (0-10 scale) are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Upper bound on candidates sent to the model.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrivacyConfig {
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    Bedrock,
    Gemini,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub aws_region: Option<String>,
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.provider {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::Bedrock => "anthropic.claude-3-5-sonnet-20240620-v1:0",
            LlmProvider::Gemini => "gemini-1.5-flash",
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(match self.provider {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
            _ => "https://api.anthropic.com",
        })
    }

    /// Key from the config file, else the provider's conventional env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        let env_var = match self.provider {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::Bedrock => return None,
        };
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(env_var).ok())
    }
}

fn default_search_limit() -> usize {
    5
}

fn default_recent_limit() -> usize {
    20
}

fn default_fts_candidate_floor() -> usize {
    50
}

fn default_min_score() -> f64 {
    3.0
}

fn default_max_candidates() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "export *KEY*".to_string(),
        "export *SECRET*".to_string(),
        "export *TOKEN*".to_string(),
        "export *PASSWORD*".to_string(),
        "*AWS_SECRET*".to_string(),
    ]
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            recent_limit: default_recent_limit(),
            fts_candidate_floor: default_fts_candidate_floor(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_candidates: default_max_candidates(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: None,
            model: None,
            base_url: None,
            aws_region: None,
        }
    }
}

/// Locations of everything repty keeps on disk.
#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
}

impl Paths {
    /// `$REPTY_HOME`, else `~/.repty`.
    pub fn discover() -> Result<Self> {
        if let Some(dir) = std::env::var_os("REPTY_HOME") {
            return Ok(Self { home: dir.into() });
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(Self {
            home: home.join(".repty"),
        })
    }

    pub fn db(&self) -> PathBuf {
        self.home.join("repty.db")
    }

    pub fn config(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    pub fn env_file(&self) -> PathBuf {
        self.home.join("env")
    }

    pub fn state(&self) -> PathBuf {
        self.home.join("state.json")
    }

    pub fn ensure_home(&self) -> Result<()> {
        if !self.home.exists() {
            std::fs::create_dir_all(&self.home)
                .with_context(|| format!("Failed to create {}", self.home.display()))?;
        }
        Ok(())
    }
}

/// Load `KEY=VALUE` lines into the environment without overriding what is set.
pub fn load_env_file(paths: &Paths) {
    let path = paths.env_file();
    let Ok(content) = std::fs::read_to_string(&path) else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}

pub fn load_config(paths: &Paths) -> Result<Config> {
    load_env_file(paths);
    let path = paths.config();
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config.toml")
}

pub fn save_config(paths: &Paths, config: &Config) -> Result<()> {
    paths.ensure_home()?;
    let path = paths.config();
    let body = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(&path, body)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

/// Config rendered for display with the API key masked.
pub fn masked(config: &Config) -> Result<String> {
    let mut safe = config.clone();
    if safe.llm.api_key.is_some() {
        safe.llm.api_key = Some("***SET***".to_string());
    }
    toml::to_string_pretty(&safe).context("Failed to serialize config")
}
