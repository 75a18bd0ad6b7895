use crate::{Error, Paths, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding `search.baseUrl`.
pub const ENV_SEARCH_URL: &str = "SEARXNG_URL";
/// Environment variable holding the path to the local model file.
pub const ENV_MODEL_PATH: &str = "LLM";
pub const ENV_LLM_BINARY: &str = "LLM_BINARY";
pub const ENV_CHROME_PATH: &str = "CHROME_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_base_url() -> String {
    "http://127.0.0.1:8888".to_string()
}

fn default_max_results() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Path to the model file. Summarization is disabled when unset or missing.
    #[serde(default)]
    pub model_path: Option<String>,
    /// llama.cpp CLI executable, either a path or a name looked up on PATH.
    #[serde(default = "default_llm_binary")]
    pub binary: String,
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Extra arguments appended to every invocation.
    #[serde(default = "default_llm_extra_args")]
    pub extra_args: Vec<String>,
}

fn default_llm_binary() -> String {
    "llama-cli".to_string()
}

fn default_context_size() -> u32 {
    2048
}

fn default_threads() -> u32 {
    4
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_extra_args() -> Vec<String> {
    vec!["-no-cnv".to_string()]
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            binary: default_llm_binary(),
            context_size: default_context_size(),
            threads: default_threads(),
            temperature: default_temperature(),
            extra_args: default_llm_extra_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Chrome/Chromium executable. Auto-detected when unset.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_search_timeout_secs() -> u64 {
    30
}

fn default_startup_timeout_secs() -> u64 {
    15
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_user_agent(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    9000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `.env` from the working directory (if any), then apply the process
    /// environment on top of the file configuration.
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    /// Overlay environment overrides using `lookup` as the variable source.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SEARCH_URL).filter(|v| !v.trim().is_empty()) {
            self.search.base_url = url.trim().to_string();
        }
        if let Some(model) = lookup(ENV_MODEL_PATH) {
            let model = strip_quotes(&model);
            self.llm.model_path = if model.is_empty() {
                None
            } else {
                Some(model.to_string())
            };
        }
        if let Some(binary) = lookup(ENV_LLM_BINARY).filter(|v| !v.trim().is_empty()) {
            self.llm.binary = strip_quotes(&binary).to_string();
        }
        if let Some(chrome) = lookup(ENV_CHROME_PATH).filter(|v| !v.trim().is_empty()) {
            self.browser.executable = Some(strip_quotes(&chrome).to_string());
        }
    }

    /// Search base URL without a trailing slash.
    pub fn search_base_url(&self) -> &str {
        self.search.base_url.trim_end_matches('/')
    }

    /// The configured model path, if it is set and exists on disk.
    pub fn model_path(&self) -> Option<PathBuf> {
        let raw = self.llm.model_path.as_deref()?;
        let path = PathBuf::from(strip_quotes(raw));
        if path.as_os_str().is_empty() || !path.exists() {
            return None;
        }
        Some(path)
    }
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}
