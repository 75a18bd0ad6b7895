//! Text summarization through a local language model.

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webtools_core::config::LlmConfig;
use webtools_core::{Config, Error, Result};

/// Longest source text passed to the model, in characters.
pub const MAX_SOURCE_CHARS: usize = 4000;
pub const DEFAULT_MAX_TOKENS: u32 = 200;
const STOP_SEQUENCE: &str = "\n\n";
/// Printed by llama.cpp after the last token when generation hits end-of-sequence.
const END_OF_TEXT_MARKER: &str = "[end of text]";

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

/// Blocking text generation. Called from the blocking thread pool only.
pub trait InferenceEngine: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &InferenceRequest) -> Result<String>;
}

/// Runs the llama.cpp command-line binary against a local model file.
#[derive(Debug, Clone)]
pub struct LlamaCliEngine {
    binary: PathBuf,
    model: PathBuf,
    context_size: u32,
    threads: u32,
    extra_args: Vec<String>,
}

impl LlamaCliEngine {
    /// Build from configuration. `None` when the model or the binary is missing.
    pub fn from_config(cfg: &Config) -> Option<Self> {
        let Some(model) = cfg.model_path() else {
            match cfg.llm.model_path.as_deref() {
                Some(p) => warn!(path = %p, "Model file not found, summarization disabled"),
                None => info!("No model configured, summarization disabled"),
            }
            return None;
        };
        let Some(binary) = resolve_binary(&cfg.llm) else {
            warn!(binary = %cfg.llm.binary, "llama.cpp binary not found, summarization disabled");
            return None;
        };

        info!(model = %model.display(), binary = %binary.display(), "Local model configured");
        Some(Self {
            binary,
            model,
            context_size: cfg.llm.context_size,
            threads: cfg.llm.threads,
            extra_args: cfg.llm.extra_args.clone(),
        })
    }

    fn args(&self, request: &InferenceRequest) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model.display().to_string(),
            "-p".to_string(),
            request.prompt.clone(),
            "-n".to_string(),
            request.max_tokens.to_string(),
            "--temp".to_string(),
            request.temperature.to_string(),
            "-c".to_string(),
            self.context_size.to_string(),
            "-t".to_string(),
            self.threads.to_string(),
            "--no-display-prompt".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl InferenceEngine for LlamaCliEngine {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    fn complete(&self, request: &InferenceRequest) -> Result<String> {
        debug!(max_tokens = request.max_tokens, "Running llama.cpp");
        let output = Command::new(&self.binary)
            .args(self.args(request))
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            return Err(Error::Other(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(cut_at_stop(strip_end_marker(&text), &request.stop).to_string())
    }
}

/// Locate the llama.cpp binary: an existing path, or a name on PATH.
pub fn resolve_binary(cfg: &LlmConfig) -> Option<PathBuf> {
    let candidate = PathBuf::from(&cfg.binary);
    if candidate.is_file() {
        return Some(candidate);
    }
    which::which(&cfg.binary).ok()
}

fn strip_end_marker(text: &str) -> &str {
    match text.find(END_OF_TEXT_MARKER) {
        Some(idx) => text[..idx].trim_end(),
        None => text,
    }
}

/// Truncate at the first stop sequence. Leading whitespace is skipped first
/// so an opening blank line does not swallow the whole output.
fn cut_at_stop<'a>(text: &'a str, stop: &[String]) -> &'a str {
    let text = text.trim_start();
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .map(|idx| &text[..idx])
        .unwrap_or(text)
}

/// Keep the first [`MAX_SOURCE_CHARS`] characters, marking the cut with `...`.
pub fn truncate_source(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(MAX_SOURCE_CHARS) {
        Some((idx, _)) => Cow::Owned(format!("{}...", &text[..idx])),
        None => Cow::Borrowed(text),
    }
}

pub fn build_prompt(text: &str) -> String {
    format!("Summarize the following text concisely:\n\n{}\n\nSummary:", text)
}

/// Summarization front end. Holds no browser state.
pub struct Summarizer {
    engine: Option<Arc<dyn InferenceEngine>>,
    temperature: f32,
}

impl Summarizer {
    pub fn new(engine: Option<Arc<dyn InferenceEngine>>) -> Self {
        Self {
            engine,
            temperature: 0.7,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn from_config(cfg: &Config) -> Self {
        let engine = LlamaCliEngine::from_config(cfg).map(|e| Arc::new(e) as Arc<dyn InferenceEngine>);
        Self {
            engine,
            temperature: cfg.llm.temperature,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.engine.as_deref().map(|e| e.name())
    }

    pub async fn summarize(&self, text: &str, max_tokens: u32) -> Result<String> {
        let engine = self.engine.clone().ok_or_else(|| {
            Error::SummarizerUnavailable(
                "LLM not configured. Set LLM environment variable with path to model file.".to_string(),
            )
        })?;

        let source = truncate_source(text);
        if let Cow::Owned(_) = source {
            warn!(
                original_chars = text.chars().count(),
                kept_chars = MAX_SOURCE_CHARS,
                "Text truncated to fit context window"
            );
        }

        let request = InferenceRequest {
            prompt: build_prompt(&source),
            max_tokens,
            temperature: self.temperature,
            stop: vec![STOP_SEQUENCE.to_string()],
        };

        let output = tokio::task::spawn_blocking(move || engine.complete(&request))
            .await
            .map_err(|e| Error::Summarization(format!("Failed to generate summary: {}", e)))?
            .map_err(|e| Error::Summarization(format!("Failed to generate summary: {}", e)))?;

        let summary = output.trim().to_string();
        info!(chars = summary.chars().count(), "Generated summary");
        Ok(summary)
    }
}
