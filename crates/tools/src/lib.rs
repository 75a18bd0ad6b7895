pub mod browser;
pub mod extract;
pub mod mcp;
pub mod registry;
pub mod search;
pub mod summarize;
pub mod web;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use webtools_core::{Config, Error, Result};

pub use browser::BrowserSession;
pub use registry::ToolRegistry;
pub use summarize::Summarizer;

/// Shared state handed to every tool call.
///
/// Built once by the process entry point; cloning is cheap.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub session: Arc<BrowserSession>,
    pub summarizer: Arc<Summarizer>,
}

impl ToolContext {
    pub fn new(config: Config, session: Arc<BrowserSession>, summarizer: Arc<Summarizer>) -> Self {
        Self {
            config: Arc::new(config),
            session,
            summarizer,
        }
    }
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, params: &Value) -> Result<()>;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}

/// Decode tool params into a typed request, reporting problems as validation errors.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| Error::Validation(format!("Invalid parameters: {}", e)))
}

/// Missing or blank string parameter.
pub fn require_str(params: &Value, name: &str) -> Result<()> {
    match params.get(name).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(Error::Validation(format!("Missing required parameter: {}", name))),
    }
}
