use std::collections::HashMap;
use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, warn};
use webtools_core::{Error, Result};

use crate::{Tool, ToolContext, ToolSchema};
use crate::web::{
    CloseBrowserTool, ExtractContentTool, GetPageContentTool, NavigateTool, SummarizeTool,
    WebSearchTool,
};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Search and page tools
        registry.register(Arc::new(WebSearchTool));
        registry.register(Arc::new(NavigateTool));
        registry.register(Arc::new(ExtractContentTool));
        registry.register(Arc::new(GetPageContentTool));

        // Local model
        registry.register(Arc::new(SummarizeTool));

        registry.register(Arc::new(CloseBrowserTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// All schemas, sorted by tool name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(b.name));
        schemas
    }

    /// Get all registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| {
            Error::NotFound(format!("Unknown tool: {}", name))
        })?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::testing::fake_session;
    use crate::Summarizer;
    use serde_json::json;
    use webtools_core::Config;

    #[test]
    fn test_registry_new_empty() {
        let reg = ToolRegistry::new();
        assert!(reg.tool_names().is_empty());
        assert!(reg.get("web_search").is_none());
    }

    #[test]
    fn test_registry_with_defaults_has_all_tools() {
        let reg = ToolRegistry::with_defaults();
        assert_eq!(
            reg.tool_names(),
            vec![
                "close_browser",
                "extract_content",
                "get_page_content",
                "navigate",
                "summarize",
                "web_search",
            ]
        );
        let schemas = reg.schemas();
        assert_eq!(schemas.len(), 6);
        assert_eq!(schemas[0].name, "close_browser");
    }

    #[tokio::test]
    async fn test_registry_unknown_tool() {
        let (session, _world) = fake_session();
        let ctx = ToolContext::new(Config::default(), session, Arc::new(Summarizer::disabled()));
        let err = ToolRegistry::with_defaults()
            .execute("screenshot", ctx, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_registry_validates_before_execute() {
        let (session, world) = fake_session();
        let ctx = ToolContext::new(Config::default(), session, Arc::new(Summarizer::disabled()));
        let err = ToolRegistry::with_defaults()
            .execute("navigate", ctx, json!({"wait_time": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // Validation failed before the browser was touched.
        assert_eq!(world.launches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
