//! The six browser tools exposed to clients.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use webtools_core::{Error, Result};

use crate::browser::session::DEFAULT_WAIT_SECS;
use crate::summarize::DEFAULT_MAX_TOKENS;
use crate::{parse_params, require_str, Tool, ToolContext, ToolSchema};

#[derive(Debug, Deserialize)]
pub struct WebSearchRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub url: String,
    #[serde(default)]
    pub wait_for_element: Option<String>,
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,
}

fn default_wait_time() -> u64 {
    DEFAULT_WAIT_SECS
}

#[derive(Debug, Deserialize)]
pub struct ExtractContentRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub wait_for_element: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

#[derive(Debug, Deserialize)]
pub struct GetPageContentRequest {
    pub url: String,
}

/// Blank optional strings count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search",
            description: "Search the web through the configured SearXNG instance. Returns a list of results with title, url, and snippet. Never fails: problems yield an empty list.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query string"
                    },
                    "max_results": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Maximum number of results to return (default: 10)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "query")?;
        parse_params::<WebSearchRequest>(params)?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let req: WebSearchRequest = parse_params(&params)?;
        let max_results = req.max_results.unwrap_or(ctx.config.search.max_results);
        let results = ctx.session.web_search(&req.query, max_results).await;
        Ok(json!({ "results": results }))
    }
}

pub struct NavigateTool;

#[async_trait]
impl Tool for NavigateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate",
            description: "Navigate the browser to a URL and optionally wait for a CSS selector to appear. HTTP error pages still count as a successful navigation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to navigate to"
                    },
                    "wait_for_element": {
                        "type": "string",
                        "description": "CSS selector to wait for (optional)"
                    },
                    "wait_time": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Maximum time to wait for the selector in seconds (default: 10)"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "url")?;
        parse_params::<NavigateRequest>(params)?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let req: NavigateRequest = parse_params(&params)?;
        let selector = non_blank(req.wait_for_element);
        let outcome = ctx
            .session
            .navigate(&req.url, selector.as_deref(), req.wait_time)
            .await?;
        info!(url = %outcome.url, status = outcome.status, "navigate tool done");
        Ok(json!({
            "status": "success",
            "message": format!("Navigated to {}", req.url),
        }))
    }
}

pub struct ExtractContentTool;

#[async_trait]
impl Tool for ExtractContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "extract_content",
            description: "Extract the visible text of a web page with scripts and styles removed. Uses the current page when no url is given.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to extract content from (optional, uses current page if not provided)"
                    },
                    "wait_for_element": {
                        "type": "string",
                        "description": "CSS selector to wait for before extraction (optional, only used with url)"
                    }
                }
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        parse_params::<ExtractContentRequest>(params)?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let req: ExtractContentRequest = parse_params(&params)?;
        let url = non_blank(req.url);
        let selector = non_blank(req.wait_for_element);
        let content = ctx
            .session
            .extract_content(url.as_deref(), selector.as_deref())
            .await?;
        Ok(json!({ "content": content }))
    }
}

pub struct SummarizeTool;

#[async_trait]
impl Tool for SummarizeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "summarize",
            description: "Summarize text with the local language model. Input longer than 4000 characters is truncated first.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to summarize"
                    },
                    "max_tokens": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of tokens in the summary (default: 200)"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        // Any string is accepted, including an empty one.
        let req: SummarizeRequest = parse_params(params)?;
        if req.max_tokens == 0 {
            return Err(Error::Validation("max_tokens must be at least 1".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let req: SummarizeRequest = parse_params(&params)?;
        let summary = ctx.summarizer.summarize(&req.text, req.max_tokens).await?;
        Ok(json!({ "summary": summary }))
    }
}

pub struct GetPageContentTool;

#[async_trait]
impl Tool for GetPageContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_page_content",
            description: "Navigate to a URL and extract its full text content in one operation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to fetch and extract content from"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "url")?;
        parse_params::<GetPageContentRequest>(params)?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let req: GetPageContentRequest = parse_params(&params)?;
        // Navigation and extraction run under one session lock.
        let content = ctx.session.extract_content(Some(&req.url), None).await?;
        Ok(json!({ "url": req.url, "content": content }))
    }
}

pub struct CloseBrowserTool;

#[async_trait]
impl Tool for CloseBrowserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "close_browser",
            description: "Close the browser and release its resources. The next browser tool call starts a fresh one.",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        ctx.session.close().await;
        Ok(json!({
            "status": "success",
            "message": "Browser closed successfully",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::testing::{fake_session, search_page, search_url, FakeWorld};
    use crate::summarize::{InferenceEngine, InferenceRequest};
    use crate::Summarizer;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use webtools_core::Config;

    fn ctx_with(summarizer: Summarizer) -> (ToolContext, Arc<FakeWorld>) {
        let (session, world) = fake_session();
        (
            ToolContext::new(Config::default(), session, Arc::new(summarizer)),
            world,
        )
    }

    struct EchoEngine;

    impl InferenceEngine for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }

        fn complete(&self, request: &InferenceRequest) -> Result<String> {
            Ok(format!(" {} tokens \n", request.max_tokens))
        }
    }

    #[test]
    fn test_schemas() {
        assert_eq!(WebSearchTool.schema().name, "web_search");
        assert_eq!(NavigateTool.schema().name, "navigate");
        assert_eq!(ExtractContentTool.schema().name, "extract_content");
        assert_eq!(SummarizeTool.schema().name, "summarize");
        assert_eq!(GetPageContentTool.schema().name, "get_page_content");
        assert_eq!(CloseBrowserTool.schema().name, "close_browser");
        assert_eq!(NavigateTool.schema().parameters["required"], json!(["url"]));
    }

    #[test]
    fn test_navigate_accepts_huge_wait_time() {
        let params = json!({"url": "http://a", "wait_for_element": "#x", "wait_time": u64::MAX});
        assert!(NavigateTool.validate(&params).is_ok());
        let req: NavigateRequest = parse_params(&params).unwrap();
        assert_eq!(req.wait_time, u64::MAX);
    }

    #[test]
    fn test_validate() {
        assert!(WebSearchTool.validate(&json!({"query": "rust lang"})).is_ok());
        assert!(WebSearchTool.validate(&json!({})).is_err());
        assert!(WebSearchTool.validate(&json!({"query": "q", "max_results": -1})).is_err());

        assert!(NavigateTool.validate(&json!({"url": "https://example.com"})).is_ok());
        assert!(NavigateTool.validate(&json!({"url": "https://example.com", "wait_time": "ten"})).is_err());

        assert!(ExtractContentTool.validate(&json!({})).is_ok());
        assert!(ExtractContentTool.validate(&Value::Null).is_ok());

        assert!(SummarizeTool.validate(&json!({"text": "t"})).is_ok());
        assert!(SummarizeTool.validate(&json!({"text": "t", "max_tokens": 0})).is_err());
        assert!(SummarizeTool.validate(&json!({"text": ""})).is_ok());
        assert!(SummarizeTool.validate(&json!({})).is_err());
        assert!(SummarizeTool.validate(&json!({"text": 5})).is_err());

        assert!(GetPageContentTool.validate(&json!({})).is_err());
        assert!(CloseBrowserTool.validate(&json!({})).is_ok());
    }

    #[test]
    fn test_request_defaults() {
        let req: NavigateRequest = parse_params(&json!({"url": "http://a"})).unwrap();
        assert_eq!(req.wait_time, 10);
        assert!(req.wait_for_element.is_none());

        let req: SummarizeRequest = parse_params(&json!({"text": "t"})).unwrap();
        assert_eq!(req.max_tokens, 200);
    }

    #[tokio::test]
    async fn test_web_search_output_shape() {
        let (ctx, world) = ctx_with(Summarizer::disabled());
        world.site(
            &search_url("rust"),
            Some(200),
            &search_page(r#"{"results": [{"title":"Rust","url":"https://rust-lang.org","content":"A language"}]}"#),
        );

        let out = WebSearchTool
            .execute(ctx, json!({"query": "rust"}))
            .await
            .unwrap();
        assert_eq!(
            out,
            json!({"results": [{"title": "Rust", "url": "https://rust-lang.org", "snippet": "A language"}]})
        );
    }

    #[tokio::test]
    async fn test_navigate_output_and_fault() {
        let (ctx, world) = ctx_with(Summarizer::disabled());
        world.site("http://a.test", Some(404), "<p>gone</p>");

        let out = NavigateTool
            .execute(ctx.clone(), json!({"url": "http://a.test"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"status": "success", "message": "Navigated to http://a.test"}));

        let err = NavigateTool
            .execute(ctx, json!({"url": "http://a.test", "wait_for_element": "#x", "wait_time": 1}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'#x'"));
    }

    #[tokio::test]
    async fn test_get_page_content_and_close() {
        let (ctx, world) = ctx_with(Summarizer::disabled());
        world.site("http://a.test", Some(200), "<body><h1>Hi</h1><script>x()</script></body>");

        let out = GetPageContentTool
            .execute(ctx.clone(), json!({"url": "http://a.test"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"url": "http://a.test", "content": "Hi"}));

        let out = CloseBrowserTool.execute(ctx.clone(), json!({})).await.unwrap();
        assert_eq!(out["message"], "Browser closed successfully");

        let err = ExtractContentTool.execute(ctx, json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "No page loaded. Navigate to a URL first.");
        assert_eq!(world.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_summarize_without_engine_leaves_session_alone() {
        let (ctx, world) = ctx_with(Summarizer::disabled());
        let err = SummarizeTool
            .execute(ctx, json!({"text": "some text"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SummarizerUnavailable(_)));
        assert_eq!(world.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_summarize_with_engine() {
        let (ctx, _world) = ctx_with(Summarizer::new(Some(Arc::new(EchoEngine))));
        let out = SummarizeTool
            .execute(ctx, json!({"text": "some text", "max_tokens": 42}))
            .await
            .unwrap();
        assert_eq!(out, json!({"summary": "42 tokens"}));
    }
}
