use serde_json::Value;
use webtools_core::Paths;
use webtools_tools::ToolRegistry;

/// Run a single tool outside the MCP server, printing its JSON result.
pub async fn tool(tool_name: &str, params_json: &str) -> anyhow::Result<()> {
    let params: Value = serde_json::from_str(params_json)
        .map_err(|e| anyhow::anyhow!("Invalid JSON params: {}", e))?;

    let registry = ToolRegistry::with_defaults();
    if registry.get(tool_name).is_none() {
        anyhow::bail!(
            "Unknown tool: {} (available: {})",
            tool_name,
            registry.tool_names().join(", ")
        );
    }

    let paths = Paths::new();
    let config = super::load_config(&paths)?;
    let ctx = super::build_context(config, &paths)?;

    let result = registry.execute(tool_name, ctx.clone(), params).await;
    ctx.session.close().await;

    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
