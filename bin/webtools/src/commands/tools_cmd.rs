use webtools_tools::ToolRegistry;

pub async fn list() -> anyhow::Result<()> {
    let registry = ToolRegistry::with_defaults();
    let schemas = registry.schemas();

    println!();
    println!("🔧 Available tools ({})", schemas.len());
    println!();
    for schema in &schemas {
        println!("  {:<18} {}", schema.name, first_sentence(schema.description));
    }
    println!();
    println!("  Use `webtools tools info <name>` for parameters.");
    Ok(())
}

pub async fn info(name: &str) -> anyhow::Result<()> {
    let registry = ToolRegistry::with_defaults();
    let tool = registry
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
    let schema = tool.schema();

    println!();
    println!("🔧 {}", schema.name);
    println!();
    println!("  {}", schema.description);
    println!();

    let required: Vec<&str> = schema.parameters["required"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    match schema.parameters["properties"].as_object() {
        Some(props) if !props.is_empty() => {
            println!("  Parameters:");
            for (param, spec) in props {
                let ty = spec["type"].as_str().unwrap_or("any");
                let marker = if required.contains(&param.as_str()) { "*" } else { " " };
                let desc = spec["description"].as_str().unwrap_or("");
                println!("   {}{:<18} {:<8} {}", marker, param, ty, desc);
            }
            println!();
            println!("  * required");
        }
        _ => println!("  No parameters."),
    }
    Ok(())
}

fn first_sentence(text: &str) -> &str {
    match text.find(". ") {
        Some(i) => &text[..=i],
        None => text,
    }
}
