use std::time::Duration;
use webtools_core::{config::ENV_MODEL_PATH, Paths};
use webtools_tools::browser::find_browser_binary;
use webtools_tools::summarize::resolve_binary;
use webtools_tools::ToolRegistry;

#[derive(Default)]
struct Tally {
    ok: u32,
    warn: u32,
    err: u32,
}

impl Tally {
    fn ok(&mut self, label: &str, detail: &str) {
        print_ok(label, detail);
        self.ok += 1;
    }

    fn warn(&mut self, label: &str, hint: &str) {
        print_warn(label, hint);
        self.warn += 1;
    }

    fn err(&mut self, label: &str, hint: &str) {
        print_err(label, hint);
        self.err += 1;
    }
}

/// Run environment diagnostics for the browser, search backend and LLM.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut tally = Tally::default();

    println!();
    println!("🩺 webtools doctor: Environment Diagnostics");
    println!("================================");
    println!();

    // --- 1. Config ---
    println!("📋 Configuration");
    if paths.config_file().exists() {
        tally.ok("Config file exists", &paths.config_file().display().to_string());
    } else {
        tally.warn("Config file not found", "Using defaults; run `webtools config init` to create one");
    }
    let config = super::load_config(&paths)?;

    match paths.ensure_dirs() {
        Ok(()) => tally.ok("Browser profile directory", &paths.browser_profiles_dir().display().to_string()),
        Err(e) => tally.err("Cannot create browser profile directory", &e.to_string()),
    }
    println!();

    // --- 2. Browser ---
    println!("🌐 Browser");
    match find_browser_binary(config.browser.executable.as_deref()) {
        Some(path) => tally.ok("Chromium-based browser found", &path),
        None => tally.err(
            "No Chrome/Chromium/Edge found",
            "Install Chrome or set CHROME_PATH / browser.executable",
        ),
    }
    println!(
        "  Headless: {}  Viewport: {}x{}",
        config.browser.headless, config.browser.viewport_width, config.browser.viewport_height
    );
    println!();

    // --- 3. Search backend ---
    println!("🔎 Search backend");
    let base = config.search_base_url().to_string();
    match check_reachable(&base).await {
        Ok(status) => tally.ok("Search backend reachable", &format!("{} (HTTP {})", base, status)),
        Err(e) => tally.warn(
            "Search backend unreachable",
            &format!("{}: {}. web_search will return no results", base, e),
        ),
    }
    println!();

    // --- 4. Summarization ---
    println!("🧠 Summarization");
    match config.llm.model_path.as_deref() {
        None => tally.warn(
            "No model configured",
            &format!("Set {} to a GGUF model path to enable summarize", ENV_MODEL_PATH),
        ),
        Some(raw) => match config.model_path() {
            Some(path) => tally.ok("Model file exists", &path.display().to_string()),
            None => tally.err("Model file not found", raw),
        },
    }
    match resolve_binary(&config.llm) {
        Some(path) => tally.ok("llama.cpp binary", &path.display().to_string()),
        None => tally.warn(
            &format!("'{}' not found", config.llm.binary),
            "Install llama.cpp or set LLM_BINARY",
        ),
    }
    println!();

    // --- 5. Tools ---
    println!("🔧 Tools");
    let registry = ToolRegistry::with_defaults();
    tally.ok(
        &format!("{} tools registered", registry.tool_names().len()),
        &registry.tool_names().join(", "),
    );
    println!();

    // --- Summary ---
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  ✅ {} passed  ⚠️  {} warnings  ❌ {} errors",
        tally.ok, tally.warn, tally.err
    );
    println!();
    if tally.err > 0 {
        println!("  {} error(s) must be fixed before normal use.", tally.err);
    } else if tally.warn > 0 {
        println!("  Browser tools OK. Some optional features not ready.");
    } else {
        println!("  🎉 All good!");
    }
    println!();

    Ok(())
}

async fn check_reachable(url: &str) -> anyhow::Result<u16> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let resp = client.get(url).send().await?;
    Ok(resp.status().as_u16())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {}: {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {}: {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {}: {}", label, hint);
    }
}
