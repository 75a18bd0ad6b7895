pub mod config_cmd;
pub mod doctor;
pub mod run_cmd;
pub mod serve;
pub mod tools_cmd;

use std::sync::Arc;
use webtools_core::{Config, Paths};
use webtools_tools::browser::{BrowserSession, CdpDriver, SessionOptions};
use webtools_tools::{Summarizer, ToolContext};

/// File configuration with `.env` and environment overrides applied.
pub fn load_config(paths: &Paths) -> anyhow::Result<Config> {
    Ok(Config::load_or_default(paths)?.with_env())
}

/// Composition root: one browser session and one summarizer for the whole process.
pub fn build_context(config: Config, paths: &Paths) -> anyhow::Result<ToolContext> {
    paths.ensure_dirs()?;

    let driver = CdpDriver::new(paths.browser_profiles_dir());
    let session = BrowserSession::new(Arc::new(driver), SessionOptions::from_config(&config));
    let summarizer = Summarizer::from_config(&config);

    Ok(ToolContext::new(config, Arc::new(session), Arc::new(summarizer)))
}
