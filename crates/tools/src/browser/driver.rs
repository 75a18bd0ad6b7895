//! Automation driver seam.
//!
//! The session manager only talks to these traits. [`super::launcher::CdpDriver`]
//! implements them against a real Chrome; tests plug in in-memory fakes.

use async_trait::async_trait;
use std::time::Duration;
use webtools_core::config::BrowserConfig;
use webtools_core::Result;

/// Chrome flags that hide the most obvious automation fingerprints.
pub const STEALTH_ARGS: [&str; 3] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
];

/// Makes `navigator.webdriver` read as `undefined`.
pub const WEBDRIVER_MASK_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

/// How far a navigation must get before `goto` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    NetworkIdle,
}

impl WaitUntil {
    /// Name of the matching `Page.lifecycleEvent`.
    pub fn lifecycle_event(&self) -> &'static str {
        match self {
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle => "networkIdle",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: Option<String>,
    pub headless: bool,
    pub args: Vec<String>,
    pub startup_timeout: Duration,
}

impl LaunchOptions {
    pub fn from_config(cfg: &BrowserConfig) -> Self {
        Self {
            executable: cfg.executable.clone(),
            headless: cfg.headless,
            args: STEALTH_ARGS.iter().map(|s| s.to_string()).collect(),
            startup_timeout: Duration::from_secs(cfg.startup_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    /// Extra request headers, in send order.
    pub headers: Vec<(String, String)>,
    pub javascript_enabled: bool,
    pub bypass_csp: bool,
    pub ignore_https_errors: bool,
}

impl ContextOptions {
    pub fn from_config(cfg: &BrowserConfig) -> Self {
        let headers = [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("DNT", "1"),
            ("Connection", "keep-alive"),
            ("Upgrade-Insecure-Requests", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            viewport_width: cfg.viewport_width,
            viewport_height: cfg.viewport_height,
            user_agent: cfg.user_agent.clone(),
            headers,
            javascript_enabled: true,
            bypass_csp: true,
            ignore_https_errors: true,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Main-document response observed during a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
}

/// Launches browser processes.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Box<dyn BrowserProcess>>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    async fn new_context(&self, opts: &ContextOptions) -> Result<Box<dyn BrowsingContext>>;
    async fn close(&mut self) -> Result<()>;
}

/// An isolated cookie/storage scope inside a browser process.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;
    async fn close(&mut self) -> Result<()>;
}

/// A single navigable page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn add_init_script(&self, source: &str) -> Result<()>;

    /// Load `url`. `Ok(None)` means the load finished without a main-document response.
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<Option<PageResponse>>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Full serialized markup of the current document.
    async fn content(&self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_options_defaults() {
        let opts = ContextOptions::from_config(&BrowserConfig::default());
        assert_eq!((opts.viewport_width, opts.viewport_height), (1920, 1080));
        assert!(opts.user_agent.contains("Chrome/120.0.0.0"));
        assert_eq!(opts.header("accept-language"), Some("en-US,en;q=0.9"));
        assert_eq!(opts.header("DNT"), Some("1"));
        assert_eq!(opts.headers.len(), 6);
        assert!(opts.javascript_enabled && opts.bypass_csp && opts.ignore_https_errors);
    }

    #[test]
    fn test_launch_options_carry_stealth_args() {
        let opts = LaunchOptions::from_config(&BrowserConfig::default());
        assert!(opts.headless);
        assert!(opts.args.iter().any(|a| a == "--no-sandbox"));
        assert!(opts
            .args
            .iter()
            .any(|a| a == "--disable-blink-features=AutomationControlled"));
        assert_eq!(opts.startup_timeout, Duration::from_secs(15));
    }
}
