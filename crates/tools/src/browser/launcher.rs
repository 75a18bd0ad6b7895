//! Chrome DevTools Protocol implementation of the driver traits.
//!
//! Launches a local Chrome/Chromium with remote debugging enabled, keeps a
//! browser-level CDP connection for context and target management, and opens
//! a dedicated page-level connection for each page.

use super::cdp::CdpClient;
use super::driver::{
    BrowserDriver, BrowserProcess, BrowsingContext, ContextOptions, LaunchOptions, PageHandle,
    PageResponse, WaitUntil,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use webtools_core::{Error, Result};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn cdp_err(e: String) -> Error {
    Error::Browser(format!("CDP: {}", e))
}

/// Launches Chrome processes driven over CDP.
pub struct CdpDriver {
    /// Parent directory for throwaway user-data dirs.
    profiles_dir: PathBuf,
}

impl CdpDriver {
    pub fn new(profiles_dir: PathBuf) -> Self {
        Self { profiles_dir }
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Box<dyn BrowserProcess>> {
        let browser_path = find_browser_binary(opts.executable.as_deref())
            .ok_or_else(|| Error::NotFound("Chrome/Chromium not found. Please install it or set CHROME_PATH.".to_string()))?;

        let debug_port = find_free_port().await.map_err(cdp_err)?;
        let user_data_dir = self
            .profiles_dir
            .join(format!("profile-{}-{}", std::process::id(), debug_port));
        std::fs::create_dir_all(&user_data_dir)?;

        let args = build_browser_args(opts, debug_port, &user_data_dir);

        info!(
            browser = %browser_path,
            port = debug_port,
            headless = opts.headless,
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", browser_path, e)))?;

        let mut process = CdpBrowser {
            child,
            cdp: None,
            debug_port,
            user_data_dir,
        };

        let ws_url = match wait_for_cdp_ready(debug_port, opts.startup_timeout).await {
            Ok(url) => url,
            Err(e) => {
                process.kill().await;
                return Err(cdp_err(e));
            }
        };
        match CdpClient::connect(&ws_url).await {
            Ok(cdp) => process.cdp = Some(Arc::new(cdp)),
            Err(e) => {
                process.kill().await;
                return Err(cdp_err(e));
            }
        }

        debug!(ws_url = %ws_url, "CDP connection established (browser target)");
        Ok(Box::new(process))
    }
}

/// Build Chrome command line arguments.
fn build_browser_args(opts: &LaunchOptions, debug_port: u16, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--safebrowsing-disable-auto-update".to_string(),
        "--password-store=basic".to_string(),
    ];
    args.extend(opts.args.iter().cloned());
    if opts.headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// A running Chrome process plus its browser-level CDP connection.
struct CdpBrowser {
    child: Child,
    cdp: Option<Arc<CdpClient>>,
    debug_port: u16,
    user_data_dir: PathBuf,
}

impl CdpBrowser {
    fn client(&self) -> Result<&Arc<CdpClient>> {
        self.cdp
            .as_ref()
            .ok_or_else(|| Error::Browser("Browser connection is closed".to_string()))
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(dir = %self.user_data_dir.display(), "Could not remove profile dir: {}", e);
        }
    }
}

#[async_trait]
impl BrowserProcess for CdpBrowser {
    async fn new_context(&self, opts: &ContextOptions) -> Result<Box<dyn BrowsingContext>> {
        let browser = self.client()?.clone();
        let context_id = browser.create_browser_context().await.map_err(cdp_err)?;
        debug!(context_id = %context_id, "Created browser context");
        Ok(Box::new(CdpContext {
            browser,
            debug_port: self.debug_port,
            context_id,
            opts: opts.clone(),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(cdp) = self.cdp.take() {
            // Try graceful close via CDP first
            if let Err(e) = cdp.close_browser().await {
                debug!("CDP Browser.close failed (may already be closed): {}", e);
            }
        }
        self.kill().await;
        Ok(())
    }
}

impl Drop for CdpBrowser {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

struct CdpContext {
    browser: Arc<CdpClient>,
    debug_port: u16,
    context_id: String,
    opts: ContextOptions,
}

#[async_trait]
impl BrowsingContext for CdpContext {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let target_id = self
            .browser
            .create_target("about:blank", Some(&self.context_id))
            .await
            .map_err(cdp_err)?;

        let page_ws_url = get_target_ws_url(self.debug_port, &target_id)
            .await
            .map_err(cdp_err)?;
        let cdp = CdpClient::connect(&page_ws_url).await.map_err(cdp_err)?;

        let page = CdpPage {
            browser: self.browser.clone(),
            cdp,
            target_id,
        };
        page.prepare(&self.opts).await.map_err(cdp_err)?;

        debug!(target_id = %page.target_id, "CDP connection established (page target)");
        Ok(Box::new(page))
    }

    async fn close(&mut self) -> Result<()> {
        self.browser
            .dispose_browser_context(&self.context_id)
            .await
            .map_err(cdp_err)
    }
}

struct CdpPage {
    browser: Arc<CdpClient>,
    cdp: CdpClient,
    target_id: String,
}

impl CdpPage {
    /// Enable the domains the page needs and apply the context settings.
    async fn prepare(&self, opts: &ContextOptions) -> std::result::Result<(), String> {
        self.cdp.enable_domain("Page").await?;
        self.cdp.enable_domain("Runtime").await?;
        self.cdp.enable_domain("Network").await?;
        self.cdp
            .send_command("Page.setLifecycleEventsEnabled", json!({"enabled": true}))
            .await?;

        self.cdp
            .set_viewport(opts.viewport_width, opts.viewport_height)
            .await?;
        self.cdp
            .set_user_agent(&opts.user_agent, opts.header("Accept-Language"))
            .await?;

        let headers: Map<String, Value> = opts
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.cdp.set_extra_headers(Value::Object(headers)).await?;

        self.cdp
            .set_script_execution_disabled(!opts.javascript_enabled)
            .await?;
        self.cdp.set_bypass_csp(opts.bypass_csp).await?;
        if opts.ignore_https_errors {
            // Older headless builds lack the Security domain; not fatal.
            if let Err(e) = self.cdp.set_ignore_certificate_errors(true).await {
                warn!("Could not disable certificate checks: {}", e);
            }
        }
        Ok(())
    }

    async fn selector_present(&self, selector: &str) -> Result<bool> {
        let quoted = serde_json::to_string(selector)?;
        let result = self
            .cdp
            .evaluate_js(&format!("!!document.querySelector({})", quoted))
            .await
            .map_err(cdp_err)?;
        Ok(result
            .pointer("/result/value")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.cdp
            .add_script_on_new_document(source)
            .await
            .map_err(cdp_err)
    }

    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<Option<PageResponse>> {
        // Subscribe before navigating so no event is missed.
        let mut responses = self.cdp.subscribe_event("Network.responseReceived").await;
        let mut lifecycle = self.cdp.subscribe_event("Page.lifecycleEvent").await;

        let nav = self.cdp.navigate(url).await.map_err(cdp_err)?;
        let Some(mut tracker) = NavigationTracker::start(&nav, url, wait_until)? else {
            return Ok(None);
        };

        let wait = async {
            loop {
                tokio::select! {
                    Some(ev) = responses.recv() => tracker.on_response(&ev),
                    Some(ev) = lifecycle.recv() => {
                        if tracker.on_lifecycle(&ev) {
                            return tracker.status;
                        }
                    }
                    else => return tracker.status,
                }
            }
        };

        let status = tokio::time::timeout(timeout, wait).await.map_err(|_| {
            Error::Timeout(format!(
                "Navigation to {} exceeded {}ms waiting for {}",
                url,
                timeout.as_millis(),
                wait_until.lifecycle_event()
            ))
        })?;

        Ok(status.map(|s| PageResponse { status: s as u16 }))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = deadline_after(timeout);
        loop {
            if self.selector_present(selector).await? {
                return Ok(());
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Err(Error::Timeout(format!(
                    "waiting for selector '{}' exceeded {}ms",
                    selector,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String> {
        let result = self
            .cdp
            .evaluate_js("document.documentElement ? document.documentElement.outerHTML : ''")
            .await
            .map_err(cdp_err)?;
        Ok(result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string())
    }

    async fn close(&mut self) -> Result<()> {
        self.browser
            .close_target(&self.target_id)
            .await
            .map_err(cdp_err)
    }
}

/// Deadline `timeout` from now, `None` when it does not fit in an `Instant`.
fn deadline_after(timeout: Duration) -> Option<tokio::time::Instant> {
    tokio::time::Instant::now().checked_add(timeout)
}

/// Follows the CDP events of one `Page.navigate` call.
///
/// Only events carrying the navigation's `loaderId` count, so iframes and
/// earlier loads are ignored. The status is taken from the main document
/// response; a redirect chain ends on the last one.
#[derive(Debug)]
struct NavigationTracker {
    loader_id: String,
    wanted: &'static str,
    status: Option<u64>,
}

impl NavigationTracker {
    /// `Ok(None)` for a same-document navigation, which fetches nothing.
    fn start(nav: &Value, url: &str, wait_until: WaitUntil) -> Result<Option<Self>> {
        if let Some(err) = nav.get("errorText").and_then(|v| v.as_str()) {
            return Err(Error::Browser(format!("{} at {}", err, url)));
        }
        Ok(nav
            .get("loaderId")
            .and_then(|v| v.as_str())
            .map(|loader_id| Self {
                loader_id: loader_id.to_string(),
                wanted: wait_until.lifecycle_event(),
                status: None,
            }))
    }

    fn same_load(&self, ev: &Value) -> bool {
        ev.get("loaderId").and_then(|v| v.as_str()) == Some(self.loader_id.as_str())
    }

    /// `Network.responseReceived`.
    fn on_response(&mut self, ev: &Value) {
        let is_document = ev.get("type").and_then(|v| v.as_str()) == Some("Document");
        if self.same_load(ev) && is_document {
            self.status = ev.pointer("/response/status").and_then(|v| v.as_u64());
        }
    }

    /// `Page.lifecycleEvent`. True once the awaited event has fired.
    fn on_lifecycle(&self, ev: &Value) -> bool {
        self.same_load(ev) && ev.get("name").and_then(|v| v.as_str()) == Some(self.wanted)
    }
}

/// Find a Chrome/Chromium binary. An explicit path or name wins when it resolves.
pub fn find_browser_binary(explicit: Option<&str>) -> Option<String> {
    if let Some(path) = explicit {
        if Path::new(path).exists() || which::which(path).is_ok() {
            return Some(path.to_string());
        }
        warn!(path = %path, "Configured browser executable not found, falling back to auto-detection");
    }

    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome", "google-chrome-stable",
            "chromium", "chromium-browser",
            "/usr/bin/google-chrome", "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port.
async fn find_free_port() -> std::result::Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("Failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Wait for Chrome's CDP endpoint to become available.
/// Polls /json/version until it responds, up to `timeout`.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> std::result::Result<String, String> {
    let start = std::time::Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout.as_secs(),
                port
            ));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve a targetId to its WebSocket debugger URL via /json/list.
async fn get_target_ws_url(port: u16, target_id: &str) -> std::result::Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        if let Some(ws_url) = find_target_ws_url(&targets, target_id) {
            return Ok(ws_url);
        }
    }

    Err(format!(
        "No WebSocket URL found for targetId '{}' after retries",
        target_id
    ))
}

/// `/json/list` reports the target id as `id`; some builds also use `targetId`.
fn find_target_ws_url(targets: &[Value], target_id: &str) -> Option<String> {
    targets
        .iter()
        .find(|t| {
            t.get("id").and_then(|v| v.as_str()) == Some(target_id)
                || t.get("targetId").and_then(|v| v.as_str()) == Some(target_id)
        })
        .and_then(|t| t.get("webSocketDebuggerUrl"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_args() {
        let opts = LaunchOptions {
            executable: None,
            headless: true,
            args: vec!["--no-sandbox".to_string()],
            startup_timeout: Duration::from_secs(1),
        };
        let args = build_browser_args(&opts, 9333, Path::new("/tmp/profile"));
        assert_eq!(args[0], "--remote-debugging-port=9333");
        assert_eq!(args[1], "--user-data-dir=/tmp/profile");
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        let headed = LaunchOptions { headless: false, ..opts };
        let args = build_browser_args(&headed, 9333, Path::new("/tmp/profile"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_find_target_ws_url() {
        let targets = vec![
            json!({"id": "A", "type": "page", "webSocketDebuggerUrl": "ws://x/a"}),
            json!({"id": "B", "type": "page", "webSocketDebuggerUrl": "ws://x/b"}),
        ];
        assert_eq!(find_target_ws_url(&targets, "B").as_deref(), Some("ws://x/b"));
        assert!(find_target_ws_url(&targets, "C").is_none());
    }

    #[test]
    fn test_deadline_after_huge_timeout_does_not_overflow() {
        assert!(deadline_after(Duration::from_secs(10)).is_some());
        assert!(deadline_after(Duration::from_secs(u64::MAX)).is_none());
    }

    fn nav(loader_id: &str) -> Value {
        json!({"frameId": "F1", "loaderId": loader_id})
    }

    fn response(loader_id: &str, kind: &str, status: u64) -> Value {
        json!({"loaderId": loader_id, "type": kind, "response": {"status": status}})
    }

    fn lifecycle_event(loader_id: &str, name: &str) -> Value {
        json!({"loaderId": loader_id, "name": name})
    }

    #[test]
    fn test_tracker_takes_main_document_status() {
        let mut t = NavigationTracker::start(&nav("L1"), "http://a", WaitUntil::DomContentLoaded)
            .unwrap()
            .unwrap();
        // Subresources and iframe documents have another type or loader.
        t.on_response(&response("L1", "Script", 404));
        t.on_response(&response("L9", "Document", 500));
        t.on_response(&response("L1", "Document", 200));
        assert!(!t.on_lifecycle(&lifecycle_event("L9", "DOMContentLoaded")));
        assert!(!t.on_lifecycle(&lifecycle_event("L1", "load")));
        assert!(t.on_lifecycle(&lifecycle_event("L1", "DOMContentLoaded")));
        assert_eq!(t.status, Some(200));
    }

    #[test]
    fn test_tracker_redirect_keeps_last_document() {
        let mut t = NavigationTracker::start(&nav("L1"), "http://a", WaitUntil::NetworkIdle)
            .unwrap()
            .unwrap();
        t.on_response(&response("L1", "Document", 301));
        t.on_response(&response("L1", "Document", 404));
        assert!(!t.on_lifecycle(&lifecycle_event("L1", "DOMContentLoaded")));
        assert!(t.on_lifecycle(&lifecycle_event("L1", "networkIdle")));
        assert_eq!(t.status, Some(404));
    }

    #[test]
    fn test_tracker_without_response_has_no_status() {
        let t = NavigationTracker::start(&nav("L1"), "http://a", WaitUntil::DomContentLoaded)
            .unwrap()
            .unwrap();
        assert!(t.on_lifecycle(&lifecycle_event("L1", "DOMContentLoaded")));
        assert_eq!(t.status, None);
    }

    #[test]
    fn test_tracker_start_error_and_same_document() {
        let err = NavigationTracker::start(
            &json!({"frameId": "F1", "loaderId": "L1", "errorText": "net::ERR_NAME_NOT_RESOLVED"}),
            "http://nowhere.test",
            WaitUntil::DomContentLoaded,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Browser error: net::ERR_NAME_NOT_RESOLVED at http://nowhere.test"
        );

        let same_doc = NavigationTracker::start(&json!({"frameId": "F1"}), "http://a#x", WaitUntil::DomContentLoaded)
            .unwrap();
        assert!(same_doc.is_none());
    }

    #[tokio::test]
    async fn test_find_free_port() {
        let port = find_free_port().await.unwrap();
        assert!(port > 0);
    }

    #[test]
    fn test_explicit_missing_binary_falls_back() {
        // Either auto-detection finds something else, or nothing at all.
        let found = find_browser_binary(Some("/definitely/not/a/chrome"));
        assert_ne!(found.as_deref(), Some("/definitely/not/a/chrome"));
    }
}
