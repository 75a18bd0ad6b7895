//! Browser session lifecycle.
//!
//! One [`BrowserSession`] owns a browser process, one browsing context and a
//! single page. Handles are created lazily on first use, every operation runs
//! under the session lock, and [`BrowserSession::close`] always leaves the
//! session empty so the next operation can rebuild it.

use super::driver::{
    BrowserDriver, BrowserProcess, BrowsingContext, ContextOptions, LaunchOptions, PageHandle,
    WaitUntil, WEBDRIVER_MASK_SCRIPT,
};
use crate::extract::extract_visible_text;
use crate::search::{build_search_url, parse_search_page, SearchResult};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use webtools_core::{Config, Error, Result};

/// Default selector wait used when a caller does not pass one.
pub const DEFAULT_WAIT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub launch: LaunchOptions,
    pub context: ContextOptions,
    pub search_base_url: String,
    pub navigation_timeout: Duration,
    pub search_timeout: Duration,
}

impl SessionOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            launch: LaunchOptions::from_config(&cfg.browser),
            context: ContextOptions::from_config(&cfg.browser),
            search_base_url: cfg.search_base_url().to_string(),
            navigation_timeout: Duration::from_secs(cfg.browser.navigation_timeout_secs),
            search_timeout: Duration::from_secs(cfg.browser.search_timeout_secs),
        }
    }
}

/// Result of a successful [`BrowserSession::navigate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationOutcome {
    pub url: String,
    pub status: u16,
    /// Selector that was awaited, if any.
    pub element: Option<String>,
}

#[derive(Default)]
struct SessionState {
    process: Option<Box<dyn BrowserProcess>>,
    context: Option<Box<dyn BrowsingContext>>,
    page: Option<Box<dyn PageHandle>>,
    /// Last URL loaded into the page since the session was built.
    current_url: Option<String>,
}

impl SessionState {
    fn is_ready(&self) -> bool {
        self.process.is_some() && self.context.is_some() && self.page.is_some()
    }

    fn page(&self) -> Result<&dyn PageHandle> {
        self.page
            .as_deref()
            .ok_or_else(|| Error::Browser("Page is not open".to_string()))
    }
}

/// Clears the in-progress flag on every exit path.
struct InitFlag<'a>(&'a AtomicBool);

impl<'a> InitFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InitFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct BrowserSession {
    driver: Arc<dyn BrowserDriver>,
    opts: SessionOptions,
    state: Mutex<SessionState>,
    initializing: AtomicBool,
}

impl BrowserSession {
    pub fn new(driver: Arc<dyn BrowserDriver>, opts: SessionOptions) -> Self {
        Self {
            driver,
            opts,
            state: Mutex::new(SessionState::default()),
            initializing: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.opts
    }

    /// True while a launch/context/page creation is running.
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    /// True when process, context and page are all open.
    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.is_ready()
    }

    pub async fn current_url(&self) -> Option<String> {
        self.state.lock().await.current_url.clone()
    }

    /// Make sure process, context and page all exist.
    pub async fn ensure_ready(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.init_locked(&mut state).await
    }

    async fn init_locked(&self, state: &mut SessionState) -> Result<()> {
        if state.is_ready() {
            return Ok(());
        }
        let _flag = InitFlag::raise(&self.initializing);

        self.build_missing(state).await.map_err(|e| {
            error!("Browser initialization failed: {}", e);
            Error::Initialization(format!("Failed to initialize browser: {}", e))
        })?;

        info!("Browser session ready");
        Ok(())
    }

    /// Create each absent handle in order. A handle is never kept without its parent.
    async fn build_missing(&self, state: &mut SessionState) -> Result<()> {
        if state.process.is_none() {
            state.context = None;
            state.page = None;
            state.current_url = None;
            debug!("Launching browser process");
            state.process = Some(self.driver.launch(&self.opts.launch).await?);
        }

        if state.context.is_none() {
            state.page = None;
            state.current_url = None;
            let process = state
                .process
                .as_deref()
                .ok_or_else(|| Error::Browser("Browser process is not running".to_string()))?;
            debug!("Creating browsing context");
            state.context = Some(process.new_context(&self.opts.context).await?);
        }

        if state.page.is_none() {
            state.current_url = None;
            let context = state
                .context
                .as_deref()
                .ok_or_else(|| Error::Browser("Browsing context is not open".to_string()))?;
            debug!("Opening page");
            let mut page = context.new_page().await?;
            if let Err(e) = page.add_init_script(WEBDRIVER_MASK_SCRIPT).await {
                if let Err(close_err) = page.close().await {
                    debug!("Closing half-initialized page failed: {}", close_err);
                }
                return Err(e);
            }
            state.page = Some(page);
        }

        Ok(())
    }

    /// Load `url` and optionally wait up to `wait_time_secs` for `wait_for_element`.
    ///
    /// HTTP error statuses are logged, not returned as errors.
    pub async fn navigate(
        &self,
        url: &str,
        wait_for_element: Option<&str>,
        wait_time_secs: u64,
    ) -> Result<NavigationOutcome> {
        let mut state = self.state.lock().await;
        self.navigate_locked(&mut state, url, wait_for_element, wait_time_secs)
            .await
            .map_err(|e| {
                error!(url = %url, "Navigation failed: {}", e);
                Error::Navigation(format!("Failed to navigate to {}: {}", url, e))
            })
    }

    async fn navigate_locked(
        &self,
        state: &mut SessionState,
        url: &str,
        wait_for_element: Option<&str>,
        wait_time_secs: u64,
    ) -> Result<NavigationOutcome> {
        self.init_locked(state).await?;

        info!(url = %url, "Navigating");
        let response = state
            .page()?
            .goto(url, WaitUntil::DomContentLoaded, self.opts.navigation_timeout)
            .await?
            .ok_or_else(|| {
                Error::Navigation(format!("Failed to navigate to {} - no response received", url))
            })?;

        if response.status >= 400 {
            warn!(url = %url, status = response.status, "Page returned an HTTP error status");
        }
        state.current_url = Some(url.to_string());

        if let Some(selector) = wait_for_element {
            debug!(selector = %selector, wait_secs = wait_time_secs, "Waiting for element");
            state
                .page()?
                .wait_for_selector(selector, Duration::from_secs(wait_time_secs))
                .await
                .map_err(|e| {
                    Error::Navigation(format!(
                        "Element '{}' not found on page after {}s: {}",
                        selector, wait_time_secs, e
                    ))
                })?;
        }

        Ok(NavigationOutcome {
            url: url.to_string(),
            status: response.status,
            element: wait_for_element.map(str::to_string),
        })
    }

    /// Query the search backend through the page.
    ///
    /// Never fails: any problem is logged and yields an empty list.
    pub async fn web_search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let mut state = self.state.lock().await;
        match self.search_locked(&mut state, query, max_results).await {
            Ok(results) => {
                info!(query = %query, count = results.len(), "Search completed");
                results
            }
            Err(e) => {
                error!(query = %query, "Search failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn search_locked(
        &self,
        state: &mut SessionState,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>> {
        self.init_locked(state).await?;

        let search_url = build_search_url(&self.opts.search_base_url, query);
        debug!(url = %search_url, "Querying search backend");

        let response = state
            .page()?
            .goto(&search_url, WaitUntil::NetworkIdle, self.opts.search_timeout)
            .await?;
        match response {
            Some(r) if r.status == 200 => {}
            Some(r) => {
                warn!(status = r.status, "Search backend returned a non-200 status");
                return Ok(Vec::new());
            }
            None => {
                warn!("Search backend produced no response");
                return Ok(Vec::new());
            }
        }
        state.current_url = Some(search_url);

        let html = state.page()?.content().await?;
        parse_search_page(&html, max_results)
    }

    /// Visible text of the current page, navigating to `url` first when given.
    pub async fn extract_content(
        &self,
        url: Option<&str>,
        wait_for_element: Option<&str>,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        self.init_locked(&mut state).await?;

        if let Some(url) = url {
            self.navigate_locked(&mut state, url, wait_for_element, DEFAULT_WAIT_SECS)
                .await
                .map_err(|e| Error::Navigation(format!("Failed to navigate to {}: {}", url, e)))?;
        }

        if state.current_url.is_none() {
            return Err(Error::Extraction(
                "No page loaded. Navigate to a URL first.".to_string(),
            ));
        }

        let html = state.page()?.content().await?;
        let text = extract_visible_text(&html);
        info!(chars = text.chars().count(), "Extracted page content");
        Ok(text)
    }

    /// Release page, context and process in that order. Never fails; the
    /// session is empty afterwards either way.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.process.is_none() && state.context.is_none() && state.page.is_none() {
            debug!("Browser session already closed");
            state.current_url = None;
            return;
        }
        info!("Closing browser...");

        let mut clean = true;
        if let Some(mut page) = state.page.take() {
            if let Err(e) = page.close().await {
                error!("Error closing page: {}", e);
                clean = false;
            }
        }
        if let Some(mut context) = state.context.take() {
            if let Err(e) = context.close().await {
                error!("Error closing browsing context: {}", e);
                clean = false;
            }
        }
        if let Some(mut process) = state.process.take() {
            if let Err(e) = process.close().await {
                error!("Error closing browser process: {}", e);
                clean = false;
            }
        }
        state.current_url = None;

        if clean {
            info!("Browser closed successfully");
        } else {
            warn!("Browser closed with errors; session state reset");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_ensure_ready_builds_everything_once() {
        let (session, world) = fake_session();
        assert!(!session.is_ready().await);

        session.ensure_ready().await.unwrap();
        session.ensure_ready().await.unwrap();

        assert!(session.is_ready().await);
        assert_eq!(world.launches.load(Ordering::SeqCst), 1);
        assert_eq!(world.contexts.load(Ordering::SeqCst), 1);
        assert_eq!(world.pages.load(Ordering::SeqCst), 1);
        assert!(!session.is_initializing());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_ready_launches_once() {
        let (session, world) = fake_session();
        world.launch_delay_ms.store(50, Ordering::SeqCst);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = session.clone();
                tokio::spawn(async move { s.ensure_ready().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(world.launches.load(Ordering::SeqCst), 1);
        assert_eq!(world.pages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_init_clears_flag_and_recovers() {
        let (session, world) = fake_session();
        world.fail_launch.store(true, Ordering::SeqCst);

        let err = session.ensure_ready().await.unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
        assert!(err.to_string().starts_with("Failed to initialize browser: "));
        assert!(!session.is_initializing());
        assert!(!session.is_ready().await);

        world.fail_launch.store(false, Ordering::SeqCst);
        session.ensure_ready().await.unwrap();
        assert!(session.is_ready().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_safe_when_never_opened() {
        let (session, world) = fake_session();
        session.close().await;
        session.close().await;
        assert!(world.closed.lock().unwrap().is_empty());

        session.ensure_ready().await.unwrap();
        session.close().await;
        session.close().await;
        assert_eq!(*world.closed.lock().unwrap(), vec!["page", "context", "process"]);
        assert!(!session.is_ready().await);
    }

    #[tokio::test]
    async fn test_close_then_operation_reinitializes() {
        let (session, world) = fake_session();
        world.site("http://a.test", Some(200), "<p>hello</p>");

        session.navigate("http://a.test", None, 10).await.unwrap();
        session.close().await;
        assert!(session.current_url().await.is_none());

        let text = session.extract_content(Some("http://a.test"), None).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(world.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_errors_still_clear_state() {
        let (session, world) = fake_session();
        world.fail_page_close.store(true, Ordering::SeqCst);
        session.ensure_ready().await.unwrap();

        session.close().await;
        assert!(!session.is_ready().await);
        // Remaining handles are still released.
        assert_eq!(*world.closed.lock().unwrap(), vec!["context", "process"]);

        world.fail_page_close.store(false, Ordering::SeqCst);
        session.ensure_ready().await.unwrap();
        assert_eq!(world.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_navigate_success_uses_dom_content_loaded() {
        let (session, world) = fake_session();
        world.site("http://a.test", Some(200), "<p>a</p>");

        let outcome = session.navigate("http://a.test", None, 10).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.element, None);
        assert_eq!(session.current_url().await.as_deref(), Some("http://a.test"));
        assert_eq!(
            world.visited.lock().unwrap()[0],
            (
                "http://a.test".to_string(),
                WaitUntil::DomContentLoaded,
                Duration::from_secs(30)
            )
        );
    }

    #[tokio::test]
    async fn test_configured_timeouts_reach_the_page() {
        let world = Arc::new(FakeWorld::default());
        let mut cfg = Config::default();
        cfg.search.base_url = SEARCH_BASE.to_string();
        cfg.browser.navigation_timeout_secs = 12;
        cfg.browser.search_timeout_secs = 7;
        let session = BrowserSession::new(
            Arc::new(FakeDriver(world.clone())),
            SessionOptions::from_config(&cfg),
        );
        world.site("http://a.test", Some(200), "<p>a</p>");
        world.site(&search_url("q"), Some(200), &search_page(r#"{"results": []}"#));

        session.navigate("http://a.test", None, 10).await.unwrap();
        session.web_search("q", 10).await;

        let visited = world.visited.lock().unwrap();
        assert_eq!(visited[0].2, Duration::from_secs(12));
        assert_eq!(visited[1].2, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_navigate_http_error_is_not_a_fault() {
        let (session, world) = fake_session();
        world.site("http://a.test/missing", Some(500), "<h1>Server Error</h1>");

        let outcome = session.navigate("http://a.test/missing", None, 10).await.unwrap();
        assert_eq!(outcome.status, 500);
    }

    #[tokio::test]
    async fn test_navigate_without_response_faults() {
        let (session, world) = fake_session();
        world.site("http://a.test", None, "");

        let err = session.navigate("http://a.test", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert!(err.to_string().contains("no response received"));
    }

    #[tokio::test]
    async fn test_navigate_missing_selector_names_selector() {
        let (session, world) = fake_session();
        world.site("http://a.test", Some(200), "<p>a</p>");

        let err = session
            .navigate("http://a.test", Some("#never"), 2)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to navigate to http://a.test: "));
        assert!(msg.contains("Element '#never' not found on page after 2s"));
    }

    #[tokio::test]
    async fn test_navigate_present_selector() {
        let (session, world) = fake_session();
        world.site("http://a.test", Some(200), "<div id=\"main\">x</div>");
        world.selectors.lock().unwrap().push("#main".to_string());

        let outcome = session.navigate("http://a.test", Some("#main"), 5).await.unwrap();
        assert_eq!(outcome.element.as_deref(), Some("#main"));
    }

    #[tokio::test]
    async fn test_navigate_init_failure_is_wrapped_with_url() {
        let (session, world) = fake_session();
        world.fail_launch.store(true, Ordering::SeqCst);

        let err = session.navigate("http://a.test", None, 10).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to navigate to http://a.test: Failed to initialize browser"));
    }

    #[tokio::test]
    async fn test_search_single_result() {
        let (session, world) = fake_session();
        world.site(
            &search_url("q"),
            Some(200),
            &search_page(r#"{"results": [{"title":"T","url":"http://u","content":"c"}]}"#),
        );

        let results = session.web_search("q", 10).await;
        assert_eq!(
            results,
            vec![SearchResult {
                title: "T".to_string(),
                url: "http://u".to_string(),
                snippet: "c".to_string(),
            }]
        );
        let visited = world.visited.lock().unwrap();
        assert_eq!(visited[0].1, WaitUntil::NetworkIdle);
        assert_eq!(visited[0].2, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_search_max_results_one() {
        let (session, world) = fake_session();
        world.site(
            &search_url("q"),
            Some(200),
            &search_page(
                r#"{"results": [{"title":"A","url":"http://a","content":""},{"title":"B","url":"http://b","content":""}]}"#,
            ),
        );

        let results = session.web_search("q", 1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "A");
    }

    #[tokio::test]
    async fn test_search_failures_are_empty() {
        let (session, world) = fake_session();
        world.site(&search_url("notfound"), Some(404), "<pre>{\"results\": []}</pre>");
        world.site(&search_url("broken"), Some(200), "<pre>{not json</pre>");
        world.site(&search_url("silent"), None, "");

        assert!(session.web_search("notfound", 10).await.is_empty());
        assert!(session.web_search("broken", 10).await.is_empty());
        assert!(session.web_search("silent", 10).await.is_empty());
        // Unknown host: the fake page returns a network error.
        assert!(session.web_search("unreachable", 10).await.is_empty());

        world.fail_launch.store(true, Ordering::SeqCst);
        session.close().await;
        assert!(session.web_search("notfound", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_extract_without_page_faults() {
        let (session, _world) = fake_session();
        let err = session.extract_content(None, None).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(err.to_string(), "No page loaded. Navigate to a URL first.");
    }

    #[tokio::test]
    async fn test_extract_current_page() {
        let (session, world) = fake_session();
        world.site(
            "http://a.test",
            Some(200),
            "<html><head><title>Test Title</title><script>console.log('x')</script></head>\
             <body><p>Test   content</p><style>p{}</style></body></html>",
        );

        session.navigate("http://a.test", None, 10).await.unwrap();
        let text = session.extract_content(None, None).await.unwrap();
        assert_eq!(text, "Test Title Test content");
    }

    #[tokio::test]
    async fn test_extract_with_url_inherits_navigation_fault() {
        let (session, world) = fake_session();
        world.site("http://a.test", Some(200), "<p>a</p>");

        let err = session
            .extract_content(Some("http://a.test"), Some(".late"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert!(err.to_string().contains("'.late'"));
    }
}
