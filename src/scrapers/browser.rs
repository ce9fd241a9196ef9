//! Browser-based fetcher for script-rendered case listings.
//!
//! Uses chromiumoxide (CDP) to render pages that build their record lists
//! client-side, optionally driving [`PaginationController`] against the live
//! page before the final markup is captured.

#[cfg(any(feature = "browser", test))]
use std::future::Future;
#[cfg(any(feature = "browser", test))]
use std::time::Duration;

use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

use super::pagination::PaginationConfig;
#[cfg(feature = "browser")]
use super::pagination::{PaginationController, ScrollSurface};
#[cfg(feature = "browser")]
use super::resolve_user_agent;
use super::FetchError;

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Apply stealth patches after the page loads.
    #[serde(default = "default_stealth")]
    pub stealth: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Page load and plain request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Wait for this CSS selector before considering page loaded.
    #[serde(default)]
    pub wait_for_selector: Option<String>,

    /// User agent: unset for the casewatch agent, "impersonate" for a real browser one.
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_stealth() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> Option<String> {
    Some("impersonate".to_string())
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            stealth: default_stealth(),
            proxy: None,
            timeout: default_timeout(),
            wait_for_selector: None,
            user_agent: default_user_agent(),
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

#[cfg(feature = "browser")]
const STEALTH_SCRIPTS: &[&str] = &[
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['zh-TW', 'zh', 'en-US', 'en'],
        configurable: true
    });
    "#,
];

#[cfg(feature = "browser")]
fn browser_err(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// Run one browser call with a deadline. Expiry is a timeout on `url`.
#[cfg(any(feature = "browser", test))]
async fn bounded<T, E, F>(limit: Duration, url: &str, call: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FetchError::Browser(e.to_string())),
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

/// Browser-based fetcher.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    browser: Option<Browser>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            browser: None,
        }
    }

    fn find_chrome() -> Result<std::path::PathBuf, FetchError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &["google-chrome", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(FetchError::Browser(
            "Chrome/Chromium not found; install it or set browser.remote_url".to_string(),
        ))
    }

    /// Launch or connect to browser if not already running.
    async fn ensure_browser(&mut self) -> Result<&Browser, FetchError> {
        if self.browser.is_none() {
            let browser = match self.config.remote_url.clone() {
                Some(remote_url) => Self::connect_remote(&remote_url).await?,
                None => self.launch().await?,
            };
            self.browser = Some(browser);
        }

        self.browser
            .as_ref()
            .ok_or_else(|| FetchError::Browser("browser unavailable".to_string()))
    }

    async fn launch(&self) -> Result<Browser, FetchError> {
        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder().chrome_executable(Self::find_chrome()?);
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(browser_err)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn connect_remote(url: &str) -> Result<Browser, FetchError> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::get(&version_url)
            .await
            .map_err(|e| FetchError::network(&version_url, e))?
            .json()
            .await
            .map_err(|e| FetchError::network(&version_url, e))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FetchError::Browser("No webSocketDebuggerUrl in response".into()))?;

        let (browser, mut handler) = Browser::connect(ws_url).await.map_err(browser_err)?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Render `url`, optionally scroll-paginate it, and return the final markup.
    ///
    /// Every CDP call is bounded by the configured timeout and the page is
    /// closed on every exit path once it exists.
    pub async fn fetch(
        &mut self,
        url: &str,
        paginate: Option<&PaginationConfig>,
    ) -> Result<String, FetchError> {
        let timeout = Duration::from_secs(self.config.timeout);
        let user_agent = resolve_user_agent(self.config.user_agent.as_deref());
        let stealth = self.config.stealth;
        let wait_for = self.config.wait_for_selector.clone();

        let browser = self.ensure_browser().await?;
        let page = bounded(timeout, url, browser.new_page("about:blank")).await?;

        let result = Self::render(
            &page,
            url,
            timeout,
            &user_agent,
            stealth,
            wait_for.as_deref(),
            paginate,
        )
        .await;

        if let Err(e) = bounded(timeout, url, page.close()).await {
            debug!("Page close failed: {}", e);
        }
        result
    }

    async fn render(
        page: &Page,
        url: &str,
        timeout: Duration,
        user_agent: &str,
        stealth: bool,
        wait_for: Option<&str>,
        paginate: Option<&PaginationConfig>,
    ) -> Result<String, FetchError> {
        bounded(
            timeout,
            url,
            page.execute(SetUserAgentOverrideParams::new(user_agent)),
        )
        .await?;

        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| FetchError::Browser(format!("Invalid URL {}: {}", url, e)))?;
        let navigation = async {
            page.execute(nav_params).await?;
            page.wait_for_navigation().await.map(|_| ())
        };
        bounded(timeout, url, navigation).await?;

        if stealth {
            for script in STEALTH_SCRIPTS {
                if let Err(e) = bounded(timeout, url, page.evaluate(script.to_string())).await {
                    debug!("Stealth script injection skipped: {}", e);
                }
            }
        }

        if let Some(selector) = wait_for {
            debug!("Waiting for selector: {}", selector);
            match bounded(timeout, url, page.find_element(selector)).await {
                Ok(_) => debug!("Selector found"),
                Err(e) => warn!("Selector not ready: {}", e),
            }
        }

        if let Some(pagination) = paginate {
            let mut surface = PageScrollSurface::new(
                page.clone(),
                url,
                timeout,
                &pagination.record_probe_selector,
            );
            PaginationController::new(pagination.clone())
                .run(&mut surface)
                .await;
        }

        bounded(timeout, url, page.content()).await
    }

    /// Close the browser.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
        }
    }
}

/// [`ScrollSurface`] backed by a live CDP page.
#[cfg(feature = "browser")]
struct PageScrollSurface {
    page: Page,
    url: String,
    timeout: Duration,
    count_script: String,
}

#[cfg(feature = "browser")]
impl PageScrollSurface {
    fn new(page: Page, url: &str, timeout: Duration, probe_selector: &str) -> Self {
        let selector = serde_json::to_string(probe_selector).unwrap_or_else(|_| "\"*\"".into());
        Self {
            page,
            url: url.to_string(),
            timeout,
            count_script: format!("document.querySelectorAll({}).length", selector),
        }
    }

    async fn number(&self, script: &str) -> Result<f64, FetchError> {
        bounded(self.timeout, &self.url, self.page.evaluate(script.to_string()))
            .await?
            .into_value::<f64>()
            .map_err(browser_err)
    }

    async fn run(&self, script: &str) -> Result<(), FetchError> {
        bounded(self.timeout, &self.url, self.page.evaluate(script.to_string()))
            .await
            .map(|_| ())
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl ScrollSurface for PageScrollSurface {
    async fn viewport_height(&mut self) -> Result<u64, FetchError> {
        Ok(self.number("window.screen.height").await? as u64)
    }

    async fn page_height(&mut self) -> Result<u64, FetchError> {
        Ok(self.number("document.body.scrollHeight").await? as u64)
    }

    async fn scroll_to(&mut self, offset: u64) -> Result<(), FetchError> {
        self.run(&format!("window.scrollTo(0, {})", offset)).await
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), FetchError> {
        self.run("window.scrollTo(0, document.body.scrollHeight)").await
    }

    async fn record_count(&mut self) -> Result<usize, FetchError> {
        let script = self.count_script.clone();
        Ok(self.number(&script).await? as usize)
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    _config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { _config: config }
    }

    pub async fn fetch(
        &mut self,
        _url: &str,
        _paginate: Option<&PaginationConfig>,
    ) -> Result<String, FetchError> {
        Err(FetchError::Browser(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }

    pub async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: BrowserEngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, BrowserEngineConfig::default());
        assert!(config.headless);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.user_agent.as_deref(), Some("impersonate"));
    }

    #[tokio::test]
    async fn test_bounded_call_that_never_answers_times_out() {
        let hung = std::future::pending::<Result<String, String>>();
        let err = bounded(Duration::from_millis(20), "https://cases.example", hung)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Timeout { ref url, secs: 0 } if url == "https://cases.example"
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bounded_call_passes_through_result() {
        let ok = bounded(Duration::from_secs(1), "u", async { Ok::<_, String>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed = bounded(Duration::from_secs(1), "u", async {
            Err::<(), _>("target closed".to_string())
        })
        .await;
        assert!(matches!(failed, Err(FetchError::Browser(ref m)) if m == "target closed"));
    }
}
