//! The page acquisition seam used by the pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{BrowserEngineConfig, BrowserFetcher, FetchError, HttpClient, PaginationConfig, RetryPolicy};

/// How a page should be acquired.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchMode {
    /// A single HTTP GET; the raw response body is the markup.
    Plain,
    /// Render in a browser, optionally scroll-paginating first.
    Rendered { paginate: Option<PaginationConfig> },
}

/// Turns a URL into page markup.
#[async_trait]
pub trait PageAcquirer: Send {
    async fn fetch(&mut self, url: &str, mode: &FetchMode) -> Result<String, FetchError>;

    /// Release any long-lived resources (browser processes).
    async fn close(&mut self) {}
}

/// Production acquirer: reqwest for plain pages, chromiumoxide for rendered ones.
pub struct WebAcquirer {
    http: HttpClient,
    browser: Arc<Mutex<BrowserFetcher>>,
    retry: RetryPolicy,
}

impl WebAcquirer {
    pub fn new(config: BrowserEngineConfig, retry: RetryPolicy) -> Result<Self, FetchError> {
        let http = HttpClient::new(
            Duration::from_secs(config.timeout),
            config.user_agent.as_deref(),
        )?;
        Ok(Self {
            http,
            browser: Arc::new(Mutex::new(BrowserFetcher::new(config))),
            retry,
        })
    }
}

#[async_trait]
impl PageAcquirer for WebAcquirer {
    async fn fetch(&mut self, url: &str, mode: &FetchMode) -> Result<String, FetchError> {
        info!("Fetching {} ({:?})", url, mode);
        match mode {
            FetchMode::Plain => {
                let http = self.http.clone();
                self.retry
                    .run(url, FetchError::is_retryable, move || {
                        let http = http.clone();
                        async move { http.get_text(url).await }
                    })
                    .await
            }
            FetchMode::Rendered { paginate } => {
                let browser = self.browser.clone();
                let paginate = paginate.as_ref();
                self.retry
                    .run(url, FetchError::is_retryable, move || {
                        let browser = browser.clone();
                        async move { browser.lock().await.fetch(url, paginate).await }
                    })
                    .await
            }
        }
    }

    async fn close(&mut self) {
        self.browser.lock().await.close().await;
    }
}
