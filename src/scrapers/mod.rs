//! Page acquisition: plain HTTP fetches, browser rendering and scroll-driven
//! pagination.

pub mod acquirer;
pub mod browser;
mod error;
mod http_client;
pub mod pagination;
pub mod retry;

pub use acquirer::{FetchMode, PageAcquirer, WebAcquirer};
pub use browser::{BrowserEngineConfig, BrowserFetcher};
pub use error::FetchError;
pub use http_client::{resolve_user_agent, HttpClient, USER_AGENT};
pub use pagination::{
    PaginationConfig, PaginationController, PaginationReport, PaginationState, ScrollSurface,
    StopReason,
};
pub use retry::RetryPolicy;
