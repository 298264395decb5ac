//! Utility functions and helpers.
//!
//! Shared plumbing for every remote source: token buckets, the proxy
//! rotator, the cached HTTP fetcher and URL helpers.

pub mod cache;
pub mod http;
pub mod limiter;
pub mod proxy;
#[cfg(test)]
pub(crate) mod stub_server;
pub mod url;

pub use cache::DiskCache;
pub use http::{FetchOptions, Fetcher};
pub use limiter::{Limiters, RateLimiter};
pub use proxy::{ProxyRotator, Tunnel};

use scraper::Selector;

use crate::error::{AppError, Result};

/// Parse a CSS selector, mapping failure to [`AppError::Selector`].
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::selector(css, format!("{e:?}")))
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
