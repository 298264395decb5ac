// src/utils/http.rs

//! HTTP client utilities.
//!
//! [`Fetcher`] is the single GET path used by the scrapers. It consults
//! the disk cache first, then dials either directly or through the next
//! proxy tunnel with a randomised user agent.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::cache::DiskCache;
use crate::utils::limiter::RateLimiter;
use crate::utils::proxy::ProxyRotator;

/// Browser user agents rotated per request.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
];

/// Pick a user agent from [`USER_AGENTS`].
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENTS[0])
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Per-call fetch switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Route through the proxy rotator when one is configured
    pub use_proxy: bool,
    /// Read and write the disk cache when one is configured
    pub use_cache: bool,
}

impl FetchOptions {
    /// Options used by the HTML scrapers.
    pub fn scraper() -> Self {
        Self {
            use_proxy: true,
            use_cache: true,
        }
    }
}

/// Cached, optionally proxied GET.
#[derive(Debug, Clone)]
pub struct Fetcher {
    direct: reqwest::Client,
    proxies: Option<Arc<ProxyRotator>>,
    cache: Option<DiskCache>,
}

impl Fetcher {
    pub fn new(
        direct: reqwest::Client,
        proxies: Option<Arc<ProxyRotator>>,
        cache: Option<DiskCache>,
    ) -> Self {
        Self {
            direct,
            proxies,
            cache,
        }
    }

    /// Build the fetcher described by `config`.
    pub fn from_config(config: &Config, proxies: Option<Arc<ProxyRotator>>) -> Result<Self> {
        let cache = config
            .enable_cache
            .then(|| DiskCache::new(&config.cache_dir, config.cache_ttl()));
        Ok(Self::new(
            create_async_client(config.http_timeout())?,
            proxies,
            cache,
        ))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.direct
    }

    pub fn cache(&self) -> Option<&DiskCache> {
        self.cache.as_ref()
    }

    /// GET `url`, returning the body and whether it came from the cache.
    pub async fn fetch(
        &self,
        url: &str,
        opts: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, bool)> {
        if opts.use_cache {
            if let Some(cache) = &self.cache {
                if let Some(body) = cache.get(url).await? {
                    log::debug!("Cache hit: {}", url);
                    return Ok((body, true));
                }
            }
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            result = self.get(url, opts) => result?,
        };

        if opts.use_cache {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put(url, &body).await {
                    log::warn!("Failed to cache {}: {}", url, e);
                }
            }
        }
        Ok((body, false))
    }

    /// Fetch and decode a body as UTF-8 text (lossy).
    pub async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (body, _) = self.fetch(url, opts, cancel).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn get(&self, url: &str, opts: &FetchOptions) -> Result<Vec<u8>> {
        match (&self.proxies, opts.use_proxy) {
            (Some(rotator), true) => {
                let tunnel = rotator.next()?;
                match send(tunnel.client(), url).await {
                    Err(AppError::Http(e)) if e.is_connect() => {
                        rotator.remove(&tunnel);
                        Err(AppError::Proxy(format!("dial via {} failed: {e}", tunnel.name())))
                    }
                    other => other,
                }
            }
            _ => send(&self.direct, url).await,
        }
    }
}

async fn send(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .header(USER_AGENT, random_user_agent())
        .send()
        .await?;
    let status = response.status();
    check_status(url, status)?;
    Ok(response.bytes().await?.to_vec())
}

/// Rate limited JSON GET used by the API adapters.
pub async fn get_json<T>(
    client: &reqwest::Client,
    url: &str,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
) -> Result<T>
where
    T: DeserializeOwned,
{
    limiter.acquire(cancel).await?;
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        response = client.get(url).send() => response?,
    };
    check_status(url, response.status())?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| AppError::parse(url, e))
}

/// Map a response status to the error kinds the queue understands.
pub fn check_status(url: &str, status: StatusCode) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(AppError::RateLimited(url.to_string())),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(url.to_string())),
        s => Err(AppError::Status {
            url: url.to_string(),
            status: s.as_u16(),
        }),
    }
}
