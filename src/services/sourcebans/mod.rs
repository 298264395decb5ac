//! SourceBans scraper.
//!
//! One engine drives every site. A [`SiteProfile`] carries the parsing
//! choices for a site as plain function values, and [`SourceBansScraper`]
//! walks its pages through a small state machine:
//!
//! ```text
//! Visit(url) --fetch--> Parse(url, body) --rows--> sink
//!     ^                        |
//!     +------ next url --------+---- none / empty page ----> Done
//! ```

pub mod parsers;
pub mod sites;
pub mod time;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::Html;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{SbRecord, Site};
use crate::utils::http::{FetchOptions, Fetcher};
use crate::utils::limiter::RateLimiter;

pub use parsers::{NextUrl, RawBan, RowFilter, RowParser};
pub use sites::{all_profiles, profile_for};
pub use time::TimeParser;

/// Parsing choices for one site.
#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub site: Site,
    pub base_url: &'static str,
    pub start_path: &'static str,
    pub row_parser: RowParser,
    pub next_url: NextUrl,
    pub time_parser: TimeParser,
    pub row_filter: Option<RowFilter>,
    /// Floor between page fetches; falls back to the configured delay
    pub sleep_between_pages: Option<Duration>,
}

impl SiteProfile {
    pub fn start_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.base_url, self.start_path))?)
    }
}

/// Destination for the records of one crawled page.
#[async_trait]
pub trait BanSink: Send + Sync {
    /// Store records, returning how many were new.
    async fn store_bans(&self, site: Site, records: &[SbRecord]) -> Result<usize>;
}

/// Outcome of one page parse.
#[derive(Debug, Default)]
pub struct ParsedPage {
    /// Rows found before filtering and validation
    pub rows: usize,
    pub records: Vec<SbRecord>,
    pub next: Option<Url>,
}

/// Totals for one site crawl.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: usize,
    pub rows: usize,
    pub records: usize,
    pub stored: usize,
}

/// Convert a raw row into a record. Rows without a usable id or ban date
/// are logged and dropped.
pub fn build_record(profile: &SiteProfile, raw: RawBan) -> Option<SbRecord> {
    let Some(steam_id) = raw.steam_id else {
        log::warn!(
            "[{}] Skipping row without valid steam id: {:?} ({})",
            profile.site,
            raw.raw_id,
            raw.name
        );
        return None;
    };

    let created_on = match (profile.time_parser)(&raw.invoked_on) {
        Ok(Some(t)) => t,
        Ok(None) => {
            log::warn!("[{}] Skipping {} without ban date", profile.site, steam_id);
            return None;
        }
        Err(e) => {
            log::warn!("[{}] Skipping {}: {}", profile.site, steam_id, e);
            return None;
        }
    };

    let expires_on = match (profile.time_parser)(&raw.expires_on) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("[{}] Bad expiry for {}: {}", profile.site, steam_id, e);
            None
        }
    };

    let permanent = raw.ban_length.to_lowercase().contains("permanent")
        || (expires_on.is_none() && !raw.expires_on.trim().is_empty());

    Some(SbRecord {
        name: raw.name,
        steam_id,
        reason: raw.reason,
        created_on,
        duration: ban_duration(created_on, expires_on, permanent),
        permanent,
    })
}

fn ban_duration(created_on: DateTime<Utc>, expires_on: Option<DateTime<Utc>>, permanent: bool) -> i64 {
    if permanent {
        return 0;
    }
    expires_on
        .map(|e| (e - created_on).num_seconds().max(0))
        .unwrap_or(0)
}

/// Parse one fetched page. Kept synchronous since `Html` is not `Send`.
pub fn parse_page(profile: &SiteProfile, url: &Url, body: &[u8]) -> Result<ParsedPage> {
    let doc = Html::parse_document(&String::from_utf8_lossy(body));
    let rows = (profile.row_parser)(&doc)?;
    let next = (profile.next_url)(&doc, url);

    let total = rows.len();
    let records = rows
        .into_iter()
        .filter(|raw| profile.row_filter.is_none_or(|keep| keep(raw)))
        .filter_map(|raw| build_record(profile, raw))
        .collect();

    Ok(ParsedPage {
        rows: total,
        records,
        next,
    })
}

enum CrawlState {
    Visit(Url),
    Parse { url: Url, body: Vec<u8> },
    Done,
}

/// Shared engine that crawls any [`SiteProfile`].
#[derive(Debug, Clone)]
pub struct SourceBansScraper {
    fetcher: Arc<Fetcher>,
    limiter: Arc<RateLimiter>,
    default_delay: Duration,
}

impl SourceBansScraper {
    pub fn new(fetcher: Arc<Fetcher>, limiter: Arc<RateLimiter>, default_delay: Duration) -> Self {
        Self {
            fetcher,
            limiter,
            default_delay,
        }
    }

    /// Crawl every page of `profile`, handing each page's records to `sink`.
    pub async fn crawl(
        &self,
        profile: &SiteProfile,
        sink: &dyn BanSink,
        cancel: &CancellationToken,
    ) -> Result<CrawlStats> {
        let delay = profile.sleep_between_pages.unwrap_or(self.default_delay);
        let mut visited: HashSet<Url> = HashSet::new();
        let mut stats = CrawlStats::default();
        let mut state = CrawlState::Visit(profile.start_url()?);

        log::info!("[{}] Starting crawl", profile.site);
        loop {
            state = match state {
                CrawlState::Visit(url) => {
                    if !visited.insert(url.clone()) {
                        log::debug!("[{}] Already visited {}", profile.site, url);
                        CrawlState::Done
                    } else {
                        let (body, cached) = self.fetch(&url, cancel).await?;
                        log::debug!(
                            "[{}] Fetched {} ({} bytes, cached: {})",
                            profile.site,
                            url,
                            body.len(),
                            cached
                        );
                        CrawlState::Parse { url, body }
                    }
                }
                CrawlState::Parse { url, body } => {
                    let page = parse_page(profile, &url, &body)?;
                    stats.pages += 1;
                    stats.rows += page.rows;
                    stats.records += page.records.len();

                    if page.records.is_empty() {
                        log::debug!("[{}] No usable rows on {}", profile.site, url);
                        CrawlState::Done
                    } else {
                        stats.stored += sink.store_bans(profile.site, &page.records).await?;
                        match page.next {
                            Some(next) => {
                                tokio::select! {
                                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                                    _ = tokio::time::sleep(delay) => {}
                                }
                                CrawlState::Visit(next)
                            }
                            None => CrawlState::Done,
                        }
                    }
                }
                CrawlState::Done => break,
            };
        }

        log::info!(
            "[{}] Crawl finished: {} pages, {} rows, {} new bans",
            profile.site,
            stats.pages,
            stats.rows,
            stats.stored
        );
        Ok(stats)
    }

    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<(Vec<u8>, bool)> {
        self.limiter.acquire(cancel).await?;
        self.fetcher
            .fetch(url.as_str(), &FetchOptions::scraper(), cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SteamId;
    use crate::utils::cache::DiskCache;
    use crate::utils::http::create_async_client;
    use crate::utils::url::with_query_param;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<SbRecord>>,
    }

    #[async_trait]
    impl BanSink for MemorySink {
        async fn store_bans(&self, _site: Site, records: &[SbRecord]) -> Result<usize> {
            let mut stored = self.records.lock().await;
            let before = stored.len();
            for r in records {
                if !stored.iter().any(|s| s.steam_id == r.steam_id && s.created_on == r.created_on) {
                    stored.push(r.clone());
                }
            }
            Ok(stored.len() - before)
        }
    }

    fn page(rows: &[(u32, &str)], next: Option<&str>) -> String {
        let mut html = String::from("<html><body>");
        if let Some(next) = next {
            html.push_str(&format!(r#"<div id="banlist-nav"><a href="{next}">next</a></div>"#));
        }
        for (account, when) in rows {
            html.push_str(&format!(
                r#"<div class="opener"><table>
                    <tr><td>Player</td><td>p{account}</td></tr>
                    <tr><td>Steam3 ID</td><td>[U:1:{account}]</td></tr>
                    <tr><td>Invoked on</td><td>{when}</td></tr>
                    <tr><td>Banlength</td><td>1 wk</td></tr>
                    <tr><td>Expires on</td><td>2023-05-24 03:07:00</td></tr>
                    <tr><td>Reason</td><td>Cheating</td></tr>
                </table></div>"#
            ));
        }
        html.push_str("</body></html>");
        html
    }

    fn reject_all(_: &RawBan) -> bool {
        false
    }

    fn always_page_two(_: &Html, url: &Url) -> Option<Url> {
        Some(with_query_param(url, "page", "2"))
    }

    fn test_profile() -> SiteProfile {
        SiteProfile {
            sleep_between_pages: Some(Duration::ZERO),
            ..sites::UGC
        }
    }

    async fn scraper_with_pages(tmp: &TempDir, pages: &[(&str, String)]) -> SourceBansScraper {
        let cache = DiskCache::new(tmp.path(), Duration::from_secs(3600));
        for (url, body) in pages {
            cache.put(url, body.as_bytes()).await.unwrap();
        }
        let fetcher = Fetcher::new(
            create_async_client(Duration::from_secs(1)).unwrap(),
            None,
            Some(cache),
        );
        SourceBansScraper::new(
            Arc::new(fetcher),
            Arc::new(RateLimiter::new("test", 100, 100.0)),
            Duration::ZERO,
        )
    }

    #[test]
    fn permanent_ban_has_zero_duration() {
        let profile = SiteProfile {
            time_parser: time::parse_skial,
            ..test_profile()
        };
        let raw = RawBan {
            name: "x".into(),
            steam_id: Some(SteamId::from_account_id(47).unwrap()),
            invoked_on: "05-17-23 03:07".into(),
            ban_length: "Permanent".into(),
            expires_on: "Permanent".into(),
            reason: "cheat".into(),
            ..RawBan::default()
        };
        let record = build_record(&profile, raw).unwrap();
        assert!(record.permanent);
        assert_eq!(record.duration, 0);
        assert_eq!(
            record.created_on,
            Utc.with_ymd_and_hms(2023, 5, 17, 3, 7, 0).unwrap()
        );
    }

    #[test]
    fn timed_ban_duration() {
        let raw = RawBan {
            steam_id: Some(SteamId::from_account_id(47).unwrap()),
            invoked_on: "2023-05-17 03:07:00".into(),
            ban_length: "1 wk".into(),
            expires_on: "2023-05-24 03:07:00".into(),
            ..RawBan::default()
        };
        let record = build_record(&test_profile(), raw).unwrap();
        assert!(!record.permanent);
        assert_eq!(record.duration, 7 * 24 * 3600);
    }

    #[test]
    fn rows_without_id_or_date_are_skipped() {
        let no_id = RawBan {
            invoked_on: "2023-05-17 03:07:00".into(),
            ..RawBan::default()
        };
        assert!(build_record(&test_profile(), no_id).is_none());

        let no_date = RawBan {
            steam_id: Some(SteamId::from_account_id(1).unwrap()),
            ..RawBan::default()
        };
        assert!(build_record(&test_profile(), no_date).is_none());
    }

    #[test]
    fn row_filter_drops_rows() {
        let profile = SiteProfile {
            row_filter: Some(reject_all),
            ..test_profile()
        };
        let url = profile.start_url().unwrap();
        let body = page(&[(10, "2023-05-17 03:07:00")], None);
        let parsed = parse_page(&profile, &url, body.as_bytes()).unwrap();
        assert_eq!(parsed.rows, 1);
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn reparsing_is_stable() {
        let profile = test_profile();
        let url = profile.start_url().unwrap();
        let body = page(&[(10, "2023-05-17 03:07:00"), (12, "2023-05-18 03:07:00")], None);
        let first = parse_page(&profile, &url, body.as_bytes()).unwrap();
        let second = parse_page(&profile, &url, body.as_bytes()).unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.records.len(), 2);
    }

    #[tokio::test]
    async fn crawl_follows_pages_until_empty() {
        let profile = test_profile();
        let start = profile.start_url().unwrap();
        let page2 = format!("{}&page=2", start);
        let page3 = format!("{}&page=3", start);

        let tmp = TempDir::new().unwrap();
        let scraper = scraper_with_pages(
            &tmp,
            &[
                (
                    start.as_str(),
                    page(&[(10, "2023-05-17 03:07:00")], Some("?p=banlist&page=2")),
                ),
                (
                    page2.as_str(),
                    page(&[(12, "2023-05-18 03:07:00")], Some("?p=banlist&page=3")),
                ),
                (page3.as_str(), page(&[], Some("?p=banlist&page=4"))),
            ],
        )
        .await;

        let sink = MemorySink::default();
        let stats = scraper
            .crawl(&profile, &sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.stored, 2);
        assert_eq!(sink.records.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn crawl_stops_on_revisited_page() {
        let profile = test_profile();
        let start = profile.start_url().unwrap();
        let page2 = format!("{}&page=2", start);

        let tmp = TempDir::new().unwrap();
        let scraper = scraper_with_pages(
            &tmp,
            &[
                (
                    start.as_str(),
                    page(&[(10, "2023-05-17 03:07:00")], Some("?p=banlist&page=2")),
                ),
                (
                    page2.as_str(),
                    page(&[(12, "2023-05-18 03:07:00")], Some("?p=banlist&page=2")),
                ),
            ],
        )
        .await;

        // Page 2 keeps pointing at itself.
        let profile = SiteProfile {
            next_url: always_page_two,
            ..profile
        };
        let sink = MemorySink::default();
        let stats = scraper
            .crawl(&profile, &sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.pages, 2);
    }
}
