// src/pipeline/workers.rs

//! Job handlers for every source, and the registry that binds them.
//!
//! Handlers acquire their source's limiter before each remote call (inside
//! the clients), so queue backoff and limiter delays compose.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, League};
use crate::pipeline::diff::calculate_diff;
use crate::queue::{Job, JobArgs, JobKind, Worker, WorkerRegistry};
use crate::services::bdlist::entries_from_schema;
use crate::services::sourcebans::{all_profiles, profile_for};
use crate::services::{
    BdListClient, Etf2lClient, LogsTfClient, RglClient, ServemeClient, SourceBansScraper, SteamApi,
    SteamClient,
};
use crate::storage::Store;
use crate::utils::{Fetcher, Limiters};

/// Players refreshed per steam summary run.
const SUMMARY_BATCH: u32 = 100;
/// Summaries older than this many hours are refreshed.
const SUMMARY_MAX_AGE_HOURS: i64 = 24;
const STEAM_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const LONG_CRAWL_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);
/// Consecutive missing season ids that end an RGL scan.
const RGL_SEASON_MISSES: u32 = 10;
/// Consecutive missing log ids that end a logs.tf scan.
const LOGSTF_MISSES: u32 = 50;
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(10);

/// Clients shared by every worker of a source.
#[derive(Clone)]
pub struct Clients {
    pub steam: Arc<dyn SteamApi>,
    pub rgl: RglClient,
    pub etf2l: Etf2lClient,
    pub logstf: LogsTfClient,
    pub serveme: ServemeClient,
    pub bd: BdListClient,
    pub sourcebans: SourceBansScraper,
}

impl Clients {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>, limiters: &Limiters) -> Self {
        let http = fetcher.client().clone();
        Self {
            steam: Arc::new(SteamClient::new(
                http.clone(),
                config.steam_api_key.clone(),
                limiters.steam.clone(),
            )),
            rgl: RglClient::new(http.clone(), limiters.rgl.clone()),
            etf2l: Etf2lClient::new(http.clone(), limiters.etf2l.clone()),
            logstf: LogsTfClient::new(fetcher.clone(), limiters.logstf.clone()),
            serveme: ServemeClient::new(http.clone(), limiters.serveme.clone()),
            bd: BdListClient::new(http, limiters.bd_lists.clone(), config.bd_list_timeout()),
            sourcebans: SourceBansScraper::new(
                fetcher,
                limiters.sourcebans.clone(),
                config.scrape_delay(),
            ),
        }
    }
}

/// Bind every enabled source's handlers.
pub fn build_registry(store: &Store, clients: &Clients, config: &Config) -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(SteamSummaryWorker {
        store: store.clone(),
        steam: clients.steam.clone(),
    }));
    registry.register(Arc::new(SteamServersWorker {
        store: store.clone(),
        steam: clients.steam.clone(),
    }));
    registry.register(Arc::new(BdListsWorker {
        store: store.clone(),
        client: clients.bd.clone(),
    }));
    registry.register(Arc::new(ServemeWorker {
        store: store.clone(),
        client: clients.serveme.clone(),
    }));

    if config.rgl_scraper_enabled {
        registry.register(Arc::new(RglBansWorker {
            store: store.clone(),
            client: clients.rgl.clone(),
        }));
        registry.register(Arc::new(RglSeasonWorker {
            store: store.clone(),
            client: clients.rgl.clone(),
        }));
    }
    if config.etf2l_scraper_enabled {
        registry.register(Arc::new(Etf2lBansWorker {
            store: store.clone(),
            client: clients.etf2l.clone(),
        }));
    }
    if config.sourcebans_scraper_enabled {
        registry.register(Arc::new(SourceBansWorker));
        registry.register(Arc::new(SourceBansSiteWorker {
            store: store.clone(),
            scraper: clients.sourcebans.clone(),
        }));
    }
    if config.logstf_scraper_enabled {
        registry.register(Arc::new(LogsTfWorker {
            store: store.clone(),
            client: clients.logstf.clone(),
        }));
    }
    log::info!("Registered {} workers", registry.len());
    registry
}

/// Retry `call` in place while the remote reports rate limiting.
async fn retry_rate_limited<T, F, Fut>(
    cancel: &CancellationToken,
    pause: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        match call().await {
            Err(e) if e.is_rate_limited() => {
                log::debug!("Rate limited, pausing {pause:?}: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            other => return other,
        }
    }
}

async fn with_timeout<T>(what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(STEAM_CALL_TIMEOUT, fut)
        .await
        .map_err(|_| AppError::Timeout(what.to_string()))?
}

struct SteamSummaryWorker {
    store: Store,
    steam: Arc<dyn SteamApi>,
}

#[async_trait]
impl Worker for SteamSummaryWorker {
    fn kind(&self) -> JobKind {
        JobKind::SteamSummary
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        let now = Utc::now();
        let ids = self
            .store
            .players_expired(SUMMARY_BATCH, now - chrono::Duration::hours(SUMMARY_MAX_AGE_HOURS))
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let summaries = with_timeout("steam summaries", self.steam.summaries(&ids, cancel)).await?;
        let bans = with_timeout("steam bans", self.steam.bans(&ids, cancel)).await?;

        for id in &ids {
            let mut player = self.store.player_get_or_create(*id).await?;
            match summaries.iter().find(|s| s.steam_id() == Some(*id)) {
                Some(summary) => player.apply_summary(summary, now),
                // Deleted accounts return nothing; don't ask again until they expire.
                None => player.summary_updated_on = Some(now),
            }
            if let Some(state) = bans.iter().find(|b| b.steam_id() == Some(*id)) {
                player.apply_bans(state, now);
            }
            self.store.player_save(&player).await?;
            self.store
                .player_record_history(*id, &player.personaname, &player.avatar_hash, &player.vanity)
                .await?;
        }
        log::info!("Refreshed {} steam profiles", ids.len());
        Ok(Vec::new())
    }
}

struct SteamServersWorker {
    store: Store,
    steam: Arc<dyn SteamApi>,
}

#[async_trait]
impl Worker for SteamServersWorker {
    fn kind(&self) -> JobKind {
        JobKind::SteamServers
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        let servers = with_timeout("steam servers", self.steam.servers(cancel)).await?;
        let count = self.store.steam_servers_replace(&servers).await?;
        log::info!("Stored {count} steam servers");
        Ok(Vec::new())
    }
}

struct BdListsWorker {
    store: Store,
    client: BdListClient,
}

#[async_trait]
impl Worker for BdListsWorker {
    fn kind(&self) -> JobKind {
        JobKind::BdLists
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        for list in self.store.bd_lists(false).await? {
            let schema = match self.client.fetch(&list, cancel).await {
                Ok(schema) => schema,
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    log::warn!("Failed to fetch bd list {}: {e}", list.name);
                    continue;
                }
            };
            let now = Utc::now();
            let remote = entries_from_schema(list.list_id, &schema, now);
            let local = self.store.bd_list_entries(list.list_id).await?;
            let diff = calculate_diff(&local, &remote, now);
            self.store.bd_list_apply(list.list_id, &diff).await?;
            log::info!(
                "BD list {}: {} new, {} updated, {} deleted, {} unchanged",
                list.name,
                diff.new.len(),
                diff.updated.len(),
                diff.deleted.len(),
                diff.unchanged
            );
        }
        Ok(Vec::new())
    }
}

struct ServemeWorker {
    store: Store,
    client: ServemeClient,
}

#[async_trait]
impl Worker for ServemeWorker {
    fn kind(&self) -> JobKind {
        JobKind::Serveme
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        let remote = self.client.bans(cancel).await?;
        let local = self.store.serveme_records().await?;
        let diff = calculate_diff(&local, &remote, Utc::now());
        self.store.serveme_apply(&diff).await?;
        log::info!(
            "Serveme: {} new, {} updated, {} deleted",
            diff.new.len(),
            diff.updated.len(),
            diff.deleted.len()
        );
        Ok(Vec::new())
    }
}

struct RglBansWorker {
    store: Store,
    client: RglClient,
}

#[async_trait]
impl Worker for RglBansWorker {
    fn kind(&self) -> JobKind {
        JobKind::RglBans
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        let bans = retry_rate_limited(cancel, RATE_LIMIT_PAUSE, || self.client.bans(cancel)).await?;
        let count = self.store.league_bans_replace(League::Rgl, &bans).await?;
        log::info!("Stored {count} RGL bans");
        Ok(Vec::new())
    }
}

struct RglSeasonWorker {
    store: Store,
    client: RglClient,
}

impl RglSeasonWorker {
    /// Fetch each id, skipping the ones the league no longer knows.
    async fn fetch_all<T, F, Fut>(
        &self,
        ids: &[i64],
        cancel: &CancellationToken,
        fetch: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(i64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            match retry_rate_limited(cancel, RATE_LIMIT_PAUSE, || fetch(id)).await {
                Ok(item) => out.push(item),
                Err(e) if e.is_not_found() => log::debug!("RGL item {id} not found"),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Worker for RglSeasonWorker {
    fn kind(&self) -> JobKind {
        JobKind::RglSeason
    }

    fn timeout(&self) -> Duration {
        LONG_CRAWL_TIMEOUT
    }

    async fn work(&self, cancel: &CancellationToken, job: &Job) -> Result<Vec<JobArgs>> {
        let JobArgs::RglSeason { start } = job.args else {
            return Err(AppError::validation(format!("unexpected args {:?}", job.args)));
        };

        let mut season_id = start.max(1);
        let mut misses = 0;
        let mut saved = 0;
        while misses < RGL_SEASON_MISSES {
            let fetched =
                retry_rate_limited(cancel, RATE_LIMIT_PAUSE, || self.client.season(season_id, cancel))
                    .await;
            match fetched {
                Ok(season) => {
                    misses = 0;
                    let teams = self
                        .fetch_all(&season.participating_teams, cancel, |id| {
                            self.client.team(id, cancel)
                        })
                        .await?;
                    let matches = self
                        .fetch_all(&season.matches, cancel, |id| self.client.match_info(id, cancel))
                        .await?;
                    self.store.rgl_season_save(&season, &teams, &matches).await?;
                    log::info!(
                        "RGL season {season_id} ({}): {} teams, {} matches",
                        season.name,
                        teams.len(),
                        matches.len()
                    );
                    saved += 1;
                }
                Err(e) if e.is_not_found() => misses += 1,
                Err(e) => return Err(e),
            }
            season_id += 1;
        }
        log::info!("RGL season scan from {start} stored {saved} seasons");
        Ok(Vec::new())
    }
}

struct Etf2lBansWorker {
    store: Store,
    client: Etf2lClient,
}

#[async_trait]
impl Worker for Etf2lBansWorker {
    fn kind(&self) -> JobKind {
        JobKind::Etf2lBans
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        let bans = retry_rate_limited(cancel, RATE_LIMIT_PAUSE, || self.client.bans(cancel)).await?;
        let count = self.store.league_bans_replace(League::Etf2l, &bans).await?;
        log::info!("Stored {count} ETF2L bans");
        Ok(Vec::new())
    }
}

/// Fans the daily crawl out into one job per site.
struct SourceBansWorker;

#[async_trait]
impl Worker for SourceBansWorker {
    fn kind(&self) -> JobKind {
        JobKind::SourceBans
    }

    async fn work(&self, _cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        Ok(all_profiles()
            .iter()
            .map(|profile| JobArgs::SourceBansSite { site: profile.site })
            .collect())
    }
}

struct SourceBansSiteWorker {
    store: Store,
    scraper: SourceBansScraper,
}

#[async_trait]
impl Worker for SourceBansSiteWorker {
    fn kind(&self) -> JobKind {
        JobKind::SourceBansSite
    }

    fn timeout(&self) -> Duration {
        LONG_CRAWL_TIMEOUT
    }

    async fn work(&self, cancel: &CancellationToken, job: &Job) -> Result<Vec<JobArgs>> {
        let JobArgs::SourceBansSite { site } = job.args else {
            return Err(AppError::validation(format!("unexpected args {:?}", job.args)));
        };
        let profile =
            profile_for(site).ok_or_else(|| AppError::NotFound(format!("site profile {site}")))?;
        self.scraper.crawl(profile, &self.store, cancel).await?;
        Ok(Vec::new())
    }
}

struct LogsTfWorker {
    store: Store,
    client: LogsTfClient,
}

#[async_trait]
impl Worker for LogsTfWorker {
    fn kind(&self) -> JobKind {
        JobKind::LogsTf
    }

    fn timeout(&self) -> Duration {
        LONG_CRAWL_TIMEOUT
    }

    async fn work(&self, cancel: &CancellationToken, _job: &Job) -> Result<Vec<JobArgs>> {
        let mut log_id = self.store.logstf_max_id().await?.unwrap_or(0) + 1;
        let mut misses = 0;
        let mut saved = 0;
        while misses < LOGSTF_MISSES {
            let fetched =
                retry_rate_limited(cancel, RATE_LIMIT_PAUSE, || self.client.log(log_id, cancel))
                    .await;
            match fetched {
                Ok(m) => {
                    misses = 0;
                    self.store.logstf_save(&m).await?;
                    saved += 1;
                }
                Err(e) if e.is_not_found() => misses += 1,
                Err(e @ AppError::Parse { .. }) => {
                    misses = 0;
                    log::warn!("Skipping malformed log {log_id}: {e}");
                }
                Err(e) => return Err(e),
            }
            log_id += 1;
        }
        log::info!("logs.tf scan stored {saved} matches, stopped at {log_id}");
        Ok(Vec::new())
    }
}
