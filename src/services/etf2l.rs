//! ETF2L ban list client.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{LeagueBan, SteamId};
use crate::utils::http::get_json;
use crate::utils::limiter::RateLimiter;

const API_BASE: &str = "https://api-v2.etf2l.org";

#[derive(Debug, Deserialize)]
struct BansResponse {
    bans: BanPage,
}

#[derive(Debug, Deserialize)]
struct BanPage {
    #[serde(default)]
    data: Vec<BanDto>,
    next_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BanDto {
    start: i64,
    #[serde(default)]
    end: i64,
    #[serde(default)]
    reason: String,
    player: PlayerDto,
}

#[derive(Debug, Deserialize)]
struct PlayerDto {
    #[serde(default)]
    name: String,
    steam: SteamDto,
}

#[derive(Debug, Deserialize)]
struct SteamDto {
    id64: serde_json::Value,
}

fn convert_ban(dto: BanDto) -> Option<LeagueBan> {
    let raw_id = match &dto.player.steam.id64 {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let steam_id = match raw_id.parse::<SteamId>() {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Skipping ETF2L ban for {}: {}", dto.player.name, e);
            return None;
        }
    };
    let created_at = DateTime::from_timestamp(dto.start, 0)?;
    Some(LeagueBan {
        steam_id,
        alias: dto.player.name,
        reason: dto.reason,
        created_at,
        expires_at: DateTime::from_timestamp(dto.end, 0).filter(|_| dto.end > 0),
    })
}

#[derive(Debug, Clone)]
pub struct Etf2lClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl Etf2lClient {
    pub fn new(http: reqwest::Client, limiter: Arc<RateLimiter>) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
            limiter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Every ban, following `next_page_url` until the chain ends.
    pub async fn bans(&self, cancel: &CancellationToken) -> Result<Vec<LeagueBan>> {
        let mut all = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(format!("{}/bans?per_page=100", self.base_url));

        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                break;
            }
            let resp: BansResponse = get_json(&self.http, &url, &self.limiter, cancel).await?;
            all.extend(resp.bans.data.into_iter().filter_map(convert_ban));
            next = resp.bans.next_page_url.filter(|u| !u.is_empty());
        }
        log::debug!("Fetched {} ETF2L bans", all.len());
        Ok(all)
    }
}
