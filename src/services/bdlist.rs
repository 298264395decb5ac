//! Remote bot detector lists in the TF2BD player-list format.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{BdList, BdListEntry, BdSchema};
use crate::utils::http::check_status;
use crate::utils::limiter::RateLimiter;

#[derive(Debug, Clone)]
pub struct BdListClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl BdListClient {
    pub fn new(http: reqwest::Client, limiter: Arc<RateLimiter>, timeout: Duration) -> Self {
        Self {
            http,
            limiter,
            timeout,
        }
    }

    /// Download and decode the document behind `list.url`.
    pub async fn fetch(&self, list: &BdList, cancel: &CancellationToken) -> Result<BdSchema> {
        self.limiter.acquire(cancel).await?;
        let request = self.http.get(&list.url).timeout(self.timeout).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = request => response?,
        };
        check_status(&list.url, response.status())?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AppError::parse(&list.name, e))
    }
}

/// Convert a decoded document into entries of `list_id`.
///
/// Players without a usable id are skipped. When a document lists the same
/// player twice the later record wins, keeping one entry per player. A
/// missing `last_seen` maps to the unix epoch so that re-reading an
/// unchanged document yields identical entries.
pub fn entries_from_schema(list_id: i64, schema: &BdSchema, now: DateTime<Utc>) -> Vec<BdListEntry> {
    let mut index: HashMap<_, usize> = HashMap::new();
    let mut entries: Vec<BdListEntry> = Vec::with_capacity(schema.players.len());

    for player in &schema.players {
        let Some(steam_id) = player.steam_id() else {
            log::warn!("Skipping list {} player with bad id: {}", list_id, player.steamid);
            continue;
        };
        let last_seen = DateTime::from_timestamp(player.last_seen.time, 0)
            .filter(|_| player.last_seen.time > 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let entry = BdListEntry {
            entry_id: 0,
            list_id,
            steam_id,
            attributes: BdListEntry::normalize_attributes(&player.attributes),
            proof: player.proof.clone(),
            last_seen,
            last_name: player.last_seen.player_name.clone(),
            deleted: false,
            created_on: now,
            updated_on: now,
        };
        match index.get(&steam_id) {
            Some(&i) => entries[i] = entry,
            None => {
                index.insert(steam_id, entries.len());
                entries.push(entry);
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_players_and_skips_bad_ids() {
        let raw = r#"{
            "$schema": "https://raw.githubusercontent.com/PazerOP/tf2_bot_detector/master/schemas/v3/playerlist.schema.json",
            "file_info": {"authors": ["x"], "description": "", "title": "test", "update_url": ""},
            "players": [
                {"attributes": ["Cheater", "bot"], "last_seen": {"player_name": "first", "time": 1684292820},
                 "steamid": "[U:1:1]", "proof": ["demo 1"]},
                {"attributes": ["racist"], "steamid": "not an id"},
                {"attributes": ["cheater"], "last_seen": {"player_name": "renamed", "time": 1684292900},
                 "steamid": 76561197960265729}
            ]
        }"#;
        let schema: BdSchema = serde_json::from_str(raw).unwrap();
        let now = Utc::now();
        let entries = entries_from_schema(7, &schema, now);

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.list_id, 7);
        assert_eq!(entry.last_name, "renamed");
        assert_eq!(entry.attributes, vec!["cheater".to_string()]);
        assert_eq!(entry.last_seen.timestamp(), 1684292900);
    }

    #[test]
    fn missing_last_seen_is_stable_across_reads() {
        let schema: BdSchema =
            serde_json::from_str(r#"{"players":[{"attributes":["bot"],"steamid":"[U:1:2]"}]}"#)
                .unwrap();
        let now = Utc::now();
        let first = entries_from_schema(1, &schema, now);
        let later = entries_from_schema(1, &schema, now + chrono::Duration::minutes(1));
        assert_eq!(first[0].last_seen, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(first[0].last_seen, later[0].last_seen);
        assert!(first[0].proof.is_empty());
    }
}
