//! Steam Web API client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{MAX_IDS, PlayerBanState, PlayerSummary, SteamFriend, SteamId, SteamServer};
use crate::utils::http::check_status;
use crate::utils::limiter::RateLimiter;

const API_BASE: &str = "https://api.steampowered.com";

/// TF2 app id used for the server list filter.
pub const TF2_APP_ID: u32 = 440;

/// Cap on servers returned by one master list query.
const SERVER_LIMIT: u32 = 20_000;

/// The Steam calls the rest of the crate relies on.
#[async_trait]
pub trait SteamApi: Send + Sync {
    /// Summaries for any number of ids, fetched in batches of 100.
    async fn summaries(
        &self,
        ids: &[SteamId],
        cancel: &CancellationToken,
    ) -> Result<Vec<PlayerSummary>>;

    /// Ban states; batched like [`SteamApi::summaries`].
    async fn bans(
        &self,
        ids: &[SteamId],
        cancel: &CancellationToken,
    ) -> Result<Vec<PlayerBanState>>;

    /// Friend list of one player. Private lists come back empty.
    async fn friends(&self, id: SteamId, cancel: &CancellationToken) -> Result<Vec<SteamFriend>>;

    /// Current TF2 server list.
    async fn servers(&self, cancel: &CancellationToken) -> Result<Vec<SteamServer>>;
}

#[derive(Debug, Deserialize)]
struct Response<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct Players<T> {
    #[serde(default)]
    players: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FriendsResponse {
    friendslist: Friends,
}

#[derive(Debug, Deserialize)]
struct Friends {
    #[serde(default)]
    friends: Vec<SteamFriend>,
}

#[derive(Debug, Deserialize)]
struct Servers {
    #[serde(default)]
    servers: Vec<SteamServer>,
}

/// Rate limited client over the Steam Web API.
#[derive(Debug, Clone)]
pub struct SteamClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl SteamClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
            limiter,
        }
    }

    /// Point the client at another host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T>(&self, path: &str, args: &[(&str, String)], cancel: &CancellationToken) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.limiter.acquire(cancel).await?;
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(args)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = request => response?,
        };
        check_status(path, response.status())?;
        Ok(response.json::<T>().await?)
    }
}

fn join_ids(ids: &[SteamId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl SteamApi for SteamClient {
    async fn summaries(
        &self,
        ids: &[SteamId],
        cancel: &CancellationToken,
    ) -> Result<Vec<PlayerSummary>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS) {
            let resp: Response<Players<PlayerSummary>> = self
                .get(
                    "/ISteamUser/GetPlayerSummaries/v2/",
                    &[("steamids", join_ids(chunk))],
                    cancel,
                )
                .await?;
            out.extend(resp.response.players);
        }
        Ok(out)
    }

    async fn bans(
        &self,
        ids: &[SteamId],
        cancel: &CancellationToken,
    ) -> Result<Vec<PlayerBanState>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS) {
            let resp: Players<PlayerBanState> = self
                .get(
                    "/ISteamUser/GetPlayerBans/v1/",
                    &[("steamids", join_ids(chunk))],
                    cancel,
                )
                .await?;
            out.extend(resp.players);
        }
        Ok(out)
    }

    async fn friends(&self, id: SteamId, cancel: &CancellationToken) -> Result<Vec<SteamFriend>> {
        let result: Result<FriendsResponse> = self
            .get(
                "/ISteamUser/GetFriendList/v1/",
                &[
                    ("steamid", id.to_string()),
                    ("relationship", "friend".to_string()),
                ],
                cancel,
            )
            .await;
        match result {
            Ok(resp) => Ok(resp.friendslist.friends),
            Err(AppError::Status { status: 401, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn servers(&self, cancel: &CancellationToken) -> Result<Vec<SteamServer>> {
        let resp: Response<Servers> = self
            .get(
                "/IGameServersService/GetServerList/v1/",
                &[
                    ("filter", format!("\\appid\\{TF2_APP_ID}")),
                    ("limit", SERVER_LIMIT.to_string()),
                ],
                cancel,
            )
            .await?;
        Ok(resp.response.servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_ids_with_commas() {
        let ids = vec![
            SteamId::new(76561197960265729).unwrap(),
            SteamId::new(76561197960265730).unwrap(),
        ];
        assert_eq!(join_ids(&ids), "76561197960265729,76561197960265730");
    }

    #[test]
    fn decodes_summary_envelope() {
        let raw = r#"{"response":{"players":[{"steamid":"76561197960265729",
            "personaname":"one","profileurl":"https://steamcommunity.com/id/one/",
            "avatarhash":"abc","communityvisibilitystate":3}]}}"#;
        let resp: Response<Players<PlayerSummary>> = serde_json::from_str(raw).unwrap();
        let player = &resp.response.players[0];
        assert_eq!(player.personaname, "one");
        assert_eq!(player.vanity().as_deref(), Some("one"));
    }

    #[test]
    fn decodes_missing_players_as_empty() {
        let resp: Response<Players<PlayerSummary>> =
            serde_json::from_str(r#"{"response":{}}"#).unwrap();
        assert!(resp.response.players.is_empty());
    }

    #[test]
    fn decodes_friend_list() {
        let raw = r#"{"friendslist":{"friends":[{"steamid":"76561197960265730",
            "relationship":"friend","friend_since":1600000000}]}}"#;
        let resp: FriendsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.friendslist.friends[0].friend_since, 1600000000);
    }
}
