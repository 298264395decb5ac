//! RGL public API client.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{LeagueBan, RglMatch, RglSeason, RglTeam, RglTeamMember, SteamId};
use crate::utils::http::get_json;
use crate::utils::limiter::RateLimiter;

const API_BASE: &str = "https://api.rgl.gg/v0";

/// Page size of the paged ban list.
pub const BAN_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BanDto {
    steam_id: String,
    #[serde(default)]
    alias: String,
    #[serde(default)]
    reason: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonDto {
    #[serde(default)]
    name: String,
    #[serde(default)]
    maps: Vec<Option<String>>,
    #[serde(default)]
    format_name: String,
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    participating_teams: Vec<i64>,
    #[serde(default)]
    matches_played_during_season: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamDto {
    team_id: i64,
    #[serde(default)]
    season_id: i64,
    #[serde(default)]
    division_id: i64,
    #[serde(default)]
    division_name: String,
    #[serde(default)]
    team_leader: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    final_rank: Option<i32>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    players: Vec<TeamPlayerDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamPlayerDto {
    #[serde(default)]
    name: String,
    steam_id: String,
    #[serde(default)]
    is_team_leader: bool,
    joined_at: Option<DateTime<Utc>>,
    left_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchDto {
    match_id: i64,
    #[serde(default)]
    season_id: i64,
    #[serde(default)]
    division_id: i64,
    #[serde(default)]
    division_name: String,
    #[serde(default)]
    region_id: i64,
    match_date: Option<DateTime<Utc>>,
    #[serde(default)]
    match_name: String,
    #[serde(default)]
    is_forfeit: bool,
    #[serde(default)]
    winner: Option<i64>,
    #[serde(default)]
    teams: Vec<MatchTeamDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchTeamDto {
    team_id: i64,
    #[serde(default)]
    points: Option<f64>,
}

fn convert_ban(dto: BanDto) -> Option<LeagueBan> {
    let steam_id = match dto.steam_id.parse::<SteamId>() {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Skipping RGL ban with bad steam id: {}", e);
            return None;
        }
    };
    Some(LeagueBan {
        steam_id,
        alias: dto.alias,
        reason: dto.reason,
        created_at: dto.created_at,
        expires_at: dto.expires_at,
    })
}

fn convert_team(dto: TeamDto) -> RglTeam {
    let team_id = dto.team_id;
    let members = dto
        .players
        .into_iter()
        .filter_map(|p| match p.steam_id.parse::<SteamId>() {
            Ok(steam_id) => Some(RglTeamMember {
                team_id,
                steam_id,
                name: p.name,
                is_leader: p.is_team_leader,
                joined_at: p.joined_at,
                left_at: p.left_at,
            }),
            Err(e) => {
                log::warn!("Skipping RGL team {} member: {}", team_id, e);
                None
            }
        })
        .collect();

    RglTeam {
        team_id,
        season_id: dto.season_id,
        division_id: dto.division_id,
        division_name: dto.division_name,
        team_leader: dto.team_leader,
        tag: dto.tag,
        name: dto.name,
        final_rank: dto.final_rank.unwrap_or_default(),
        created_at: dto.created_at,
        updated_at: dto.updated_at,
        members,
    }
}

fn convert_match(dto: MatchDto) -> RglMatch {
    let team = |i: usize| {
        dto.teams
            .get(i)
            .map(|t| (t.team_id, t.points.unwrap_or_default()))
            .unwrap_or_default()
    };
    let (team_id_a, points_a) = team(0);
    let (team_id_b, points_b) = team(1);
    RglMatch {
        match_id: dto.match_id,
        season_id: dto.season_id,
        division_id: dto.division_id,
        division_name: dto.division_name,
        region_id: dto.region_id,
        match_date: dto.match_date,
        match_name: dto.match_name,
        is_forfeit: dto.is_forfeit,
        winner: dto.winner.unwrap_or_default(),
        team_id_a,
        points_a,
        team_id_b,
        points_b,
    }
}

/// Client over `api.rgl.gg`. A 404 surfaces as [`crate::error::AppError::NotFound`]
/// and a 429 as [`crate::error::AppError::RateLimited`].
#[derive(Debug, Clone)]
pub struct RglClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl RglClient {
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

    /// One page of the ban list.
    pub async fn bans_page(
        &self,
        take: usize,
        skip: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<LeagueBan>> {
        let url = format!("{}/bans/paged?take={}&skip={}", self.base_url, take, skip);
        let page: Vec<BanDto> = get_json(&self.http, &url, &self.limiter, cancel).await?;
        Ok(page.into_iter().filter_map(convert_ban).collect())
    }

    /// Every ban, walking pages until one comes back empty.
    pub async fn bans(&self, cancel: &CancellationToken) -> Result<Vec<LeagueBan>> {
        let mut all = Vec::new();
        let mut skip = 0;
        loop {
            let page = self.bans_page(BAN_PAGE_SIZE, skip, cancel).await?;
            if page.is_empty() {
                break;
            }
            skip += BAN_PAGE_SIZE;
            all.extend(page);
        }
        Ok(all)
    }

    pub async fn season(&self, season_id: i64, cancel: &CancellationToken) -> Result<RglSeason> {
        let url = format!("{}/seasons/{}", self.base_url, season_id);
        let dto: SeasonDto = get_json(&self.http, &url, &self.limiter, cancel).await?;
        Ok(RglSeason {
            season_id,
            name: dto.name,
            maps: dto.maps.into_iter().flatten().collect(),
            format_name: dto.format_name,
            region_name: dto.region_name,
            participating_teams: dto.participating_teams,
            matches: dto.matches_played_during_season,
        })
    }

    pub async fn team(&self, team_id: i64, cancel: &CancellationToken) -> Result<RglTeam> {
        let url = format!("{}/teams/{}", self.base_url, team_id);
        let dto: TeamDto = get_json(&self.http, &url, &self.limiter, cancel).await?;
        Ok(convert_team(dto))
    }

    pub async fn match_info(&self, match_id: i64, cancel: &CancellationToken) -> Result<RglMatch> {
        let url = format!("{}/matches/{}", self.base_url, match_id);
        let dto: MatchDto = get_json(&self.http, &url, &self.limiter, cancel).await?;
        Ok(convert_match(dto))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_payload() {
        let raw = r#"[{"steamId":"76561197960265729","alias":"cheater","reason":"cheating",
            "createdAt":"2023-01-01T00:00:00Z","expiresAt":null},
            {"steamId":"nope","createdAt":"2023-01-01T00:00:00Z","expiresAt":null}]"#;
        let dtos: Vec<BanDto> = serde_json::from_str(raw).unwrap();
        let bans: Vec<LeagueBan> = dtos.into_iter().filter_map(convert_ban).collect();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].alias, "cheater");
        assert!(bans[0].expires_at.is_none());
    }

    #[test]
    fn team_payload() {
        let raw = r#"{"teamId":10,"seasonId":3,"divisionId":2,"divisionName":"Main",
            "teamLeader":"76561197960265729","tag":"TAG","name":"Team","finalRank":1,
            "createdAt":"2023-01-01T00:00:00Z","updatedAt":null,
            "players":[{"name":"a","steamId":"76561197960265729","isTeamLeader":true,
                "joinedAt":"2023-01-01T00:00:00Z","leftAt":null}]}"#;
        let team = convert_team(serde_json::from_str(raw).unwrap());
        assert_eq!(team.members.len(), 1);
        assert_eq!(team.members[0].team_id, 10);
        assert!(team.members[0].is_leader);
    }

    #[test]
    fn match_payload() {
        let raw = r#"{"matchId":5,"seasonId":3,"divisionId":2,"divisionName":"Main",
            "regionId":1,"matchDate":"2023-02-01T02:00:00Z","matchName":"Week 1",
            "isForfeit":false,"winner":10,
            "teams":[{"teamId":10,"points":3.0},{"teamId":11,"points":1.0}]}"#;
        let m = convert_match(serde_json::from_str(raw).unwrap());
        assert_eq!((m.team_id_a, m.team_id_b), (10, 11));
        assert_eq!(m.points_a, 3.0);
        assert_eq!(m.winner, 10);
    }
}
