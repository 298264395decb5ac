//! Player entity and the Steam Web API shapes that feed it.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::SteamId;

/// Avatar assigned to accounts that never uploaded one.
pub const DEFAULT_AVATAR_HASH: &str = "fef49e7fa7e1997310d705b2a6158ff8dc1cdfeb";

/// Trade/market restriction state reported by Steam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EconBan {
    #[default]
    None,
    Probation,
    Banned,
}

impl EconBan {
    pub fn as_str(self) -> &'static str {
        match self {
            EconBan::None => "none",
            EconBan::Probation => "probation",
            EconBan::Banned => "banned",
        }
    }
}

impl FromStr for EconBan {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(EconBan::None),
            "probation" => Ok(EconBan::Probation),
            "banned" => Ok(EconBan::Banned),
            other => Err(AppError::parse("economy ban", other)),
        }
    }
}

/// Persisted player row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub steam_id: SteamId,
    pub personaname: String,
    /// Vanity path segment, empty when the profile has none
    pub vanity: String,
    pub avatar_hash: String,
    pub visibility_state: i32,
    pub profile_state: i32,
    pub loc_country_code: String,
    pub loc_state_code: String,
    pub loc_city_id: i64,
    pub time_created: Option<DateTime<Utc>>,
    pub community_banned: bool,
    pub vac_banned: bool,
    pub vac_bans: i32,
    pub game_bans: i32,
    pub last_banned_on: Option<DateTime<Utc>>,
    pub economy_ban: EconBan,
    pub summary_updated_on: Option<DateTime<Utc>>,
    pub bans_updated_on: Option<DateTime<Utc>>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Player {
    /// Minimal row for an id we have not seen before.
    pub fn new(steam_id: SteamId) -> Self {
        let now = Utc::now();
        Self {
            steam_id,
            personaname: String::new(),
            vanity: String::new(),
            avatar_hash: DEFAULT_AVATAR_HASH.to_string(),
            visibility_state: 1,
            profile_state: 0,
            loc_country_code: String::new(),
            loc_state_code: String::new(),
            loc_city_id: 0,
            time_created: None,
            community_banned: false,
            vac_banned: false,
            vac_bans: 0,
            game_bans: 0,
            last_banned_on: None,
            economy_ban: EconBan::None,
            summary_updated_on: None,
            bans_updated_on: None,
            created_on: now,
            updated_on: now,
        }
    }

    /// Copy the fields of a fresh summary onto the row.
    pub fn apply_summary(&mut self, summary: &PlayerSummary, now: DateTime<Utc>) {
        self.personaname = summary.personaname.clone();
        self.vanity = summary.vanity().unwrap_or_default();
        self.avatar_hash = summary.avatar_hash();
        self.visibility_state = summary.communityvisibilitystate;
        self.profile_state = summary.profilestate;
        self.loc_country_code = summary.loccountrycode.clone();
        self.loc_state_code = summary.locstatecode.clone();
        self.loc_city_id = summary.loccityid;
        self.time_created = DateTime::from_timestamp(summary.timecreated, 0)
            .filter(|_| summary.timecreated > 0);
        self.summary_updated_on = Some(now);
        self.updated_on = now;
    }

    /// Copy ban flags onto the row.
    pub fn apply_bans(&mut self, bans: &PlayerBanState, now: DateTime<Utc>) {
        self.community_banned = bans.community_banned;
        self.vac_banned = bans.vac_banned;
        self.vac_bans = bans.number_of_vac_bans;
        self.game_bans = bans.number_of_game_bans;
        self.economy_ban = bans.economy_ban.parse().unwrap_or_default();
        self.last_banned_on = if bans.vac_banned || bans.number_of_game_bans > 0 {
            Some(now - Duration::days(bans.days_since_last_ban as i64))
        } else {
            None
        };
        self.bans_updated_on = Some(now);
        self.updated_on = now;
    }
}

/// One observed value in an append-only history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub steam_id: SteamId,
    pub value: String,
    pub created_on: DateTime<Utc>,
}

/// `ISteamUser/GetPlayerSummaries` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSummary {
    pub steamid: String,
    pub communityvisibilitystate: i32,
    pub profilestate: i32,
    pub personaname: String,
    pub profileurl: String,
    pub avatar: String,
    pub avatarmedium: String,
    pub avatarfull: String,
    pub avatarhash: String,
    pub personastate: i32,
    pub realname: String,
    pub primaryclanid: String,
    pub timecreated: i64,
    pub loccountrycode: String,
    pub locstatecode: String,
    pub loccityid: i64,
}

impl PlayerSummary {
    pub fn steam_id(&self) -> Option<SteamId> {
        self.steamid.parse().ok()
    }

    /// `https://steamcommunity.com/id/<vanity>/` → `<vanity>`
    pub fn vanity(&self) -> Option<String> {
        let rest = self.profileurl.split("/id/").nth(1)?;
        let vanity = rest.trim_end_matches('/');
        (!vanity.is_empty()).then(|| vanity.to_string())
    }

    pub fn avatar_hash(&self) -> String {
        if self.avatarhash.is_empty() {
            DEFAULT_AVATAR_HASH.to_string()
        } else {
            self.avatarhash.clone()
        }
    }
}

/// `ISteamUser/GetPlayerBans` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerBanState {
    #[serde(rename = "SteamId")]
    pub steam_id: String,
    #[serde(rename = "CommunityBanned")]
    pub community_banned: bool,
    #[serde(rename = "VACBanned")]
    pub vac_banned: bool,
    #[serde(rename = "NumberOfVACBans")]
    pub number_of_vac_bans: i32,
    #[serde(rename = "DaysSinceLastBan")]
    pub days_since_last_ban: i32,
    #[serde(rename = "NumberOfGameBans")]
    pub number_of_game_bans: i32,
    #[serde(rename = "EconomyBan")]
    pub economy_ban: String,
}

impl PlayerBanState {
    pub fn steam_id(&self) -> Option<SteamId> {
        self.steam_id.parse().ok()
    }
}

/// `ISteamUser/GetFriendList` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamFriend {
    pub steamid: String,
    pub relationship: String,
    pub friend_since: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanity_from_profile_url() {
        let summary = PlayerSummary {
            profileurl: "https://steamcommunity.com/id/example/".into(),
            ..Default::default()
        };
        assert_eq!(summary.vanity().as_deref(), Some("example"));

        let summary = PlayerSummary {
            profileurl: "https://steamcommunity.com/profiles/76561197960265729/".into(),
            ..Default::default()
        };
        assert_eq!(summary.vanity(), None);
    }

    #[test]
    fn apply_bans_sets_last_ban() {
        let id = SteamId::new(76561197960265729).unwrap();
        let mut player = Player::new(id);
        let now = Utc::now();
        player.apply_bans(
            &PlayerBanState {
                vac_banned: true,
                number_of_vac_bans: 2,
                days_since_last_ban: 10,
                economy_ban: "probation".into(),
                ..Default::default()
            },
            now,
        );
        assert_eq!(player.vac_bans, 2);
        assert_eq!(player.economy_ban, EconBan::Probation);
        assert_eq!(player.last_banned_on, Some(now - Duration::days(10)));
    }

    #[test]
    fn ban_state_deserializes_steam_casing() {
        let raw = r#"{"SteamId":"76561197960265729","CommunityBanned":false,"VACBanned":true,
            "NumberOfVACBans":1,"DaysSinceLastBan":3,"NumberOfGameBans":0,"EconomyBan":"none"}"#;
        let state: PlayerBanState = serde_json::from_str(raw).unwrap();
        assert!(state.vac_banned);
        assert_eq!(state.steam_id().unwrap().as_u64(), 76561197960265729);
    }
}
