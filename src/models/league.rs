//! Competitive league entities (RGL, ETF2L).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SteamId;

/// Leagues whose ban lists are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Rgl,
    Etf2l,
}

impl League {
    pub fn as_str(self) -> &'static str {
        match self {
            League::Rgl => "rgl",
            League::Etf2l => "etf2l",
        }
    }
}

/// A league ban. The whole set of one league is replaced on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueBan {
    pub steam_id: SteamId,
    pub alias: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RglSeason {
    pub season_id: i64,
    pub name: String,
    pub maps: Vec<String>,
    pub format_name: String,
    pub region_name: String,
    pub participating_teams: Vec<i64>,
    pub matches: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RglTeam {
    pub team_id: i64,
    pub season_id: i64,
    pub division_id: i64,
    pub division_name: String,
    pub team_leader: String,
    pub tag: String,
    pub name: String,
    pub final_rank: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub members: Vec<RglTeamMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RglTeamMember {
    pub team_id: i64,
    pub steam_id: SteamId,
    pub name: String,
    pub is_leader: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RglMatch {
    pub match_id: i64,
    pub season_id: i64,
    pub division_id: i64,
    pub division_name: String,
    pub region_id: i64,
    pub match_date: Option<DateTime<Utc>>,
    pub match_name: String,
    pub is_forfeit: bool,
    pub winner: i64,
    pub team_id_a: i64,
    pub points_a: f64,
    pub team_id_b: i64,
    pub points_b: f64,
}

/// Placeholder for a league season on the composite profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Season {
    pub league: String,
    pub division: String,
    pub team_name: String,
    pub format: String,
}
