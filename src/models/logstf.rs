//! Per-match statistics mirrored from logs.tf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SteamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blu,
}

impl Team {
    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blu => "blu",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Some(Team::Red),
            "blu" | "blue" => Some(Team::Blu),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfMatch {
    pub log_id: i64,
    pub title: String,
    pub map: String,
    /// Seconds
    pub duration: i64,
    pub score_red: i32,
    pub score_blu: i32,
    pub created_on: DateTime<Utc>,
    pub rounds: Vec<LogsTfRound>,
    pub players: Vec<LogsTfPlayerStat>,
    pub medics: Vec<LogsTfMedicStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfRound {
    pub round: i32,
    /// Seconds
    pub length: i64,
    pub score_red: i32,
    pub score_blu: i32,
    pub kills_red: i32,
    pub kills_blu: i32,
    pub ubers_red: i32,
    pub ubers_blu: i32,
    pub damage_red: i64,
    pub damage_blu: i64,
    pub midfight: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfPlayerStat {
    pub steam_id: SteamId,
    pub team: Team,
    pub name: String,
    pub kills: i32,
    pub assists: i32,
    pub deaths: i32,
    pub damage: i64,
    pub dpm: i32,
    pub damage_taken: i64,
    pub healing_taken: i64,
    pub headshots: i32,
    pub airshots: i32,
    pub caps: i32,
    pub classes: Vec<LogsTfPlayerClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfPlayerClass {
    pub player_class: String,
    /// Seconds played on the class
    pub played: i64,
    pub kills: i32,
    pub assists: i32,
    pub deaths: i32,
    pub damage: i64,
    pub weapons: Vec<LogsTfClassWeapon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfClassWeapon {
    pub weapon: String,
    pub kills: i32,
    pub damage: i64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfMedicStat {
    pub steam_id: SteamId,
    pub healing: i64,
    pub charges: i32,
    pub drops: i32,
    pub avg_time_to_build: f64,
    pub avg_uber_length: f64,
    pub near_full_charge_death: i32,
    pub deaths_after_charge: i32,
}

/// One row of a player's match list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTfSummary {
    pub log_id: i64,
    pub title: String,
    pub map: String,
    pub duration: i64,
    pub score_red: i32,
    pub score_blu: i32,
    pub created_on: DateTime<Utc>,
}
