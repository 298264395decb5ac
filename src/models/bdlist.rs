//! Bot detector lists (TF2BD player-list schema) and their stored entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SteamId;

pub const TF2BD_SCHEMA: &str =
    "https://raw.githubusercontent.com/PazerOP/tf2_bot_detector/master/schemas/v3/playerlist.schema.json";

/// A configured remote list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BdList {
    pub list_id: i64,
    pub name: String,
    pub url: String,
    pub game: String,
    /// 0..=10, how much a hit on this list counts
    pub trust_weight: i32,
    pub deleted: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// Stored player entry of one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BdListEntry {
    pub entry_id: i64,
    pub list_id: i64,
    pub steam_id: SteamId,
    /// Sorted, deduplicated tags
    pub attributes: Vec<String>,
    pub proof: Vec<String>,
    pub last_seen: DateTime<Utc>,
    pub last_name: String,
    pub deleted: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl BdListEntry {
    /// Canonical form of a tag list: lowercase, sorted, unique.
    pub fn normalize_attributes(attributes: &[String]) -> Vec<String> {
        let mut out: Vec<String> = attributes
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn attributes_csv(&self) -> String {
        Self::normalize_attributes(&self.attributes).join(",")
    }
}

/// A list hit returned to the read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BdSearchResult {
    pub list_name: String,
    pub trust_weight: i32,
    #[serde(rename = "match")]
    pub entry: BdListEntry,
}

/// Top level TF2BD document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BdSchema {
    #[serde(rename = "$schema", default)]
    pub schema: String,
    #[serde(default)]
    pub file_info: BdFileInfo,
    #[serde(default)]
    pub players: Vec<BdSchemaPlayer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BdFileInfo {
    pub authors: Vec<String>,
    pub description: String,
    pub title: String,
    pub update_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BdSchemaPlayer {
    pub attributes: Vec<String>,
    pub last_seen: BdLastSeen,
    /// Lists disagree on notation, so the id is parsed after decoding
    pub steamid: serde_json::Value,
    pub proof: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BdLastSeen {
    pub player_name: String,
    pub time: i64,
}

impl BdSchemaPlayer {
    pub fn steam_id(&self) -> Option<SteamId> {
        match &self.steamid {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_u64().and_then(|v| SteamId::new(v).ok()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_id_notations() {
        let raw = r#"{
            "$schema": "https://raw.githubusercontent.com/PazerOP/tf2_bot_detector/master/schemas/v3/playerlist.schema.json",
            "file_info": {"authors": ["a"], "description": "d", "title": "t", "update_url": "u"},
            "players": [
                {"attributes": ["cheater"], "last_seen": {"player_name": "x", "time": 1684292820}, "steamid": "[U:1:1]"},
                {"attributes": ["racist"], "steamid": 76561197960265730, "proof": ["demo"]},
                {"attributes": ["bot"], "steamid": "garbage"}
            ]
        }"#;
        let schema: BdSchema = serde_json::from_str(raw).unwrap();
        assert_eq!(schema.players.len(), 3);
        assert_eq!(schema.players[0].steam_id().unwrap().account_id(), 1);
        assert_eq!(schema.players[1].steam_id().unwrap().account_id(), 2);
        assert!(schema.players[2].steam_id().is_none());
        assert_eq!(schema.file_info.title, "t");
    }

    #[test]
    fn attributes_are_normalized() {
        let attrs = vec!["Cheater".to_string(), "bot".into(), "cheater".into(), " ".into()];
        assert_eq!(
            BdListEntry::normalize_attributes(&attrs),
            vec!["bot".to_string(), "cheater".to_string()]
        );
    }
}
