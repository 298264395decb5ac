//! Composite per-player profile assembled on the read path.

use serde::{Deserialize, Serialize};

use crate::models::{
    BdSearchResult, PlayerBanState, PlayerSummary, SbBanRecord, Season, ServemeRecord, SteamFriend,
    SteamId,
};

/// Every collection serializes as an array, never `null`, so partially
/// failed lookups still produce a well formed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub steam_id: SteamId,
    #[serde(default)]
    pub summary: PlayerSummary,
    #[serde(default)]
    pub ban_state: PlayerBanState,
    #[serde(default)]
    pub source_bans: Vec<SbBanRecord>,
    #[serde(default)]
    pub serve_me: Vec<ServemeRecord>,
    #[serde(default)]
    pub logs_count: i64,
    #[serde(default)]
    pub bot_detector: Vec<BdSearchResult>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub friends: Vec<SteamFriend>,
}

impl Profile {
    pub fn empty(steam_id: SteamId) -> Self {
        Self {
            steam_id,
            summary: PlayerSummary::default(),
            ban_state: PlayerBanState::default(),
            source_bans: Vec::new(),
            serve_me: Vec::new(),
            logs_count: 0,
            bot_detector: Vec::new(),
            seasons: Vec::new(),
            friends: Vec::new(),
        }
    }
}
