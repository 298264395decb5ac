// src/models/mod.rs

//! Domain models for the aggregator.
//!
//! This module contains all data structures used throughout the application,
//! organized by the source they describe.

mod bdlist;
mod config;
mod league;
mod logstf;
mod player;
mod profile;
mod server;
mod serveme;
mod sourcebans;
mod steamid;

// Re-export all public types
pub use bdlist::{
    BdFileInfo, BdLastSeen, BdList, BdListEntry, BdSchema, BdSchemaPlayer, BdSearchResult,
    TF2BD_SCHEMA,
};
pub use config::{Config, ProxyConfig, RunMode};
pub use league::{League, LeagueBan, RglMatch, RglSeason, RglTeam, RglTeamMember, Season};
pub use logstf::{
    LogsTfClassWeapon, LogsTfMatch, LogsTfMedicStat, LogsTfPlayerClass, LogsTfPlayerStat,
    LogsTfRound, LogsTfSummary, Team,
};
pub use player::{
    DEFAULT_AVATAR_HASH, EconBan, HistoryRecord, Player, PlayerBanState, PlayerSummary,
    SteamFriend,
};
pub use profile::Profile;
pub use server::SteamServer;
pub use serveme::ServemeRecord;
pub use sourcebans::{SbBanRecord, SbRecord, SbSite, Site};
pub use steamid::{MAX_IDS, SteamId, parse_steam_ids};
