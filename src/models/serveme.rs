//! serve.me booking bans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SteamId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServemeRecord {
    pub steam_id: SteamId,
    pub name: String,
    pub reason: String,
    pub deleted: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}
