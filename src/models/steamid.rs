//! Canonical 64-bit community identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AppError, Result};

/// Offset between an individual account id and its community id.
const BASE_ID: u64 = 76_561_197_960_265_728;

/// Largest batch the read API and the Steam adapters accept.
pub const MAX_IDS: usize = 100;

/// A validated individual-account community identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SteamId(u64);

impl SteamId {
    /// Build from a raw 64-bit value, rejecting anything outside the
    /// individual-account range.
    pub fn new(id: u64) -> Result<Self> {
        if id <= BASE_ID || id >= BASE_ID + (1 << 32) {
            return Err(AppError::InvalidSteamId(id.to_string()));
        }
        Ok(Self(id))
    }

    pub fn from_account_id(account_id: u32) -> Result<Self> {
        Self::new(BASE_ID + account_id as u64)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Database representation; every valid id fits comfortably in i64.
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        u64::try_from(value)
            .map_err(|_| AppError::InvalidSteamId(value.to_string()))
            .and_then(Self::new)
    }

    pub fn account_id(self) -> u32 {
        (self.0 - BASE_ID) as u32
    }

    /// `STEAM_0:Y:Z`
    pub fn steam2(self) -> String {
        let account = self.account_id();
        format!("STEAM_0:{}:{}", account & 1, account >> 1)
    }

    /// `[U:1:N]`
    pub fn steam3(self) -> String {
        format!("[U:1:{}]", self.account_id())
    }

    fn parse_steam2(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("STEAM_")?;
        let mut parts = rest.split(':');
        let _universe: u32 = parts.next()?.parse().ok()?;
        let y: u32 = parts.next()?.parse().ok()?;
        let z: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || y > 1 {
            return None;
        }
        Self::from_account_id(z.checked_mul(2)?.checked_add(y)?).ok()
    }

    fn parse_steam3(s: &str) -> Option<Self> {
        let inner = s.strip_prefix('[')?.strip_suffix(']')?;
        let mut parts = inner.split(':');
        if parts.next()? != "U" {
            return None;
        }
        let _universe: u32 = parts.next()?.parse().ok()?;
        let account: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::from_account_id(account).ok()
    }
}

impl FromStr for SteamId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        if let Some(id) = Self::parse_steam2(&upper) {
            return Ok(id);
        }
        if let Some(id) = Self::parse_steam3(&upper) {
            return Ok(id);
        }
        match trimmed.parse::<u64>() {
            Ok(value) if value > BASE_ID => Self::new(value),
            Ok(value) if value > 0 && value < (1 << 32) => Self::from_account_id(value as u32),
            _ => Err(AppError::InvalidSteamId(trimmed.to_string())),
        }
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SteamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for SteamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => SteamId::new(n).map_err(serde::de::Error::custom),
        }
    }
}

/// Parse a batch of user supplied identifiers, deduplicating while keeping
/// the input order.
pub fn parse_steam_ids<S: AsRef<str>>(raw: &[S]) -> Result<Vec<SteamId>> {
    if raw.len() > MAX_IDS {
        return Err(AppError::TooMany);
    }
    let mut ids: Vec<SteamId> = Vec::with_capacity(raw.len());
    for value in raw {
        let id: SteamId = value.as_ref().parse()?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_notations() {
        let expected = SteamId::new(76561197960265729).unwrap();
        assert_eq!("76561197960265729".parse::<SteamId>().unwrap(), expected);
        assert_eq!("STEAM_0:1:0".parse::<SteamId>().unwrap(), expected);
        assert_eq!("STEAM_1:1:0".parse::<SteamId>().unwrap(), expected);
        assert_eq!("[U:1:1]".parse::<SteamId>().unwrap(), expected);
        assert_eq!("1".parse::<SteamId>().unwrap(), expected);
    }

    #[test]
    fn formats_legacy_notations() {
        let id = SteamId::new(76561198084134025).unwrap();
        assert_eq!(id.steam3(), "[U:1:123868297]");
        assert_eq!(id.steam2(), "STEAM_0:1:61934148");
        assert_eq!(id.steam2().parse::<SteamId>().unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<SteamId>().is_err());
        assert!("STEAM_0:2:5".parse::<SteamId>().is_err());
        assert!("not a steam id".parse::<SteamId>().is_err());
        assert!(SteamId::new(12).is_err());
    }

    #[test]
    fn batch_limit_and_dedup() {
        let ids: Vec<String> = (1..=101).map(|i| i.to_string()).collect();
        assert!(matches!(parse_steam_ids(&ids), Err(AppError::TooMany)));

        let parsed = parse_steam_ids(&["[U:1:5]", "76561197960265733", "[U:1:6]"]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].account_id(), 5);
    }

    #[test]
    fn serializes_as_string() {
        let id = SteamId::new(76561197960265729).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"76561197960265729\"");
        let back: SteamId = serde_json::from_str("76561197960265729").unwrap();
        assert_eq!(back, id);
    }
}
