//! Game servers reported by the Steam master list.

use serde::{Deserialize, Serialize};

/// `IGameServersService/GetServerList` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamServer {
    /// `ip:query_port`
    pub addr: String,
    pub gameport: i32,
    pub steamid: String,
    pub name: String,
    pub appid: i32,
    pub gamedir: String,
    pub version: String,
    pub product: String,
    pub region: i32,
    pub players: i32,
    pub max_players: i32,
    pub bots: i32,
    pub map: String,
    pub secure: bool,
    pub dedicated: bool,
    pub os: String,
    pub gametype: String,
}

impl SteamServer {
    /// Server tags as a list.
    pub fn tags(&self) -> Vec<&str> {
        self.gametype
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_master_list_entry() {
        let raw = r#"{"addr":"1.2.3.4:27015","gameport":27015,"name":"Uncletopia | Seattle",
            "appid":440,"players":24,"max_players":24,"map":"pl_badwater","secure":true,
            "gametype":"alltalk,nocrits,payload"}"#;
        let server: SteamServer = serde_json::from_str(raw).unwrap();
        assert_eq!(server.players, 24);
        assert_eq!(server.tags(), vec!["alltalk", "nocrits", "payload"]);
        assert_eq!(server.region, 0);
    }
}
