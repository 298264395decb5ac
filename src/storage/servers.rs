use chrono::Utc;
use sqlx::Row;

use crate::error::Result;
use crate::models::SteamServer;
use crate::storage::Store;

impl Store {
    /// Replace the master list snapshot wholesale.
    pub async fn steam_servers_replace(&self, servers: &[SteamServer]) -> Result<usize> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM steam_server").execute(&mut *tx).await?;

        for s in servers {
            sqlx::query(
                "INSERT INTO steam_server
                    (addr, gameport, steamid, name, appid, gamedir, version, product, region,
                     players, max_players, bots, map, secure, dedicated, os, gametype, updated_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&s.addr)
            .bind(s.gameport)
            .bind(&s.steamid)
            .bind(&s.name)
            .bind(s.appid)
            .bind(&s.gamedir)
            .bind(&s.version)
            .bind(&s.product)
            .bind(s.region)
            .bind(s.players)
            .bind(s.max_players)
            .bind(s.bots)
            .bind(&s.map)
            .bind(s.secure)
            .bind(s.dedicated)
            .bind(&s.os)
            .bind(&s.gametype)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(servers.len())
    }

    pub async fn steam_servers(&self) -> Result<Vec<SteamServer>> {
        let rows = sqlx::query("SELECT * FROM steam_server ORDER BY players DESC, addr")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(SteamServer {
                    addr: r.try_get("addr")?,
                    gameport: r.try_get("gameport")?,
                    steamid: r.try_get("steamid")?,
                    name: r.try_get("name")?,
                    appid: r.try_get("appid")?,
                    gamedir: r.try_get("gamedir")?,
                    version: r.try_get("version")?,
                    product: r.try_get("product")?,
                    region: r.try_get("region")?,
                    players: r.try_get("players")?,
                    max_players: r.try_get("max_players")?,
                    bots: r.try_get("bots")?,
                    map: r.try_get("map")?,
                    secure: r.try_get("secure")?,
                    dedicated: r.try_get("dedicated")?,
                    os: r.try_get("os")?,
                    gametype: r.try_get("gametype")?,
                })
            })
            .collect()
    }
}
