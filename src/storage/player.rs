use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::Result;
use crate::models::{HistoryRecord, Player, SteamId};
use crate::storage::{Store, ensure_players, push_id_list};

const PLAYER_COLUMNS: &str = "steam_id, personaname, vanity, avatar_hash, visibility_state, \
    profile_state, loc_country_code, loc_state_code, loc_city_id, time_created, \
    community_banned, vac_banned, vac_bans, game_bans, last_banned_on, economy_ban, \
    summary_updated_on, bans_updated_on, created_on, updated_on";

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    let economy_ban: String = row.try_get("economy_ban")?;
    Ok(Player {
        steam_id: SteamId::from_i64(row.try_get("steam_id")?)?,
        personaname: row.try_get("personaname")?,
        vanity: row.try_get("vanity")?,
        avatar_hash: row.try_get("avatar_hash")?,
        visibility_state: row.try_get("visibility_state")?,
        profile_state: row.try_get("profile_state")?,
        loc_country_code: row.try_get("loc_country_code")?,
        loc_state_code: row.try_get("loc_state_code")?,
        loc_city_id: row.try_get("loc_city_id")?,
        time_created: row.try_get("time_created")?,
        community_banned: row.try_get("community_banned")?,
        vac_banned: row.try_get("vac_banned")?,
        vac_bans: row.try_get("vac_bans")?,
        game_bans: row.try_get("game_bans")?,
        last_banned_on: row.try_get("last_banned_on")?,
        economy_ban: economy_ban.parse().unwrap_or_default(),
        summary_updated_on: row.try_get("summary_updated_on")?,
        bans_updated_on: row.try_get("bans_updated_on")?,
        created_on: row.try_get("created_on")?,
        updated_on: row.try_get("updated_on")?,
    })
}

/// History tables share one shape: `(steam_id, <value>, created_on)`.
#[derive(Debug, Clone, Copy)]
enum History {
    Name,
    Avatar,
    Vanity,
}

impl History {
    fn table(self) -> &'static str {
        match self {
            History::Name => "player_names",
            History::Avatar => "player_avatars",
            History::Vanity => "player_vanity",
        }
    }

    fn column(self) -> &'static str {
        match self {
            History::Name => "persona_name",
            History::Avatar => "avatar_hash",
            History::Vanity => "vanity",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            History::Name => "name_id",
            History::Avatar => "avatar_id",
            History::Vanity => "vanity_id",
        }
    }
}

impl Store {
    pub async fn player_get(&self, id: SteamId) -> Result<Option<Player>> {
        let row = sqlx::query(&format!("SELECT {PLAYER_COLUMNS} FROM player WHERE steam_id = ?"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    pub async fn players_get(&self, ids: &[SteamId]) -> Result<Vec<Player>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PLAYER_COLUMNS} FROM player WHERE steam_id IN"));
        push_id_list(&mut qb, ids);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(player_from_row).collect()
    }

    /// The stored player, or a freshly created minimal row.
    pub async fn player_get_or_create(&self, id: SteamId) -> Result<Player> {
        let mut conn = self.pool.acquire().await?;
        ensure_players(&mut conn, &[id], Utc::now()).await?;
        let row = sqlx::query(&format!("SELECT {PLAYER_COLUMNS} FROM player WHERE steam_id = ?"))
            .bind(id.as_i64())
            .fetch_one(&mut *conn)
            .await?;
        player_from_row(&row)
    }

    /// Insert or overwrite every column of `player`.
    pub async fn player_save(&self, player: &Player) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO player ({PLAYER_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (steam_id) DO UPDATE SET
                personaname = excluded.personaname,
                vanity = excluded.vanity,
                avatar_hash = excluded.avatar_hash,
                visibility_state = excluded.visibility_state,
                profile_state = excluded.profile_state,
                loc_country_code = excluded.loc_country_code,
                loc_state_code = excluded.loc_state_code,
                loc_city_id = excluded.loc_city_id,
                time_created = excluded.time_created,
                community_banned = excluded.community_banned,
                vac_banned = excluded.vac_banned,
                vac_bans = excluded.vac_bans,
                game_bans = excluded.game_bans,
                last_banned_on = excluded.last_banned_on,
                economy_ban = excluded.economy_ban,
                summary_updated_on = excluded.summary_updated_on,
                bans_updated_on = excluded.bans_updated_on,
                updated_on = excluded.updated_on"
        ))
        .bind(player.steam_id.as_i64())
        .bind(&player.personaname)
        .bind(&player.vanity)
        .bind(&player.avatar_hash)
        .bind(player.visibility_state)
        .bind(player.profile_state)
        .bind(&player.loc_country_code)
        .bind(&player.loc_state_code)
        .bind(player.loc_city_id)
        .bind(player.time_created)
        .bind(player.community_banned)
        .bind(player.vac_banned)
        .bind(player.vac_bans)
        .bind(player.game_bans)
        .bind(player.last_banned_on)
        .bind(player.economy_ban.as_str())
        .bind(player.summary_updated_on)
        .bind(player.bans_updated_on)
        .bind(player.created_on)
        .bind(player.updated_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Up to `limit` players whose summary is older than `older_than`,
    /// never refreshed ones first, then oldest first.
    pub async fn players_expired(
        &self,
        limit: u32,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<SteamId>> {
        let rows = sqlx::query(
            "SELECT steam_id FROM player
             WHERE summary_updated_on IS NULL OR summary_updated_on < ?
             ORDER BY summary_updated_on ASC
             LIMIT ?",
        )
        .bind(older_than)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| SteamId::from_i64(r.try_get("steam_id")?))
            .collect()
    }

    /// Append name, avatar and vanity values that differ from the last
    /// stored value of each history.
    pub async fn player_record_history(
        &self,
        id: SteamId,
        name: &str,
        avatar_hash: &str,
        vanity: &str,
    ) -> Result<usize> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        ensure_players(&mut tx, &[id], now).await?;

        let mut written = 0;
        for (kind, value) in [
            (History::Name, name),
            (History::Avatar, avatar_hash),
            (History::Vanity, vanity),
        ] {
            if value.is_empty() {
                continue;
            }
            let last: Option<String> = sqlx::query_scalar(&format!(
                "SELECT {col} FROM {table} WHERE steam_id = ? ORDER BY {id} DESC LIMIT 1",
                col = kind.column(),
                table = kind.table(),
                id = kind.id_column(),
            ))
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;

            if last.as_deref() == Some(value) {
                continue;
            }
            sqlx::query(&format!(
                "INSERT INTO {table} (steam_id, {col}, created_on) VALUES (?, ?, ?)",
                table = kind.table(),
                col = kind.column(),
            ))
            .bind(id.as_i64())
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    /// Name history, newest first.
    pub async fn player_names(&self, id: SteamId) -> Result<Vec<HistoryRecord>> {
        self.history(History::Name, id).await
    }

    pub async fn player_avatars(&self, id: SteamId) -> Result<Vec<HistoryRecord>> {
        self.history(History::Avatar, id).await
    }

    pub async fn player_vanities(&self, id: SteamId) -> Result<Vec<HistoryRecord>> {
        self.history(History::Vanity, id).await
    }

    async fn history(&self, kind: History, id: SteamId) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {col} AS value, created_on FROM {table} WHERE steam_id = ? ORDER BY {id} DESC",
            col = kind.column(),
            table = kind.table(),
            id = kind.id_column(),
        ))
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(HistoryRecord {
                    steam_id: id,
                    value: r.try_get("value")?,
                    created_on: r.try_get("created_on")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::models::{DEFAULT_AVATAR_HASH, PlayerSummary};
    use crate::storage::test_store;

    use super::*;

    fn sid(account: u32) -> SteamId {
        SteamId::from_account_id(account).unwrap()
    }

    #[tokio::test]
    async fn get_or_create_always_yields_a_row() {
        let store = test_store().await;
        assert!(store.player_get(sid(1)).await.unwrap().is_none());

        let created = store.player_get_or_create(sid(1)).await.unwrap();
        assert_eq!(created.avatar_hash, DEFAULT_AVATAR_HASH);
        assert!(created.summary_updated_on.is_none());

        let again = store.player_get_or_create(sid(1)).await.unwrap();
        assert_eq!(again.created_on, created.created_on);
    }

    #[tokio::test]
    async fn save_round_trips_summary_fields() {
        let store = test_store().await;
        let mut player = store.player_get_or_create(sid(5)).await.unwrap();
        let summary = PlayerSummary {
            steamid: sid(5).to_string(),
            personaname: "someone".into(),
            profileurl: "https://steamcommunity.com/id/someone/".into(),
            avatarhash: "abc".into(),
            communityvisibilitystate: 3,
            timecreated: 1_300_000_000,
            ..Default::default()
        };
        player.apply_summary(&summary, Utc::now());
        store.player_save(&player).await.unwrap();

        let stored = store.player_get(sid(5)).await.unwrap().unwrap();
        assert_eq!(stored.personaname, "someone");
        assert_eq!(stored.vanity, "someone");
        assert_eq!(stored.visibility_state, 3);
        assert!(stored.time_created.is_some());
        assert_eq!(store.players_get(&[sid(5), sid(6)]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_players_oldest_first() {
        let store = test_store().await;
        let now = Utc::now();
        for (account, age_hours) in [(1, Some(1)), (2, Some(48)), (3, None), (4, Some(24))] {
            let mut player = store.player_get_or_create(sid(account)).await.unwrap();
            player.summary_updated_on = age_hours.map(|h| now - Duration::hours(h));
            store.player_save(&player).await.unwrap();
        }

        let expired = store
            .players_expired(100, now - Duration::hours(12))
            .await
            .unwrap();
        assert_eq!(expired, vec![sid(3), sid(2), sid(4)]);

        let limited = store.players_expired(1, now).await.unwrap();
        assert_eq!(limited, vec![sid(3)]);
    }

    #[tokio::test]
    async fn history_only_appends_changes() {
        let store = test_store().await;
        let id = sid(9);
        assert_eq!(store.player_record_history(id, "a", "h1", "").await.unwrap(), 2);
        assert_eq!(store.player_record_history(id, "a", "h1", "").await.unwrap(), 0);
        assert_eq!(store.player_record_history(id, "b", "h1", "v").await.unwrap(), 2);
        assert_eq!(store.player_record_history(id, "a", "h1", "v").await.unwrap(), 1);

        let names = store.player_names(id).await.unwrap();
        let values: Vec<&str> = names.iter().map(|n| n.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "a"]);
        for pair in names.windows(2) {
            assert_ne!(pair[0].value, pair[1].value);
        }
        assert_eq!(store.player_vanities(id).await.unwrap().len(), 1);
        assert_eq!(store.player_avatars(id).await.unwrap().len(), 1);
    }
}
