use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::error::Result;
use crate::models::{SbBanRecord, SbRecord, SbSite, Site, SteamId};
use crate::services::sourcebans::BanSink;
use crate::storage::{Store, ensure_players, push_id_list};

async fn site_id(conn: &mut SqliteConnection, site: Site) -> Result<i64> {
    let now = Utc::now();
    sqlx::query(
        "INSERT OR IGNORE INTO sb_site (name, created_on, updated_on) VALUES (?, ?, ?)",
    )
    .bind(site.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT sb_site_id FROM sb_site WHERE name = ?")
        .bind(site.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

impl Store {
    /// Site row for `site`, created on first use.
    pub async fn sb_site_get_or_create(&self, site: Site) -> Result<SbSite> {
        let mut conn = self.pool.acquire().await?;
        let id = site_id(&mut conn, site).await?;
        let row = sqlx::query("SELECT sb_site_id, name, created_on, updated_on FROM sb_site WHERE sb_site_id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(SbSite {
            site_id: row.try_get("sb_site_id")?,
            name: row.try_get("name")?,
            created_on: row.try_get("created_on")?,
            updated_on: row.try_get("updated_on")?,
        })
    }

    /// Append bans, ignoring any already stored for the same site, player
    /// and ban date. Returns how many rows were new.
    pub async fn sb_bans_store(&self, site: Site, records: &[SbRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let site_id = site_id(&mut tx, site).await?;
        let ids: Vec<SteamId> = records.iter().map(|r| r.steam_id).collect();
        ensure_players(&mut tx, &ids, now).await?;

        let mut inserted = 0;
        for record in records {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO sb_ban
                    (sb_site_id, steam_id, persona_name, reason, duration, permanent, created_on, updated_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(site_id)
            .bind(record.steam_id.as_i64())
            .bind(&record.name)
            .bind(&record.reason)
            .bind(record.duration)
            .bind(record.permanent)
            .bind(record.created_on)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Non-deleted bans for the given players, newest first.
    pub async fn sb_bans_for(&self, ids: &[SteamId]) -> Result<Vec<SbBanRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT b.sb_ban_id, b.sb_site_id, s.name AS site_name, b.steam_id, b.persona_name,
                    b.reason, b.duration, b.permanent, b.created_on, b.updated_on
             FROM sb_ban b
             JOIN sb_site s ON s.sb_site_id = b.sb_site_id
             WHERE b.deleted = 0 AND b.steam_id IN",
        );
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY b.created_on DESC");
        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|r| {
                Ok(SbBanRecord {
                    ban_id: r.try_get("sb_ban_id")?,
                    site_id: r.try_get("sb_site_id")?,
                    site_name: r.try_get("site_name")?,
                    steam_id: SteamId::from_i64(r.try_get("steam_id")?)?,
                    persona_name: r.try_get("persona_name")?,
                    reason: r.try_get("reason")?,
                    duration: r.try_get("duration")?,
                    permanent: r.try_get("permanent")?,
                    created_on: r.try_get("created_on")?,
                    updated_on: r.try_get("updated_on")?,
                })
            })
            .collect()
    }

    pub async fn sb_sites(&self) -> Result<Vec<SbSite>> {
        let rows = sqlx::query("SELECT sb_site_id, name, created_on, updated_on FROM sb_site ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(SbSite {
                    site_id: r.try_get("sb_site_id")?,
                    name: r.try_get("name")?,
                    created_on: r.try_get("created_on")?,
                    updated_on: r.try_get("updated_on")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BanSink for Store {
    async fn store_bans(&self, site: Site, records: &[SbRecord]) -> Result<usize> {
        self.sb_bans_store(site, records).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone};

    use crate::storage::test_store;

    use super::*;

    fn record(account: u32, day: u32) -> SbRecord {
        SbRecord {
            name: format!("p{account}"),
            steam_id: SteamId::from_account_id(account).unwrap(),
            reason: "Cheating".into(),
            created_on: Utc.with_ymd_and_hms(2023, 5, day, 3, 7, 0).unwrap(),
            duration: 0,
            permanent: true,
        }
    }

    #[tokio::test]
    async fn duplicate_bans_are_ignored() {
        let store = test_store().await;
        let batch = vec![record(1, 1), record(2, 1)];
        assert_eq!(store.sb_bans_store(Site::Skial, &batch).await.unwrap(), 2);
        assert_eq!(store.sb_bans_store(Site::Skial, &batch).await.unwrap(), 0);

        // Same player, new ban date: a distinct ban.
        assert_eq!(store.sb_bans_store(Site::Skial, &[record(1, 2)]).await.unwrap(), 1);
        // Same ban on another site is its own record.
        assert_eq!(store.sb_bans_store(Site::Gfl, &[record(1, 1)]).await.unwrap(), 1);

        let bans = store.sb_bans_for(&[record(1, 1).steam_id]).await.unwrap();
        assert_eq!(bans.len(), 3);
        assert_eq!(bans[0].created_on.day0(), 1);
        assert_eq!(store.sb_sites().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn store_is_a_ban_sink() {
        let store = test_store().await;
        let sink: &dyn BanSink = &store;
        assert_eq!(sink.store_bans(Site::Ugc, &[record(3, 4)]).await.unwrap(), 1);

        let site = store.sb_site_get_or_create(Site::Ugc).await.unwrap();
        assert_eq!(site.name, "ugc");
        let bans = store.sb_bans_for(&[record(3, 4).steam_id]).await.unwrap();
        assert_eq!(bans[0].site_id, site.site_id);
        assert_eq!(bans[0].site_name, "ugc");
        assert!(bans[0].permanent);
    }
}
