use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::Result;
use crate::models::{ServemeRecord, SteamId};
use crate::pipeline::diff::DiffResult;
use crate::storage::{Store, ensure_players, push_id_list};

fn record_from_row(row: &SqliteRow) -> Result<ServemeRecord> {
    Ok(ServemeRecord {
        steam_id: SteamId::from_i64(row.try_get("steam_id")?)?,
        name: row.try_get("name")?,
        reason: row.try_get("reason")?,
        deleted: row.try_get("deleted")?,
        created_on: row.try_get("created_on")?,
        updated_on: row.try_get("updated_on")?,
    })
}

impl Store {
    /// Live serveme records.
    pub async fn serveme_records(&self) -> Result<Vec<ServemeRecord>> {
        let rows = sqlx::query(
            "SELECT steam_id, name, reason, deleted, created_on, updated_on
             FROM serveme WHERE deleted = 0 ORDER BY steam_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn serveme_for(&self, ids: &[SteamId]) -> Result<Vec<ServemeRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT steam_id, name, reason, deleted, created_on, updated_on
             FROM serveme WHERE deleted = 0 AND steam_id IN",
        );
        push_id_list(&mut qb, ids);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Apply a reconciled serveme snapshot in one transaction. A player who
    /// was tombstoned earlier and reappears is revived in place.
    pub async fn serveme_apply(&self, diff: &DiffResult<ServemeRecord>) -> Result<()> {
        if !diff.has_changes() {
            return Ok(());
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let ids: Vec<SteamId> = diff.new.iter().map(|r| r.steam_id).collect();
        ensure_players(&mut tx, &ids, now).await?;

        for record in &diff.new {
            sqlx::query(
                "INSERT INTO serveme (steam_id, name, reason, deleted, created_on, updated_on)
                 VALUES (?, ?, ?, 0, ?, ?)
                 ON CONFLICT (steam_id) DO UPDATE SET
                    name = excluded.name, reason = excluded.reason,
                    deleted = 0, updated_on = excluded.updated_on",
            )
            .bind(record.steam_id.as_i64())
            .bind(&record.name)
            .bind(&record.reason)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for record in &diff.updated {
            sqlx::query("UPDATE serveme SET name = ?, reason = ?, updated_on = ? WHERE steam_id = ?")
                .bind(&record.name)
                .bind(&record.reason)
                .bind(now)
                .bind(record.steam_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }

        for record in &diff.deleted {
            sqlx::query("UPDATE serveme SET deleted = 1, updated_on = ? WHERE steam_id = ?")
                .bind(now)
                .bind(record.steam_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
