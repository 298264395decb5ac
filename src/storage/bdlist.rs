use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::{AppError, Result};
use crate::models::{BdList, BdListEntry, BdSearchResult, SteamId};
use crate::pipeline::diff::DiffResult;
use crate::storage::{Store, ensure_players, json_list, push_id_list};

const LIST_COLUMNS: &str =
    "bd_list_id, name, url, game, trust_weight, deleted, created_on, updated_on";

const ENTRY_COLUMNS: &str = "e.bd_list_entry_id, e.bd_list_id, e.steam_id, e.attributes, e.proof, \
    e.last_seen, e.last_name, e.deleted, e.created_on, e.updated_on";

fn list_from_row(row: &SqliteRow) -> Result<BdList> {
    Ok(BdList {
        list_id: row.try_get("bd_list_id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        game: row.try_get("game")?,
        trust_weight: row.try_get("trust_weight")?,
        deleted: row.try_get("deleted")?,
        created_on: row.try_get("created_on")?,
        updated_on: row.try_get("updated_on")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<BdListEntry> {
    let attributes: String = row.try_get("attributes")?;
    let proof: String = row.try_get("proof")?;
    Ok(BdListEntry {
        entry_id: row.try_get("bd_list_entry_id")?,
        list_id: row.try_get("bd_list_id")?,
        steam_id: SteamId::from_i64(row.try_get("steam_id")?)?,
        attributes: json_list(&attributes),
        proof: json_list(&proof),
        last_seen: row.try_get("last_seen")?,
        last_name: row.try_get("last_name")?,
        deleted: row.try_get("deleted")?,
        created_on: row.try_get("created_on")?,
        updated_on: row.try_get("updated_on")?,
    })
}

impl Store {
    pub async fn bd_list_create(
        &self,
        name: &str,
        url: &str,
        game: &str,
        trust_weight: i32,
    ) -> Result<BdList> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("list name is empty"));
        }
        url::Url::parse(url)?;
        if !(0..=10).contains(&trust_weight) {
            return Err(AppError::validation(format!(
                "trust weight {trust_weight} is outside 0..=10"
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO bd_list (name, url, game, trust_weight, created_on, updated_on)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(url)
        .bind(game)
        .bind(trust_weight)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from);

        match result {
            Ok(done) => Ok(BdList {
                list_id: done.last_insert_rowid(),
                name: name.to_string(),
                url: url.to_string(),
                game: game.to_string(),
                trust_weight,
                deleted: false,
                created_on: now,
                updated_on: now,
            }),
            Err(e) if e.is_unique_violation() => {
                Err(AppError::validation(format!("list '{name}' already exists")))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn bd_list_get_by_name(&self, name: &str) -> Result<Option<BdList>> {
        let row = sqlx::query(&format!("SELECT {LIST_COLUMNS} FROM bd_list WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(list_from_row).transpose()
    }

    pub async fn bd_lists(&self, include_deleted: bool) -> Result<Vec<BdList>> {
        let rows = sqlx::query(&format!(
            "SELECT {LIST_COLUMNS} FROM bd_list WHERE deleted = 0 OR ? ORDER BY name"
        ))
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(list_from_row).collect()
    }

    /// Soft delete a list by name. Returns false when no live list matched.
    pub async fn bd_list_delete(&self, name: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE bd_list SET deleted = 1, updated_on = ? WHERE name = ? AND deleted = 0")
                .bind(Utc::now())
                .bind(name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Live entries of one list.
    pub async fn bd_list_entries(&self, list_id: i64) -> Result<Vec<BdListEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM bd_list_entry e
             WHERE e.bd_list_id = ? AND e.deleted = 0
             ORDER BY e.bd_list_entry_id"
        ))
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Apply a reconciled snapshot of one list in a single transaction:
    /// create, then update, then tombstone.
    pub async fn bd_list_apply(&self, list_id: i64, diff: &DiffResult<BdListEntry>) -> Result<()> {
        if !diff.has_changes() {
            return Ok(());
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let ids: Vec<SteamId> = diff.new.iter().map(|e| e.steam_id).collect();
        ensure_players(&mut tx, &ids, now).await?;

        for entry in &diff.new {
            sqlx::query(
                "INSERT INTO bd_list_entry
                    (bd_list_id, steam_id, attributes, proof, last_seen, last_name, created_on, updated_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(list_id)
            .bind(entry.steam_id.as_i64())
            .bind(serde_json::to_string(&BdListEntry::normalize_attributes(&entry.attributes))?)
            .bind(serde_json::to_string(&entry.proof)?)
            .bind(entry.last_seen)
            .bind(&entry.last_name)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &diff.updated {
            sqlx::query(
                "UPDATE bd_list_entry
                 SET attributes = ?, proof = ?, last_seen = ?, last_name = ?, updated_on = ?
                 WHERE bd_list_entry_id = ?",
            )
            .bind(serde_json::to_string(&BdListEntry::normalize_attributes(&entry.attributes))?)
            .bind(serde_json::to_string(&entry.proof)?)
            .bind(entry.last_seen)
            .bind(&entry.last_name)
            .bind(now)
            .bind(entry.entry_id)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &diff.deleted {
            sqlx::query("UPDATE bd_list_entry SET deleted = 1, updated_on = ? WHERE bd_list_entry_id = ?")
                .bind(now)
                .bind(entry.entry_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Live entries of live lists for the given players. When `attrs` is not
    /// empty only entries carrying at least one of them are returned.
    pub async fn bd_search(&self, ids: &[SteamId], attrs: &[String]) -> Result<Vec<BdSearchResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS}, l.name AS list_name, l.trust_weight
             FROM bd_list_entry e
             JOIN bd_list l ON l.bd_list_id = e.bd_list_id
             WHERE e.deleted = 0 AND l.deleted = 0 AND e.steam_id IN"
        ));
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY l.trust_weight DESC, l.name");
        let rows = qb.build().fetch_all(&self.pool).await?;

        let wanted = BdListEntry::normalize_attributes(attrs);
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = entry_from_row(row)?;
            if !wanted.is_empty() && !entry.attributes.iter().any(|a| wanted.contains(a)) {
                continue;
            }
            results.push(BdSearchResult {
                list_name: row.try_get("list_name")?,
                trust_weight: row.try_get("trust_weight")?,
                entry,
            });
        }
        Ok(results)
    }
}
