//! Persistence gateway over SQLite.
//!
//! [`Store`] owns the connection pool and exposes typed operations for every
//! entity. Operations are grouped by source:
//!
//! ```text
//! storage/
//! ├── player.rs      # players, name/avatar/vanity history, expiry feed
//! ├── sourcebans.rs  # sites and append-only bans (also the crawl sink)
//! ├── bdlist.rs      # lists, entries, reconciliation, search
//! ├── serveme.rs     # serveme records, reconciliation
//! ├── league.rs      # league bans, RGL seasons/teams/matches
//! ├── logstf.rs      # match trees and per-player counts
//! └── servers.rs     # Steam master list snapshot
//! ```
//!
//! Getters return `Ok(None)` for a missing row and `Err` only for query
//! failures. Multi-statement writes run inside one transaction, and a
//! transaction never issues pool queries while it is open.

mod bdlist;
mod league;
mod logstf;
mod player;
mod serveme;
mod servers;
mod sourcebans;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::Result;
use crate::models::{Config, SteamId};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the database described by `config` and bring its schema up to date.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = Self::connect(&config.dsn, config.database_max_connections).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Open a pool without running migrations.
    ///
    /// An in-memory database exists once per connection, so memory DSNs
    /// are pinned to a single connection that is never recycled.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self> {
        let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        log::debug!("Connected to {}", redact_dsn(dsn));
        Ok(Self { pool })
    }

    /// Apply pending forward-only migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Drop anything that looks like credentials before logging a DSN.
fn redact_dsn(dsn: &str) -> &str {
    dsn.split('?').next().unwrap_or(dsn)
}

/// Make sure a minimal player row exists for every id, so rows in child
/// tables never violate their foreign key.
pub(crate) async fn ensure_players(
    conn: &mut SqliteConnection,
    ids: &[SteamId],
    now: DateTime<Utc>,
) -> Result<()> {
    for id in ids {
        sqlx::query(
            "INSERT OR IGNORE INTO player (steam_id, avatar_hash, created_on, updated_on)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id.as_i64())
        .bind(crate::models::DEFAULT_AVATAR_HASH)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// `<prefix> (?, ?, ...)` for an id list.
pub(crate) fn push_id_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, ids: &[SteamId]) {
    qb.push(" (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.as_i64());
    }
    separated.push_unseparated(")");
}

/// Decode a JSON array column, treating garbage as empty.
pub(crate) fn json_list<T: serde::de::DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    let store = Store::connect("sqlite::memory:", 1).await.unwrap();
    store.migrate().await.unwrap();
    store
}
