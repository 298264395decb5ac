use std::collections::HashMap;

use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::{AppError, Result};
use crate::models::{
    LogsTfClassWeapon, LogsTfMatch, LogsTfMedicStat, LogsTfPlayerClass, LogsTfPlayerStat,
    LogsTfRound, LogsTfSummary, SteamId, Team,
};
use crate::storage::{Store, push_id_list};

const CHILD_TABLES: &[&str] = &[
    "logstf_player_class_weapon",
    "logstf_player_class",
    "logstf_player",
    "logstf_medic",
    "logstf_round",
];

fn team_of(raw: &str) -> Result<Team> {
    Team::parse(raw).ok_or_else(|| AppError::parse("logstf team", raw))
}

impl Store {
    /// Store a whole match tree, replacing any earlier copy.
    pub async fn logstf_save(&self, m: &LogsTfMatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in CHILD_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE log_id = ?"))
                .bind(m.log_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "INSERT INTO logstf (log_id, title, map, duration, score_red, score_blu, created_on)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (log_id) DO UPDATE SET
                title = excluded.title, map = excluded.map, duration = excluded.duration,
                score_red = excluded.score_red, score_blu = excluded.score_blu,
                created_on = excluded.created_on, deleted = 0",
        )
        .bind(m.log_id)
        .bind(&m.title)
        .bind(&m.map)
        .bind(m.duration)
        .bind(m.score_red)
        .bind(m.score_blu)
        .bind(m.created_on)
        .execute(&mut *tx)
        .await?;

        for r in &m.rounds {
            sqlx::query(
                "INSERT INTO logstf_round
                    (log_id, round, length, score_red, score_blu, kills_red, kills_blu,
                     ubers_red, ubers_blu, damage_red, damage_blu, midfight)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(m.log_id)
            .bind(r.round)
            .bind(r.length)
            .bind(r.score_red)
            .bind(r.score_blu)
            .bind(r.kills_red)
            .bind(r.kills_blu)
            .bind(r.ubers_red)
            .bind(r.ubers_blu)
            .bind(r.damage_red)
            .bind(r.damage_blu)
            .bind(r.midfight.map(Team::as_str))
            .execute(&mut *tx)
            .await?;
        }

        for p in &m.players {
            sqlx::query(
                "INSERT OR REPLACE INTO logstf_player
                    (log_id, steam_id, team, name, kills, assists, deaths, damage, dpm,
                     damage_taken, healing_taken, headshots, airshots, caps)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(m.log_id)
            .bind(p.steam_id.as_i64())
            .bind(p.team.as_str())
            .bind(&p.name)
            .bind(p.kills)
            .bind(p.assists)
            .bind(p.deaths)
            .bind(p.damage)
            .bind(p.dpm)
            .bind(p.damage_taken)
            .bind(p.healing_taken)
            .bind(p.headshots)
            .bind(p.airshots)
            .bind(p.caps)
            .execute(&mut *tx)
            .await?;

            for class in &p.classes {
                sqlx::query(
                    "INSERT OR REPLACE INTO logstf_player_class
                        (log_id, steam_id, player_class, played, kills, assists, deaths, damage)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(m.log_id)
                .bind(p.steam_id.as_i64())
                .bind(&class.player_class)
                .bind(class.played)
                .bind(class.kills)
                .bind(class.assists)
                .bind(class.deaths)
                .bind(class.damage)
                .execute(&mut *tx)
                .await?;

                for weapon in &class.weapons {
                    sqlx::query(
                        "INSERT OR REPLACE INTO logstf_player_class_weapon
                            (log_id, steam_id, player_class, weapon, kills, damage, accuracy)
                         VALUES (?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(m.log_id)
                    .bind(p.steam_id.as_i64())
                    .bind(&class.player_class)
                    .bind(&weapon.weapon)
                    .bind(weapon.kills)
                    .bind(weapon.damage)
                    .bind(weapon.accuracy)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        for medic in &m.medics {
            sqlx::query(
                "INSERT OR REPLACE INTO logstf_medic
                    (log_id, steam_id, healing, charges, drops, avg_time_to_build, avg_uber_length,
                     near_full_charge_death, deaths_after_charge)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(m.log_id)
            .bind(medic.steam_id.as_i64())
            .bind(medic.healing)
            .bind(medic.charges)
            .bind(medic.drops)
            .bind(medic.avg_time_to_build)
            .bind(medic.avg_uber_length)
            .bind(medic.near_full_charge_death)
            .bind(medic.deaths_after_charge)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Highest stored log id, the resume point of the ingestion scan.
    pub async fn logstf_max_id(&self) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(log_id) FROM logstf")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    /// Stored matches per player. Players without a match are absent.
    pub async fn log_counts(&self, ids: &[SteamId]) -> Result<HashMap<SteamId, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.steam_id, COUNT(*) AS total
             FROM logstf_player p JOIN logstf l ON l.log_id = p.log_id
             WHERE l.deleted = 0 AND p.steam_id IN",
        );
        push_id_list(&mut qb, ids);
        qb.push(" GROUP BY p.steam_id");
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            counts.insert(SteamId::from_i64(row.try_get("steam_id")?)?, row.try_get("total")?);
        }
        Ok(counts)
    }

    /// A player's matches, newest first.
    pub async fn logs_for(&self, id: SteamId) -> Result<Vec<LogsTfSummary>> {
        let rows = sqlx::query(
            "SELECT l.log_id, l.title, l.map, l.duration, l.score_red, l.score_blu, l.created_on
             FROM logstf l JOIN logstf_player p ON p.log_id = l.log_id
             WHERE p.steam_id = ? AND l.deleted = 0
             ORDER BY l.log_id DESC",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(LogsTfSummary {
                    log_id: r.try_get("log_id")?,
                    title: r.try_get("title")?,
                    map: r.try_get("map")?,
                    duration: r.try_get("duration")?,
                    score_red: r.try_get("score_red")?,
                    score_blu: r.try_get("score_blu")?,
                    created_on: r.try_get("created_on")?,
                })
            })
            .collect()
    }

    /// Load a whole match tree.
    pub async fn logstf_get(&self, log_id: i64) -> Result<Option<LogsTfMatch>> {
        let Some(root) = sqlx::query(
            "SELECT log_id, title, map, duration, score_red, score_blu, created_on
             FROM logstf WHERE log_id = ? AND deleted = 0",
        )
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rounds = sqlx::query("SELECT * FROM logstf_round WHERE log_id = ? ORDER BY round")
            .bind(log_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| {
                let midfight: Option<String> = r.try_get("midfight")?;
                Ok(LogsTfRound {
                    round: r.try_get("round")?,
                    length: r.try_get("length")?,
                    score_red: r.try_get("score_red")?,
                    score_blu: r.try_get("score_blu")?,
                    kills_red: r.try_get("kills_red")?,
                    kills_blu: r.try_get("kills_blu")?,
                    ubers_red: r.try_get("ubers_red")?,
                    ubers_blu: r.try_get("ubers_blu")?,
                    damage_red: r.try_get("damage_red")?,
                    damage_blu: r.try_get("damage_blu")?,
                    midfight: midfight.as_deref().and_then(Team::parse),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let weapon_rows = sqlx::query(
            "SELECT * FROM logstf_player_class_weapon WHERE log_id = ? ORDER BY weapon",
        )
        .bind(log_id)
        .fetch_all(&self.pool)
        .await?;
        let mut weapons: HashMap<(i64, String), Vec<LogsTfClassWeapon>> = HashMap::new();
        for r in &weapon_rows {
            let key = (r.try_get("steam_id")?, r.try_get("player_class")?);
            weapons.entry(key).or_default().push(LogsTfClassWeapon {
                weapon: r.try_get("weapon")?,
                kills: r.try_get("kills")?,
                damage: r.try_get("damage")?,
                accuracy: r.try_get("accuracy")?,
            });
        }

        let class_rows = sqlx::query(
            "SELECT * FROM logstf_player_class WHERE log_id = ? ORDER BY played DESC",
        )
        .bind(log_id)
        .fetch_all(&self.pool)
        .await?;
        let mut classes: HashMap<i64, Vec<LogsTfPlayerClass>> = HashMap::new();
        for r in &class_rows {
            let steam_id: i64 = r.try_get("steam_id")?;
            let player_class: String = r.try_get("player_class")?;
            let class_weapons = weapons
                .remove(&(steam_id, player_class.clone()))
                .unwrap_or_default();
            classes.entry(steam_id).or_default().push(LogsTfPlayerClass {
                player_class,
                played: r.try_get("played")?,
                kills: r.try_get("kills")?,
                assists: r.try_get("assists")?,
                deaths: r.try_get("deaths")?,
                damage: r.try_get("damage")?,
                weapons: class_weapons,
            });
        }

        let players = sqlx::query("SELECT * FROM logstf_player WHERE log_id = ? ORDER BY team, name")
            .bind(log_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| {
                let raw_id: i64 = r.try_get("steam_id")?;
                let team: String = r.try_get("team")?;
                Ok(LogsTfPlayerStat {
                    steam_id: SteamId::from_i64(raw_id)?,
                    team: team_of(&team)?,
                    name: r.try_get("name")?,
                    kills: r.try_get("kills")?,
                    assists: r.try_get("assists")?,
                    deaths: r.try_get("deaths")?,
                    damage: r.try_get("damage")?,
                    dpm: r.try_get("dpm")?,
                    damage_taken: r.try_get("damage_taken")?,
                    healing_taken: r.try_get("healing_taken")?,
                    headshots: r.try_get("headshots")?,
                    airshots: r.try_get("airshots")?,
                    caps: r.try_get("caps")?,
                    classes: classes.remove(&raw_id).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let medics = sqlx::query("SELECT * FROM logstf_medic WHERE log_id = ? ORDER BY healing DESC")
            .bind(log_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| {
                Ok(LogsTfMedicStat {
                    steam_id: SteamId::from_i64(r.try_get("steam_id")?)?,
                    healing: r.try_get("healing")?,
                    charges: r.try_get("charges")?,
                    drops: r.try_get("drops")?,
                    avg_time_to_build: r.try_get("avg_time_to_build")?,
                    avg_uber_length: r.try_get("avg_uber_length")?,
                    near_full_charge_death: r.try_get("near_full_charge_death")?,
                    deaths_after_charge: r.try_get("deaths_after_charge")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(LogsTfMatch {
            log_id: root.try_get("log_id")?,
            title: root.try_get("title")?,
            map: root.try_get("map")?,
            duration: root.try_get("duration")?,
            score_red: root.try_get("score_red")?,
            score_blu: root.try_get("score_blu")?,
            created_on: root.try_get("created_on")?,
            rounds,
            players,
            medics,
        }))
    }
}
