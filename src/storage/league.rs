use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::Result;
use crate::models::{League, LeagueBan, RglMatch, RglSeason, RglTeam, RglTeamMember, SteamId};
use crate::storage::{Store, json_list};

fn team_from_row(row: &SqliteRow) -> Result<RglTeam> {
    Ok(RglTeam {
        team_id: row.try_get("team_id")?,
        season_id: row.try_get("season_id")?,
        division_id: row.try_get("division_id")?,
        division_name: row.try_get("division_name")?,
        team_leader: row.try_get("team_leader")?,
        tag: row.try_get("tag")?,
        name: row.try_get("name")?,
        final_rank: row.try_get("final_rank")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        members: Vec::new(),
    })
}

fn match_from_row(row: &SqliteRow) -> Result<RglMatch> {
    Ok(RglMatch {
        match_id: row.try_get("match_id")?,
        season_id: row.try_get("season_id")?,
        division_id: row.try_get("division_id")?,
        division_name: row.try_get("division_name")?,
        region_id: row.try_get("region_id")?,
        match_date: row.try_get("match_date")?,
        match_name: row.try_get("match_name")?,
        is_forfeit: row.try_get("is_forfeit")?,
        winner: row.try_get("winner")?,
        team_id_a: row.try_get("team_id_a")?,
        points_a: row.try_get("points_a")?,
        team_id_b: row.try_get("team_id_b")?,
        points_b: row.try_get("points_b")?,
    })
}

impl Store {
    /// Replace every stored ban of `league` with `bans`.
    pub async fn league_bans_replace(&self, league: League, bans: &[LeagueBan]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM league_ban WHERE league = ?")
            .bind(league.as_str())
            .execute(&mut *tx)
            .await?;
        for ban in bans {
            sqlx::query(
                "INSERT INTO league_ban (league, steam_id, alias, reason, created_at, expires_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(league.as_str())
            .bind(ban.steam_id.as_i64())
            .bind(&ban.alias)
            .bind(&ban.reason)
            .bind(ban.created_at)
            .bind(ban.expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        log::info!("Replaced {} {} bans", bans.len(), league.as_str());
        Ok(bans.len())
    }

    pub async fn league_bans(&self, league: League) -> Result<Vec<LeagueBan>> {
        let rows = sqlx::query(
            "SELECT steam_id, alias, reason, created_at, expires_at
             FROM league_ban WHERE league = ? ORDER BY created_at DESC",
        )
        .bind(league.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(LeagueBan {
                    steam_id: SteamId::from_i64(r.try_get("steam_id")?)?,
                    alias: r.try_get("alias")?,
                    reason: r.try_get("reason")?,
                    created_at: r.try_get("created_at")?,
                    expires_at: r.try_get("expires_at")?,
                })
            })
            .collect()
    }

    /// Upsert a season with its teams (and their members) and matches in
    /// one transaction.
    pub async fn rgl_season_save(
        &self,
        season: &RglSeason,
        teams: &[RglTeam],
        matches: &[RglMatch],
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO rgl_season
                (season_id, name, maps, format_name, region_name, participating_teams, matches, created_on, updated_on)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (season_id) DO UPDATE SET
                name = excluded.name, maps = excluded.maps, format_name = excluded.format_name,
                region_name = excluded.region_name, participating_teams = excluded.participating_teams,
                matches = excluded.matches, deleted = 0, updated_on = excluded.updated_on",
        )
        .bind(season.season_id)
        .bind(&season.name)
        .bind(serde_json::to_string(&season.maps)?)
        .bind(&season.format_name)
        .bind(&season.region_name)
        .bind(serde_json::to_string(&season.participating_teams)?)
        .bind(serde_json::to_string(&season.matches)?)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for team in teams {
            sqlx::query(
                "INSERT INTO rgl_team
                    (team_id, season_id, division_id, division_name, team_leader, tag, name,
                     final_rank, created_at, updated_at, created_on, updated_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (team_id) DO UPDATE SET
                    season_id = excluded.season_id, division_id = excluded.division_id,
                    division_name = excluded.division_name, team_leader = excluded.team_leader,
                    tag = excluded.tag, name = excluded.name, final_rank = excluded.final_rank,
                    created_at = excluded.created_at, updated_at = excluded.updated_at,
                    deleted = 0, updated_on = excluded.updated_on",
            )
            .bind(team.team_id)
            .bind(team.season_id)
            .bind(team.division_id)
            .bind(&team.division_name)
            .bind(&team.team_leader)
            .bind(&team.tag)
            .bind(&team.name)
            .bind(team.final_rank)
            .bind(team.created_at)
            .bind(team.updated_at)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM rgl_team_member WHERE team_id = ?")
                .bind(team.team_id)
                .execute(&mut *tx)
                .await?;
            for member in &team.members {
                sqlx::query(
                    "INSERT OR REPLACE INTO rgl_team_member
                        (team_id, steam_id, name, is_leader, joined_at, left_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(team.team_id)
                .bind(member.steam_id.as_i64())
                .bind(&member.name)
                .bind(member.is_leader)
                .bind(member.joined_at)
                .bind(member.left_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        for m in matches {
            sqlx::query(
                "INSERT INTO rgl_match
                    (match_id, season_id, division_id, division_name, region_id, match_date, match_name,
                     is_forfeit, winner, team_id_a, points_a, team_id_b, points_b, created_on, updated_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (match_id) DO UPDATE SET
                    season_id = excluded.season_id, division_id = excluded.division_id,
                    division_name = excluded.division_name, region_id = excluded.region_id,
                    match_date = excluded.match_date, match_name = excluded.match_name,
                    is_forfeit = excluded.is_forfeit, winner = excluded.winner,
                    team_id_a = excluded.team_id_a, points_a = excluded.points_a,
                    team_id_b = excluded.team_id_b, points_b = excluded.points_b,
                    deleted = 0, updated_on = excluded.updated_on",
            )
            .bind(m.match_id)
            .bind(m.season_id)
            .bind(m.division_id)
            .bind(&m.division_name)
            .bind(m.region_id)
            .bind(m.match_date)
            .bind(&m.match_name)
            .bind(m.is_forfeit)
            .bind(m.winner)
            .bind(m.team_id_a)
            .bind(m.points_a)
            .bind(m.team_id_b)
            .bind(m.points_b)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn rgl_season_get(&self, season_id: i64) -> Result<Option<RglSeason>> {
        let row = sqlx::query(
            "SELECT season_id, name, maps, format_name, region_name, participating_teams, matches
             FROM rgl_season WHERE season_id = ? AND deleted = 0",
        )
        .bind(season_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let maps: String = row.try_get("maps")?;
        let teams: String = row.try_get("participating_teams")?;
        let matches: String = row.try_get("matches")?;
        Ok(Some(RglSeason {
            season_id: row.try_get("season_id")?,
            name: row.try_get("name")?,
            maps: json_list(&maps),
            format_name: row.try_get("format_name")?,
            region_name: row.try_get("region_name")?,
            participating_teams: json_list(&teams),
            matches: json_list(&matches),
        }))
    }

    /// Teams of a season with their members.
    pub async fn rgl_teams(&self, season_id: i64) -> Result<Vec<RglTeam>> {
        let rows = sqlx::query(
            "SELECT team_id, season_id, division_id, division_name, team_leader, tag, name,
                    final_rank, created_at, updated_at
             FROM rgl_team WHERE season_id = ? AND deleted = 0 ORDER BY team_id",
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        let mut teams = rows.iter().map(team_from_row).collect::<Result<Vec<_>>>()?;

        for team in &mut teams {
            let team_id = team.team_id;
            let members = sqlx::query(
                "SELECT steam_id, name, is_leader, joined_at, left_at
                 FROM rgl_team_member WHERE team_id = ? ORDER BY steam_id",
            )
            .bind(team_id)
            .fetch_all(&self.pool)
            .await?;
            team.members = members
                .iter()
                .map(|r| {
                    Ok(RglTeamMember {
                        team_id,
                        steam_id: SteamId::from_i64(r.try_get("steam_id")?)?,
                        name: r.try_get("name")?,
                        is_leader: r.try_get("is_leader")?,
                        joined_at: r.try_get("joined_at")?,
                        left_at: r.try_get("left_at")?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(teams)
    }

    pub async fn rgl_matches(&self, season_id: i64) -> Result<Vec<RglMatch>> {
        let rows = sqlx::query(
            "SELECT match_id, season_id, division_id, division_name, region_id, match_date, match_name,
                    is_forfeit, winner, team_id_a, points_a, team_id_b, points_b
             FROM rgl_match WHERE season_id = ? AND deleted = 0 ORDER BY match_id",
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(match_from_row).collect()
    }
}
