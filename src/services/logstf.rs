//! logs.tf match page scraper.
//!
//! Match pages are rendered HTML, so every table is read by header name
//! rather than by column position where the page provides headers.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{
    LogsTfClassWeapon, LogsTfMatch, LogsTfMedicStat, LogsTfPlayerClass, LogsTfPlayerStat,
    LogsTfRound, SteamId, Team,
};
use crate::utils::http::{FetchOptions, Fetcher};
use crate::utils::limiter::RateLimiter;
use crate::utils::{clean_text, selector};

const SITE_BASE: &str = "https://logs.tf";

static RESULT_COUNT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*) results").ok());
static CLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+):(\d{2})(?::(\d{2}))?").ok());

/// Number of logs on a player's profile page. `No logs found.` reads as zero.
pub fn parse_log_count(body: &str) -> Result<i64> {
    let re = RESULT_COUNT
        .as_ref()
        .ok_or_else(|| AppError::parse("log count", "invalid pattern"))?;
    if let Some(caps) = re.captures(body) {
        let digits: String = caps[1].chars().filter(|c| c.is_ascii_digit()).collect();
        return digits
            .parse()
            .map_err(|e| AppError::parse("log count", e));
    }
    if body.contains("No logs found") {
        return Ok(0);
    }
    Err(AppError::parse("log count", "no result count on page"))
}

/// `29:57` or `1:02:03` in seconds.
fn parse_clock(text: &str) -> Option<i64> {
    let re = CLOCK.as_ref()?;
    let caps = re.captures(text)?;
    let a: i64 = caps[1].parse().ok()?;
    let b: i64 = caps[2].parse().ok()?;
    Some(match caps.get(3) {
        Some(c) => a * 3600 + b * 60 + c.as_str().parse::<i64>().ok()?,
        None => a * 60 + b,
    })
}

fn text_of(el: &ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn num<T: std::str::FromStr + Default>(text: &str) -> T {
    text.trim()
        .trim_end_matches('%')
        .replace(',', "")
        .parse()
        .unwrap_or_default()
}

fn first_text(doc: &Html, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(doc.select(&sel).next().map(|e| text_of(&e)))
}

/// Header text (lowercased) to column index.
fn header_index(table: &ElementRef<'_>) -> Result<HashMap<String, usize>> {
    let th = selector("thead th")?;
    Ok(table
        .select(&th)
        .enumerate()
        .map(|(i, h)| (text_of(&h).to_lowercase(), i))
        .collect())
}

struct Row<'a> {
    cells: Vec<ElementRef<'a>>,
    headers: &'a HashMap<String, usize>,
}

impl<'a> Row<'a> {
    fn cell(&self, name: &str) -> Option<&ElementRef<'a>> {
        self.headers.get(name).and_then(|&i| self.cells.get(i))
    }

    fn text(&self, name: &str) -> String {
        self.cell(name).map(text_of).unwrap_or_default()
    }

    fn num<T: std::str::FromStr + Default>(&self, name: &str) -> T {
        num(&self.text(name))
    }
}

/// Direct `td` children only; class cells nest their own tables.
fn child_cells<'a>(tr: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "td")
        .collect()
}

fn steam_id_from_attr(el: &ElementRef<'_>, attr: &str) -> Option<SteamId> {
    let raw = el.value().attr(attr)?;
    raw.rsplit(['_', '/']).next()?.parse().ok()
}

fn parse_players(doc: &Html) -> Result<Vec<LogsTfPlayerStat>> {
    let table_sel = selector("table#players")?;
    let row_sel = selector("table#players > tbody > tr")?;
    let Some(table) = doc.select(&table_sel).next() else {
        return Ok(Vec::new());
    };
    let headers = header_index(&table)?;

    let mut players = Vec::new();
    for tr in doc.select(&row_sel) {
        let Some(steam_id) = steam_id_from_attr(&tr, "id") else {
            log::warn!("Skipping logs.tf player row without id");
            continue;
        };
        let row = Row {
            cells: child_cells(&tr),
            headers: &headers,
        };
        let Some(team) = Team::parse(&row.text("team")) else {
            continue;
        };
        let classes = match row.cell("c") {
            Some(cell) => parse_classes(cell)?,
            None => Vec::new(),
        };
        players.push(LogsTfPlayerStat {
            steam_id,
            team,
            name: row.text("name"),
            kills: row.num("k"),
            assists: row.num("a"),
            deaths: row.num("d"),
            damage: row.num("da"),
            dpm: row.num("da/m"),
            damage_taken: row.num("dt"),
            healing_taken: row.num("hr"),
            headshots: row.num("hs"),
            airshots: row.num("as"),
            caps: row.num("cap"),
            classes,
        });
    }
    Ok(players)
}

/// Class tooltip tables embedded in the classes cell.
fn parse_classes(cell: &ElementRef<'_>) -> Result<Vec<LogsTfPlayerClass>> {
    let block_sel = selector("div.class-stats")?;
    let stat_sel = selector("table.class-table tbody tr td")?;
    let weapon_row_sel = selector("table.weapon-table tbody tr")?;
    let td = selector("td")?;

    let mut classes = Vec::new();
    for block in cell.select(&block_sel) {
        let Some(player_class) = block.value().attr("data-class") else {
            continue;
        };
        let stats: Vec<String> = block.select(&stat_sel).map(|c| text_of(&c)).collect();
        let stat = |i: usize| stats.get(i).map(String::as_str).unwrap_or("");

        let weapons = block
            .select(&weapon_row_sel)
            .filter_map(|tr| {
                let cells: Vec<String> = tr.select(&td).map(|c| text_of(&c)).collect();
                let weapon = cells.first()?.clone();
                Some(LogsTfClassWeapon {
                    weapon,
                    kills: num(cells.get(1).map(String::as_str).unwrap_or("")),
                    damage: num(cells.get(2).map(String::as_str).unwrap_or("")),
                    accuracy: num(cells.get(3).map(String::as_str).unwrap_or("")),
                })
            })
            .collect();

        classes.push(LogsTfPlayerClass {
            player_class: player_class.to_lowercase(),
            played: parse_clock(stat(0)).unwrap_or_default(),
            kills: num(stat(1)),
            assists: num(stat(2)),
            deaths: num(stat(3)),
            damage: num(stat(4)),
            weapons,
        });
    }
    Ok(classes)
}

fn parse_score(text: &str) -> (i32, i32) {
    let mut parts = text.split('-').map(|p| num::<i32>(p));
    (
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
    )
}

fn parse_rounds(doc: &Html) -> Result<Vec<LogsTfRound>> {
    let row_sel = selector("table#log-rounds tbody tr")?;
    let td = selector("td")?;
    let mut rounds = Vec::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<String> = tr.select(&td).map(|c| text_of(&c)).collect();
        if cells.len() < 10 {
            continue;
        }
        let (score_red, score_blu) = parse_score(&cells[2]);
        rounds.push(LogsTfRound {
            round: num(&cells[0]),
            length: parse_clock(&cells[1]).unwrap_or_default(),
            score_red,
            score_blu,
            kills_red: num(&cells[3]),
            kills_blu: num(&cells[4]),
            ubers_red: num(&cells[5]),
            ubers_blu: num(&cells[6]),
            damage_red: num(&cells[7]),
            damage_blu: num(&cells[8]),
            midfight: Team::parse(&cells[9]),
        });
    }
    Ok(rounds)
}

fn parse_medics(doc: &Html) -> Result<Vec<LogsTfMedicStat>> {
    let block_sel = selector("div.medic-stats")?;
    let row_sel = selector("tr")?;
    let td = selector("td")?;
    let mut medics = Vec::new();
    for block in doc.select(&block_sel) {
        let Some(steam_id) = steam_id_from_attr(&block, "data-steamid") else {
            continue;
        };
        let mut values = HashMap::new();
        for tr in block.select(&row_sel) {
            let cells: Vec<String> = tr.select(&td).map(|c| text_of(&c)).collect();
            if let (Some(k), Some(v)) = (cells.first(), cells.last()) {
                values.insert(k.to_lowercase(), v.clone());
            }
        }
        let get = |k: &str| values.get(k).map(String::as_str).unwrap_or("");
        medics.push(LogsTfMedicStat {
            steam_id,
            healing: num(get("healing")),
            charges: num(get("charges")),
            drops: num(get("drops")),
            avg_time_to_build: num(get("avg time to build")),
            avg_uber_length: num(get("avg uber length")),
            near_full_charge_death: num(get("near full charge deaths")),
            deaths_after_charge: num(get("deaths after uber")),
        });
    }
    Ok(medics)
}

/// Parse a full match page. Pages without a log title are reported as
/// not found.
pub fn parse_match(log_id: i64, body: &str) -> Result<LogsTfMatch> {
    let doc = Html::parse_document(body);

    let Some(title) = first_text(&doc, "#log-name")? else {
        return Err(AppError::NotFound(format!("log {log_id}")));
    };
    let map = first_text(&doc, "#log-map")?.unwrap_or_default();
    let duration = first_text(&doc, "#log-length")?
        .and_then(|t| parse_clock(&t))
        .unwrap_or_default();
    let score_red = first_text(&doc, "#log-score .red .score")?
        .map(|t| num(&t))
        .unwrap_or_default();
    let score_blu = first_text(&doc, "#log-score .blu .score")?
        .map(|t| num(&t))
        .unwrap_or_default();

    let date_sel = selector(".datefield[data-timestamp]")?;
    let created_on = doc
        .select(&date_sel)
        .next()
        .and_then(|e| e.value().attr("data-timestamp"))
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .ok_or_else(|| AppError::parse(format!("log {log_id}"), "missing date"))?;

    Ok(LogsTfMatch {
        log_id,
        title,
        map,
        duration,
        score_red,
        score_blu,
        created_on,
        rounds: parse_rounds(&doc)?,
        players: parse_players(&doc)?,
        medics: parse_medics(&doc)?,
    })
}

/// Client for match pages.
#[derive(Debug, Clone)]
pub struct LogsTfClient {
    fetcher: Arc<Fetcher>,
    limiter: Arc<RateLimiter>,
    base_url: String,
}

impl LogsTfClient {
    pub fn new(fetcher: Arc<Fetcher>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            fetcher,
            limiter,
            base_url: SITE_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn log(&self, log_id: i64, cancel: &CancellationToken) -> Result<LogsTfMatch> {
        self.limiter.acquire(cancel).await?;
        let url = format!("{}/{}", self.base_url, log_id);
        let body = self
            .fetcher
            .fetch_text(&url, &FetchOptions::scraper(), cancel)
            .await?;
        parse_match(log_id, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH_PAGE: &str = r#"
    <html><body>
      <h3 id="log-name">RGL Invite: A vs B</h3>
      <h3 id="log-map">cp_process_f12</h3>
      <span id="log-length">Length: 29:57</span>
      <span class="datefield" data-timestamp="1684292820">17 May</span>
      <div id="log-score">
        <div class="red"><span class="score">3</span></div>
        <div class="blu"><span class="score">5</span></div>
      </div>
      <table id="players">
        <thead><tr><th>Team</th><th>Name</th><th>C</th><th>K</th><th>A</th><th>D</th>
          <th>DA</th><th>DA/M</th><th>DT</th><th>HR</th><th>HS</th><th>AS</th><th>CAP</th></tr></thead>
        <tbody>
          <tr id="player_76561197960265729">
            <td class="red">Red</td><td>alpha</td>
            <td>
              <div class="class-stats" data-class="Scout">
                <table class="class-table"><tbody><tr><td>29:57</td><td>20</td><td>5</td><td>9</td><td>6,500</td></tr></tbody></table>
                <table class="weapon-table"><tbody><tr><td>scattergun</td><td>18</td><td>6000</td><td>45%</td></tr></tbody></table>
              </div>
            </td>
            <td>20</td><td>5</td><td>9</td><td>6,500</td><td>217</td><td>5000</td><td>900</td><td>0</td><td>0</td><td>2</td>
          </tr>
          <tr id="player_76561197960265730">
            <td class="blu">Blu</td><td>bravo</td><td></td>
            <td>10</td><td>12</td><td>4</td><td>3000</td><td>100</td><td>4000</td><td>0</td><td>1</td><td>3</td><td>0</td>
          </tr>
        </tbody>
      </table>
      <table id="log-rounds"><tbody>
        <tr><td>1</td><td>4:10</td><td>1 - 0</td><td>12</td><td>8</td><td>2</td><td>1</td><td>4000</td><td>3000</td><td>Red</td></tr>
        <tr><td>2</td><td>3:01</td><td>1 - 1</td><td>9</td><td>11</td><td>1</td><td>2</td><td>3500</td><td>3700</td><td></td></tr>
      </tbody></table>
      <div class="medic-stats" data-steamid="76561197960265730"><table>
        <tr><td>Healing</td><td>12,000</td></tr>
        <tr><td>Charges</td><td>9</td></tr>
        <tr><td>Drops</td><td>1</td></tr>
        <tr><td>Avg time to build</td><td>41.5</td></tr>
        <tr><td>Avg uber length</td><td>7.2</td></tr>
      </table></div>
    </body></html>"#;

    #[test]
    fn log_count_from_profile() {
        assert_eq!(parse_log_count("<p>1,234 results</p>").unwrap(), 1234);
        assert_eq!(parse_log_count("<p>No logs found.</p>").unwrap(), 0);
        assert!(parse_log_count("<p>maintenance</p>").is_err());
    }

    #[test]
    fn patterns_compile_once() {
        assert!(RESULT_COUNT.is_some());
        assert!(CLOCK.is_some());
        // Repeated calls reuse the same compiled pattern.
        for _ in 0..3 {
            assert_eq!(parse_log_count("12 results").unwrap(), 12);
        }
    }

    #[test]
    fn clock_values() {
        assert_eq!(parse_clock("Length: 29:57"), Some(29 * 60 + 57));
        assert_eq!(parse_clock("1:02:03"), Some(3723));
        assert_eq!(parse_clock("n/a"), None);
    }

    #[test]
    fn match_page() {
        let m = parse_match(3_400_000, MATCH_PAGE).unwrap();
        assert_eq!(m.title, "RGL Invite: A vs B");
        assert_eq!(m.map, "cp_process_f12");
        assert_eq!(m.duration, 29 * 60 + 57);
        assert_eq!((m.score_red, m.score_blu), (3, 5));
        assert_eq!(m.created_on.timestamp(), 1684292820);

        assert_eq!(m.players.len(), 2);
        let alpha = &m.players[0];
        assert_eq!(alpha.team, Team::Red);
        assert_eq!(alpha.damage, 6500);
        assert_eq!(alpha.caps, 2);
        assert_eq!(alpha.classes[0].player_class, "scout");
        assert_eq!(alpha.classes[0].weapons[0].accuracy, 45.0);
        assert!(m.players[1].classes.is_empty());

        assert_eq!(m.rounds.len(), 2);
        assert_eq!(m.rounds[0].midfight, Some(Team::Red));
        assert_eq!(m.rounds[1].midfight, None);
        assert_eq!((m.rounds[1].score_red, m.rounds[1].score_blu), (1, 1));

        assert_eq!(m.medics.len(), 1);
        assert_eq!(m.medics[0].healing, 12000);
        assert_eq!(m.medics[0].deaths_after_charge, 0);
    }

    #[test]
    fn missing_log_is_not_found() {
        let err = parse_match(1, "<html><body><h1>Log not found</h1></body></html>").unwrap_err();
        assert!(err.is_not_found());
    }
}
