//! serveme.tf booking ban list.
//!
//! The list is a plain three column CSV: `steam_id,name,reason`. A header
//! row, if present, is skipped because its first cell is not an id.

use std::collections::HashSet;
use std::mem::take;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{ServemeRecord, SteamId};
use crate::utils::http::check_status;
use crate::utils::limiter::RateLimiter;

const BANS_URL: &str = "https://raw.githubusercontent.com/Arie/serveme/master/doc/banned_steam_ids.csv";

/// Split CSV text into rows of fields. Quotes and CRLF line endings are
/// tolerated; blank lines are dropped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if matches!(chars.peek(), Some('"')) {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].trim().is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    row.push(field);
    if !(row.len() == 1 && row[0].trim().is_empty()) {
        rows.push(row);
    }
    rows
}

/// Turn CSV text into records, warning about and skipping rows whose id
/// does not parse. The first row for an id wins.
pub fn parse_records(text: &str, now: DateTime<Utc>) -> Vec<ServemeRecord> {
    let mut records: Vec<ServemeRecord> = Vec::new();
    let mut seen: HashSet<SteamId> = HashSet::new();
    for (line, row) in parse_rows(text).into_iter().enumerate() {
        let mut cells = row.into_iter().map(|c| c.trim().to_string());
        let raw_id = cells.next().unwrap_or_default();
        let steam_id: SteamId = match raw_id.parse() {
            Ok(id) => id,
            Err(_) if line == 0 && raw_id.eq_ignore_ascii_case("steam_id") => continue,
            Err(e) => {
                log::warn!("Skipping serveme row {}: {}", line + 1, e);
                continue;
            }
        };
        if !seen.insert(steam_id) {
            continue;
        }
        records.push(ServemeRecord {
            steam_id,
            name: cells.next().unwrap_or_default(),
            reason: cells.next().unwrap_or_default(),
            deleted: false,
            created_on: now,
            updated_on: now,
        });
    }
    records
}

#[derive(Debug, Clone)]
pub struct ServemeClient {
    http: reqwest::Client,
    url: String,
    limiter: Arc<RateLimiter>,
}

impl ServemeClient {
    pub fn new(http: reqwest::Client, limiter: Arc<RateLimiter>) -> Self {
        Self {
            http,
            url: BANS_URL.to_string(),
            limiter,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub async fn bans(&self, cancel: &CancellationToken) -> Result<Vec<ServemeRecord>> {
        self.limiter.acquire(cancel).await?;
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = self.http.get(&self.url).send() => response?,
        };
        check_status(&self.url, response.status())?;
        let text = response.text().await?;
        let records = parse_records(&text, Utc::now());
        log::debug!("Fetched {} serveme bans", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_and_crlf() {
        let rows = parse_rows("a,\"b, with comma\",\"say \"\"hi\"\"\"\r\n\r\nc,d,e\n");
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b, with comma".into(), "say \"hi\"".into()],
                vec!["c".to_string(), "d".into(), "e".into()],
            ]
        );
    }

    #[test]
    fn records_skip_invalid_ids() {
        let text = "steam_id,name,reason\n\
                    76561197960265729,cheater,\"Cheating, repeatedly\"\n\
                    garbage,nobody,whatever\n\
                    [U:1:2],second,Griefing";
        let records = parse_records(text, Utc::now());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reason, "Cheating, repeatedly");
        assert_eq!(records[1].steam_id.account_id(), 2);
        assert!(!records[1].deleted);
    }

    #[test]
    fn repeated_ids_keep_first_row() {
        let mut text = String::new();
        for n in 0..500 {
            text.push_str(&format!("[U:1:{}],name{n},reason{n}\n", n % 50 + 1));
        }
        let records = parse_records(&text, Utc::now());
        assert_eq!(records.len(), 50);
        assert_eq!(records[0].name, "name0");
        assert_eq!(records[49].steam_id.account_id(), 50);
        assert_eq!(records[49].reason, "reason49");
    }

    #[test]
    fn short_rows_default_missing_cells() {
        let records = parse_records("76561197960265729", Utc::now());
        assert_eq!(records.len(), 1);
        assert!(records[0].name.is_empty());
    }
}
