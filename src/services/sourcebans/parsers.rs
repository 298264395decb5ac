//! Row and pagination parsers for the SourceBans page templates.
//!
//! All four row parsers walk header/value pairs and feed them to a
//! [`BanAccumulator`], so every template yields the same [`RawBan`] shape.

use scraper::{ElementRef, Html};
use url::Url;

use crate::error::Result;
use crate::models::SteamId;
use crate::utils::url::{page_number, resolve_url, with_query_param};
use crate::utils::{clean_text, selector};

/// Extracts raw ban rows from a listing page.
pub type RowParser = fn(&Html) -> Result<Vec<RawBan>>;

/// Finds the next listing page, if any.
pub type NextUrl = fn(&Html, &Url) -> Option<Url>;

/// Decides whether a parsed row is kept.
pub type RowFilter = fn(&RawBan) -> bool;

/// One ban row with its cells still in site format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBan {
    pub name: String,
    pub steam_id: Option<SteamId>,
    /// The id cell as printed, kept for diagnostics
    pub raw_id: String,
    pub invoked_on: String,
    pub ban_length: String,
    pub expires_on: String,
    pub reason: String,
}

impl RawBan {
    fn is_blank(&self) -> bool {
        self.name.is_empty() && self.raw_id.is_empty() && self.invoked_on.is_empty()
    }
}

/// Collects header/value pairs into bans. A ban is complete once its
/// reason cell is seen.
#[derive(Debug, Default)]
pub struct BanAccumulator {
    current: RawBan,
    bans: Vec<RawBan>,
}

impl BanAccumulator {
    pub fn push(&mut self, key: &str, value: &str) {
        let key = clean_text(key).trim_end_matches(':').to_lowercase();
        let value = clean_text(value);
        match key.as_str() {
            "player" | "name" | "nickname" => self.current.name = value,
            "steam id" | "steamid" | "steam2" | "steam3 id" | "steam3" | "steam community"
            | "community link" => {
                if self.current.steam_id.is_none() {
                    self.current.steam_id = parse_id_cell(&value);
                }
                if self.current.raw_id.is_empty() {
                    self.current.raw_id = value;
                }
            }
            "invoked on" | "banned on" | "date" => self.current.invoked_on = value,
            "banlength" | "ban length" | "length" => self.current.ban_length = value,
            "expires on" | "expires" | "expiration" => self.current.expires_on = value,
            "reason" | "ban reason" => {
                self.current.reason = value;
                self.flush();
            }
            _ => {}
        }
    }

    fn flush(&mut self) {
        let ban = std::mem::take(&mut self.current);
        if !ban.is_blank() {
            self.bans.push(ban);
        }
    }

    pub fn finish(mut self) -> Vec<RawBan> {
        self.flush();
        self.bans
    }
}

/// Read an id from a cell holding steam2, steam3, steam64 or a profile link.
fn parse_id_cell(value: &str) -> Option<SteamId> {
    if let Ok(id) = value.parse() {
        return Some(id);
    }
    if let Some(token) = value.split_whitespace().next() {
        if let Ok(id) = token.parse() {
            return Some(id);
        }
    }
    value
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|last| last.parse().ok())
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// First cell is the header, last cell the value.
fn push_table_rows(acc: &mut BanAccumulator, doc: &Html, rows_css: &str) -> Result<()> {
    let rows = selector(rows_css)?;
    let cells = selector("td")?;
    for row in doc.select(&rows) {
        let tds: Vec<ElementRef<'_>> = row.select(&cells).collect();
        if let (Some(key), Some(value)) = (tds.first(), tds.last()) {
            if tds.len() >= 2 {
                acc.push(&text_of(key), &text_of(value));
            }
        }
    }
    Ok(())
}

/// Stock SourceBans template: one `div.opener` detail table per ban.
pub fn parse_default(doc: &Html) -> Result<Vec<RawBan>> {
    let mut acc = BanAccumulator::default();
    push_table_rows(&mut acc, doc, "div.opener table tr")?;
    Ok(acc.finish())
}

/// Fluent theme: `li` items with a label span and a value span.
pub fn parse_fluent(doc: &Html) -> Result<Vec<RawBan>> {
    let items = selector("ul.ban_list_detal li")?;
    let spans = selector("span")?;
    let mut acc = BanAccumulator::default();
    for item in doc.select(&items) {
        let mut parts = item.select(&spans);
        if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            acc.push(&text_of(&key), &text_of(&value));
        }
    }
    Ok(acc.finish())
}

/// Star theme: definition lists.
pub fn parse_star(doc: &Html) -> Result<Vec<RawBan>> {
    let lists = selector("div.ban-details dl, dl.ban-info")?;
    let terms = selector("dt")?;
    let defs = selector("dd")?;
    let mut acc = BanAccumulator::default();
    for list in doc.select(&lists) {
        for (dt, dd) in list.select(&terms).zip(list.select(&defs)) {
            acc.push(&text_of(&dt), &text_of(&dd));
        }
    }
    Ok(acc.finish())
}

/// Material theme: `mdl-data-table` key/value rows.
pub fn parse_material(doc: &Html) -> Result<Vec<RawBan>> {
    let mut acc = BanAccumulator::default();
    push_table_rows(&mut acc, doc, "table.mdl-data-table tr")?;
    Ok(acc.finish())
}

fn nav_links(doc: &Html, current: &Url, css: &str) -> Vec<Url> {
    let Ok(links) = selector(css) else {
        return Vec::new();
    };
    doc.select(&links)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| Url::parse(&resolve_url(current, href)).ok())
        .collect()
}

fn advances(current: &Url, candidate: &Url) -> bool {
    page_number(candidate) > page_number(current)
}

/// First `#banlist-nav` link that moves forward.
pub fn next_nav_first(doc: &Html, current: &Url) -> Option<Url> {
    nav_links(doc, current, "#banlist-nav a[href]")
        .into_iter()
        .find(|u| advances(current, u))
}

/// Last `#banlist-nav` link, for navs that print only prev/next.
pub fn next_nav_last(doc: &Html, current: &Url) -> Option<Url> {
    nav_links(doc, current, "#banlist-nav a[href]")
        .pop()
        .filter(|u| advances(current, u))
}

/// Fluent pagination: `rel=next` or the item after the active one.
pub fn next_fluent(doc: &Html, current: &Url) -> Option<Url> {
    nav_links(
        doc,
        current,
        ".pagination a[rel=\"next\"], .pagination li.active + li a[href]",
    )
    .into_iter()
    .find(|u| advances(current, u))
}

/// Synthesized `?page=N+1` for mirrors that strip pagination links.
pub fn next_page_param(_doc: &Html, current: &Url) -> Option<Url> {
    let next = page_number(current).checked_add(1)?;
    Some(with_query_param(current, "page", &next.to_string()))
}

/// Drops bans that were lifted by an admin.
pub fn skip_lifted(ban: &RawBan) -> bool {
    let length = ban.ban_length.to_lowercase();
    !(length.contains("(unbanned)") || length.contains("(removed)"))
}

/// Drops rows without a stated reason.
pub fn require_reason(ban: &RawBan) -> bool {
    !ban.reason.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_PAGE: &str = r#"
        <html><body>
        <div id="banlist-nav"><a href="index.php?p=banlist&page=2">next &raquo;</a>
            <a href="index.php?p=banlist&page=9">last</a></div>
        <div class="opener"><table>
            <tr><td>Player</td><td>bad guy</td></tr>
            <tr><td>Steam ID</td><td>STEAM_0:1:23</td></tr>
            <tr><td>Steam3 ID</td><td>[U:1:47]</td></tr>
            <tr><td>Invoked on</td><td>2023-05-17 03:07:00</td></tr>
            <tr><td>Banlength</td><td>Permanent</td></tr>
            <tr><td>Expires on</td><td>Not applicable.</td></tr>
            <tr><td>Reason</td><td>Cheating</td></tr>
        </table></div>
        <div class="opener"><table>
            <tr><td>Player</td><td>spammer</td></tr>
            <tr><td>Steam Community</td><td><a href="https://steamcommunity.com/profiles/76561197960265730">76561197960265730</a></td></tr>
            <tr><td>Invoked on</td><td>2023-05-01 10:00:00</td></tr>
            <tr><td>Banlength</td><td>1 wk (Unbanned)</td></tr>
            <tr><td>Expires on</td><td>2023-05-08 10:00:00</td></tr>
            <tr><td>Reason</td><td>Mic spam</td></tr>
        </table></div>
        </body></html>"#;

    #[test]
    fn default_template_rows() {
        let doc = Html::parse_document(DEFAULT_PAGE);
        let bans = parse_default(&doc).unwrap();
        assert_eq!(bans.len(), 2);
        assert_eq!(bans[0].name, "bad guy");
        assert_eq!(bans[0].steam_id.unwrap().steam3(), "[U:1:47]");
        assert_eq!(bans[0].ban_length, "Permanent");
        assert_eq!(bans[0].reason, "Cheating");
        assert_eq!(bans[1].steam_id.unwrap().as_u64(), 76561197960265730);
        assert!(!skip_lifted(&bans[1]));
        assert!(skip_lifted(&bans[0]));
    }

    #[test]
    fn fluent_template_rows() {
        let doc = Html::parse_document(
            r#"<ul class="ban_list_detal">
                <li><span>Player</span><span>fluent one</span></li>
                <li><span>Steam ID</span><span>STEAM_0:0:5</span></li>
                <li><span>Invoked on</span><span>2023-01-02 03:04:05</span></li>
                <li><span>Reason</span><span>Aimbot</span></li>
            </ul>"#,
        );
        let bans = parse_fluent(&doc).unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].steam_id.unwrap().account_id(), 10);
        assert_eq!(bans[0].invoked_on, "2023-01-02 03:04:05");
    }

    #[test]
    fn star_template_rows() {
        let doc = Html::parse_document(
            r#"<div class="ban-details"><dl>
                <dt>Player</dt><dd>star one</dd>
                <dt>Steam3 ID</dt><dd>[U:1:100]</dd>
                <dt>Invoked on</dt><dd>2023-01-02 03:04:05</dd>
                <dt>Reason</dt><dd>Exploit</dd>
            </dl></div>"#,
        );
        let bans = parse_star(&doc).unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].name, "star one");
        assert_eq!(bans[0].reason, "Exploit");
    }

    #[test]
    fn material_template_rows() {
        let doc = Html::parse_document(
            r#"<table class="mdl-data-table">
                <tr><td>Player</td><td>mat</td></tr>
                <tr><td>Steam ID</td><td>garbage</td></tr>
                <tr><td>Invoked on</td><td>2023-01-02 03:04:05</td></tr>
                <tr><td>Reason</td><td>Toxic</td></tr>
            </table>"#,
        );
        let bans = parse_material(&doc).unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].steam_id, None);
        assert_eq!(bans[0].raw_id, "garbage");
    }

    #[test]
    fn pagination_strategies() {
        let doc = Html::parse_document(DEFAULT_PAGE);
        let page1 = Url::parse("https://bans.example.com/index.php?p=banlist").unwrap();

        let next = next_nav_first(&doc, &page1).unwrap();
        assert_eq!(page_number(&next), 2);

        let last = next_nav_last(&doc, &page1).unwrap();
        assert_eq!(page_number(&last), 9);

        let page2 = Url::parse("https://bans.example.com/index.php?p=banlist&page=2").unwrap();
        assert_eq!(next_nav_first(&doc, &page2).map(|u| page_number(&u)), Some(9));

        let synth = next_page_param(&doc, &page2).unwrap();
        assert_eq!(page_number(&synth), 3);

        let empty = Html::parse_document("<html></html>");
        assert!(next_fluent(&empty, &page1).is_none());
    }

    #[test]
    fn fluent_pagination() {
        let doc = Html::parse_document(
            r#"<ul class="pagination">
                <li class="active"><a href="?p=banlist&page=1">1</a></li>
                <li><a href="?p=banlist&page=2">2</a></li>
            </ul>"#,
        );
        let page1 = Url::parse("https://x.org/index.php?p=banlist").unwrap();
        assert_eq!(next_fluent(&doc, &page1).map(|u| page_number(&u)), Some(2));
    }
}
