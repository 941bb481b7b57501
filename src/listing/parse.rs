use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};

use super::record::ExportRecord;
use crate::error::{Error, Result};

/// Header label of the column carrying the download link.
pub const STATUS_HEADER: &str = "Status";

/// Stands in for `&` while the DOM is built so character references reach
/// the cell text untouched.
const AMP_GUARD: char = '\u{E000}';

static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<table.*?>[\s\S]*?</table>").unwrap());
static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<tr.*?>([\s\S]*?)</tr>").unwrap());
static TH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<th.*?>([\s\S]*?)</th>").unwrap());
static TD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<td.*?>([\s\S]*?)</td>").unwrap());
static HREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<a.*?href="(.*?)""#).unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").unwrap());

static TABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static TR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static TH_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("th").unwrap());
static TD_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static A_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Turns listing-page markup into records.
///
/// Implementations must agree on the rules: only the first table counts,
/// blank-header columns are dropped, the `Status` column yields the first
/// anchor's `href` with character references decoded, and every other cell
/// is its markup with tags stripped and entities left as the page sent them.
pub trait TableParser: Send + Sync {
    fn parse(&self, html: &str) -> Result<Vec<ExportRecord>>;

    fn name(&self) -> &'static str;
}

/// Remove every `<…>` tag. Text is otherwise left alone.
pub fn strip_tags(s: &str) -> String {
    TAG_RE.replace_all(s, "").into_owned()
}

/// Decode character references in an `href` value the way a browser
/// reads the attribute, so `&amp;` in the markup becomes `&` in the URL.
pub fn decode_href(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let fragment = Html::parse_fragment(&format!(r#"<a href="{}"></a>"#, raw));
    fragment
        .select(&A_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map_or_else(|| raw.to_string(), str::to_string)
}

/// Pattern-matching parser; cheap and tolerant of broken markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexTableParser;

impl TableParser for RegexTableParser {
    fn parse(&self, html: &str) -> Result<Vec<ExportRecord>> {
        let table = TABLE_RE
            .find(html)
            .ok_or_else(|| Error::Parse("no <table> in listing page".into()))?
            .as_str();

        let mut rows = ROW_RE.captures_iter(table).map(|c| c[1].to_string());
        let header_row = rows
            .next()
            .ok_or_else(|| Error::Parse("listing table has no rows".into()))?;
        let headers: Vec<String> = TH_RE
            .captures_iter(&header_row)
            .map(|c| c[1].to_string())
            .collect();
        if headers.is_empty() {
            return Err(Error::Parse("listing header row has no <th> cells".into()));
        }
        trace!(?headers, "listing headers");

        let body: Vec<Vec<String>> = rows
            .map(|row| {
                TD_RE
                    .captures_iter(&row)
                    .map(|c| c[1].to_string())
                    .collect()
            })
            .collect();

        assemble(
            &headers,
            body,
            |cell| HREF_RE.captures(cell).map(|c| decode_href(&c[1])),
            |cell| strip_tags(cell),
        )
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// DOM-based parser built on `scraper`.
///
/// `&` is swapped for a private-use character before parsing and restored
/// afterwards, so cell text keeps its entities exactly as the regex parser
/// sees them.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTableParser;

impl TableParser for HtmlTableParser {
    fn parse(&self, html: &str) -> Result<Vec<ExportRecord>> {
        let guarded = html.replace('&', &AMP_GUARD.to_string());
        let document = Html::parse_document(&guarded);

        let table = document
            .select(&TABLE_SEL)
            .next()
            .ok_or_else(|| Error::Parse("no <table> in listing page".into()))?;

        let mut rows = table.select(&TR_SEL);
        let header_row = rows
            .next()
            .ok_or_else(|| Error::Parse("listing table has no rows".into()))?;
        let headers: Vec<String> = header_row
            .select(&TH_SEL)
            .map(|th| unguard(&th.inner_html()))
            .collect();
        if headers.is_empty() {
            return Err(Error::Parse("listing header row has no <th> cells".into()));
        }
        trace!(?headers, "listing headers");

        let body: Vec<Vec<ElementRef>> = rows.map(|row| row.select(&TD_SEL).collect()).collect();

        assemble(&headers, body, first_href, |cell| {
            unguard(&cell.text().collect::<String>())
        })
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

fn unguard(s: &str) -> String {
    s.replace(AMP_GUARD, "&")
}

fn first_href(cell: &ElementRef) -> Option<String> {
    cell.select(&A_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| decode_href(&unguard(href)))
}

/// Pair cells with headers and apply the column rules.
fn assemble<C, L, T>(
    headers: &[String],
    rows: Vec<Vec<C>>,
    status_link: L,
    text: T,
) -> Result<Vec<ExportRecord>>
where
    L: Fn(&C) -> Option<String>,
    T: Fn(&C) -> String,
{
    let mut records = Vec::with_capacity(rows.len());

    for (idx, cells) in rows.into_iter().enumerate() {
        if cells.len() != headers.len() {
            return Err(Error::Parse(format!(
                "row {} has {} cells but the header has {}",
                idx + 1,
                cells.len(),
                headers.len()
            )));
        }

        let mut fields = IndexMap::with_capacity(headers.len());
        let mut status_url = None;
        for (header, cell) in headers.iter().zip(cells.iter()) {
            if header.trim().is_empty() {
                continue;
            }
            if header == STATUS_HEADER {
                status_url = status_link(cell);
            } else {
                fields.insert(header.clone(), text(cell));
            }
        }
        records.push(ExportRecord::new(fields, status_url));
    }

    debug!(count = records.len(), "parsed listing rows");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
<h1>Exports</h1>
<table class="exports">
<tr><th>Date range</th><th>Type</th><th></th><th>Status</th></tr>
<tr><td>Jan 1 – Jan 7</td><td><b>full</b> workspace</td><td><button>x</button></td><td><a href="https://x/y.zip">ready</a></td></tr>
<tr><td class="range">Jan 8 – Jan 14</td><td>public channels</td><td></td><td>Processing…</td></tr>
</table>
<table><tr><th>Other</th></tr><tr><td>ignored</td></tr></table>
</body></html>"#;

    fn parsers() -> Vec<Box<dyn TableParser>> {
        vec![Box::new(RegexTableParser), Box::new(HtmlTableParser)]
    }

    #[test]
    fn test_end_to_end_single_row() {
        let html = r#"<table><tr><th>Date range</th><th>Type</th><th>Status</th></tr><tr><td>Jan 1 – Jan 7</td><td>full workspace</td><td><a href="https://x/y.zip">ready</a></td></tr></table>"#;
        for parser in parsers() {
            let records = parser.parse(html).unwrap();
            assert_eq!(records.len(), 1, "{}", parser.name());
            let rec = &records[0];
            assert_eq!(rec.fields().len(), 2);
            assert_eq!(rec.get("Date range"), Some("Jan 1 – Jan 7"));
            assert_eq!(rec.get("Type"), Some("full workspace"));
            assert_eq!(rec.status_url(), Some("https://x/y.zip"));
        }
    }

    #[test]
    fn test_rows_blank_headers_and_pending_status() {
        for parser in parsers() {
            let records = parser.parse(LISTING).unwrap();
            assert_eq!(records.len(), 2, "{}", parser.name());

            let keys: Vec<&String> = records[0].fields().keys().collect();
            assert_eq!(keys, vec!["Date range", "Type"]);
            assert_eq!(records[0].get("Type"), Some("full workspace"));
            assert!(records[0].is_ready());

            assert_eq!(records[1].get("Date range"), Some("Jan 8 – Jan 14"));
            assert_eq!(records[1].status_url(), None);
            assert!(records[1].get("Status").is_none());
        }
    }

    #[test]
    fn test_only_first_table_is_read() {
        for parser in parsers() {
            let records = parser.parse(LISTING).unwrap();
            assert!(records.iter().all(|r| r.get("Other").is_none()));
        }
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        for parser in parsers() {
            let err = parser.parse("<html><body>login</body></html>").unwrap_err();
            assert!(matches!(err, Error::Parse(_)), "{}", parser.name());
        }
    }

    #[test]
    fn test_cell_count_mismatch_is_parse_error() {
        let html = "<table><tr><th>Date range</th><th>Status</th></tr><tr><td>Jan</td></tr></table>";
        for parser in parsers() {
            let err = parser.parse(html).unwrap_err();
            assert!(matches!(err, Error::Parse(_)), "{}", parser.name());
        }
    }

    #[test]
    fn test_header_only_table_is_empty() {
        let html = "<table><tr><th>Date range</th><th>Status</th></tr></table>";
        for parser in parsers() {
            assert!(parser.parse(html).unwrap().is_empty());
        }
    }

    #[test]
    fn test_relative_status_link_kept_verbatim() {
        let html = r#"<table><tr><th>Date range</th><th>Status</th></tr><tr><td>Feb</td><td><span><a class="c-link" href="/services/export/download/1">Download</a></span></td></tr></table>"#;
        for parser in parsers() {
            let records = parser.parse(html).unwrap();
            assert_eq!(records[0].status_url(), Some("/services/export/download/1"));
        }
    }

    #[test]
    fn test_entities_kept_in_text_and_decoded_in_href() {
        let html = r#"<table><tr><th>Date range</th><th>Type</th><th>Status</th></tr><tr><td>Jan 1 &ndash; Jan 7</td><td>full&nbsp;workspace &amp; <b>files</b></td><td><a href="/dl?id=1&amp;t=2">ready</a></td></tr></table>"#;
        let mut outputs = Vec::new();
        for parser in parsers() {
            let records = parser.parse(html).unwrap();
            let rec = &records[0];
            assert_eq!(rec.get("Date range"), Some("Jan 1 &ndash; Jan 7"), "{}", parser.name());
            assert_eq!(rec.get("Type"), Some("full&nbsp;workspace &amp; files"), "{}", parser.name());
            assert_eq!(rec.status_url(), Some("/dl?id=1&t=2"), "{}", parser.name());
            outputs.push(records);
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_entity_headers_match_across_parsers() {
        let html = r#"<table><tr><th>Date&nbsp;range</th><th>Status</th></tr><tr><td>Mar</td><td><a href="/a?x=1&amp;y=2&z=3">ready</a></td></tr></table>"#;
        let outputs: Vec<_> = parsers().iter().map(|p| p.parse(html).unwrap()).collect();
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0][0].get("Date&nbsp;range"), Some("Mar"));
        assert_eq!(outputs[0][0].status_url(), Some("/a?x=1&y=2&z=3"));
    }

    #[test]
    fn test_decode_href() {
        assert_eq!(decode_href("/dl?id=1&amp;t=2"), "/dl?id=1&t=2");
        assert_eq!(decode_href("https://x/y.zip"), "https://x/y.zip");
        assert_eq!(decode_href("/a?q=&#37;20"), "/a?q=%20");
    }

    #[test]
    fn test_strip_tags_is_idempotent() {
        let once = strip_tags(r#"<span class="a"><b>full</b> <i>workspace</i></span> a < b"#);
        assert_eq!(once, "full workspace a < b");
        assert_eq!(strip_tags(&once), once);

        let nested = strip_tags("<<b>x>");
        assert_eq!(strip_tags(&nested), nested);
    }
}
