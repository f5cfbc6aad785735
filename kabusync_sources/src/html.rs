//! Minimal HTML table extraction. The upstream pages are plain server-rendered
//! tables, so rows and cells are pulled out with regexes rather than a DOM.

use regex::Regex;

use crate::Error;

struct TableParser {
    table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
    space: Regex,
}

impl TableParser {
    fn new() -> Result<Self, Error> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Parse(format!("regex compile error: {}", e)))
        };
        Ok(Self {
            table: compile(r"(?is)<table[^>]*>(.*?)</table>")?,
            row: compile(r"(?is)<tr[^>]*>(.*?)</tr>")?,
            cell: compile(r"(?is)<td[^>]*>(.*?)</td>")?,
            tag: compile(r"(?s)<[^>]*>")?,
            space: compile(r"\s+")?,
        })
    }

    fn cell_text(&self, raw: &str) -> String {
        let text = self.tag.replace_all(raw, " ");
        let text = decode_entities(&text);
        self.space.replace_all(&text, " ").trim().to_string()
    }
}

/// Returns the `<td>` texts of every `<tr>` in the document, optionally
/// limited to the first `<table>`. Header rows built from `<th>` come back
/// as empty vectors so callers can skip them by length.
pub fn table_rows(html: &str, first_table_only: bool) -> Result<Vec<Vec<String>>, Error> {
    let parser = TableParser::new()?;
    let scope = if first_table_only {
        match parser.table.captures(html).and_then(|c| c.get(1)) {
            Some(body) => body.as_str(),
            None => return Err(Error::Parse("no <table> in page".into())),
        }
    } else {
        html
    };

    Ok(parser
        .row
        .captures_iter(scope)
        .filter_map(|row| row.get(1))
        .map(|row| {
            parser
                .cell
                .captures_iter(row.as_str())
                .filter_map(|cell| cell.get(1))
                .map(|cell| parser.cell_text(cell.as_str()))
                .collect()
        })
        .collect())
}

/// Strips tags and collapses whitespace in a fragment.
pub fn strip_tags(fragment: &str) -> Result<String, Error> {
    Ok(TableParser::new()?.cell_text(fragment))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
