//! Text helpers for archive records.

use chrono::{DateTime, Utc};

/// `MM/DD/YYYY HH:MM` in UTC.
pub fn archive_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%m/%d/%Y %H:%M").to_string()
}

/// Wrap message text in double quotes, as shown in the archive.
pub fn quote(text: &str) -> String {
    format!("\"{text}\"")
}

/// Split `text` into pages of at most `max_len` characters, breaking on line
/// boundaries where possible. Lines longer than a page are cut by character.
///
/// When no line is longer than a page, joining the pages with `\n` gives back
/// the original text, blank lines included.
pub fn paginate(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut pages = Vec::new();
    let mut page = String::new();
    let mut page_len = 0usize;
    // An empty line still occupies a page slot, so emptiness of `page` alone
    // cannot tell whether the next line needs a separator.
    let mut started = false;

    for line in text.split('\n') {
        for chunk in chunk_chars(line, max_len) {
            let chunk_len = chunk.chars().count();
            let sep = usize::from(started);
            if started && page_len + sep + chunk_len > max_len {
                pages.push(std::mem::take(&mut page));
                page_len = 0;
                started = false;
            }
            if started {
                page.push('\n');
                page_len += 1;
            }
            page.push_str(&chunk);
            page_len += chunk_len;
            started = true;
        }
    }

    pages.push(page);
    pages
}

fn chunk_chars(line: &str, max_len: usize) -> Vec<String> {
    if line.chars().count() <= max_len {
        return vec![line.to_string()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(max_len)
        .map(|c| c.iter().collect::<String>())
        .collect()
}
