//! View state and its query-string encoding.
//!
//! The query string is the navigable form of what the grid is showing:
//! `album=<id>` or `q=<search>`, then `sort=date|quality`, then `stack=true`.
//! Encoding always produces the canonical form; parsing accepts anything.

use std::fmt;

/// How the grid orders items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    #[default]
    ByDate,
    ByQuality,
}

impl SortMode {
    pub fn as_param(self) -> &'static str {
        match self {
            SortMode::ByDate => "date",
            SortMode::ByQuality => "quality",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "date" => Some(SortMode::ByDate),
            "quality" => Some(SortMode::ByQuality),
            _ => None,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMode::ByDate => write!(f, "By Date"),
            SortMode::ByQuality => write!(f, "By Quality"),
        }
    }
}

/// The user-facing view parameters.
///
/// A search query replaces the collection scope: whenever `search_query`
/// is set, `collection_id` is None.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub collection_id: Option<String>,
    pub sort_mode: SortMode,
    pub stack: bool,
    pub search_query: Option<String>,
}

impl ViewState {
    /// Parse a query string (with or without a leading `?`).
    pub fn from_query(query: &str) -> Self {
        let mut album = None;
        let mut search = None;
        let mut sort_mode = SortMode::default();
        let mut stack = false;

        let query = query.strip_prefix('?').unwrap_or(query);
        for part in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            let value = percent_decode(value);
            match percent_decode(key).as_str() {
                "album" => album = Some(value).filter(|v| !v.is_empty()),
                "q" => {
                    let trimmed = value.trim();
                    search = (!trimmed.is_empty()).then(|| trimmed.to_string());
                }
                "sort" => sort_mode = SortMode::from_param(&value).unwrap_or_default(),
                "stack" => stack = matches!(value.as_str(), "true" | "1"),
                _ => {}
            }
        }

        ViewState {
            collection_id: if search.is_some() { None } else { album },
            sort_mode,
            stack,
            search_query: search,
        }
    }

    /// Canonical query string, without the leading `?`.
    pub fn to_query(&self) -> String {
        let mut pairs = Vec::with_capacity(3);
        match (&self.search_query, &self.collection_id) {
            (Some(q), _) => pairs.push(format!("q={}", percent_encode(q))),
            (None, Some(album)) => pairs.push(format!("album={}", percent_encode(album))),
            (None, None) => {}
        }
        pairs.push(format!("sort={}", self.sort_mode.as_param()));
        if self.stack {
            pairs.push("stack=true".to_string());
        }
        pairs.join("&")
    }

    /// True when the state should list a collection rather than search results
    pub fn is_browsing(&self) -> bool {
        self.search_query.is_none()
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn percent_decode(raw: &str) -> String {
    fn hex(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    // Malformed escapes are kept literally
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
