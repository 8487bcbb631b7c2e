// src/ingest/mod.rs
pub mod rss;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Finds which tracked project a headline is about: whole-word,
/// case-insensitive, first configured project wins.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    patterns: Vec<(String, Regex)>,
}

impl EntityMatcher {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let patterns = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .filter_map(|n| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(n));
                match Regex::new(&pattern) {
                    Ok(re) => Some((n.to_string(), re)),
                    Err(e) => {
                        tracing::warn!(target: "ingest", project = n, error = %e, "matcher pattern rejected");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, title: &str, name: &str) -> bool {
        self.patterns
            .iter()
            .any(|(n, re)| n == name && re.is_match(title))
    }

    pub fn first_match(&self, title: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(title))
            .map(|(n, _)| n.as_str())
    }
}
