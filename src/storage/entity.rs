// src/storage/entity.rs
use std::fmt;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::StorageError;

/// Filesystem-safe project identifier: lowercase ASCII letters, digits, `-`
/// and `_`. Every other run of characters collapses into a single `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(String);

impl Entity {
    pub fn new(raw: &str) -> Result<Self, StorageError> {
        let normalized = normalize_entity_name(raw);
        if normalized.trim_matches('_').is_empty() {
            return Err(StorageError::InvalidEntity(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Entity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn normalize_entity_name(raw: &str) -> String {
    static RE_UNSAFE: OnceCell<Regex> = OnceCell::new();
    let re = RE_UNSAFE.get_or_init(|| Regex::new(r"[^a-z0-9_\-]+").unwrap());
    let lower = raw.trim().to_lowercase();
    re.replace_all(&lower, "_").into_owned()
}
