// src/config/projects.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// A tracked project and its CoinGecko id (may be empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub symbol: String,
}

/// Load `Name|symbol` lines (bare `Name` allowed). Blank lines and `#`
/// comments are ignored. File order is kept; a repeated name replaces the
/// earlier entry's symbol in place.
pub fn load_projects_from(path: &Path) -> Result<Vec<Project>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading projects from {}", path.display()))?;
    Ok(parse_projects(&content))
}

pub fn parse_projects(content: &str) -> Vec<Project> {
    let mut projects: Vec<Project> = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        let (name, symbol) = match parts.as_slice() {
            [name] => (*name, ""),
            [name, symbol] => (*name, *symbol),
            _ => {
                tracing::warn!(line = idx + 1, content = line, "invalid project line, skipped");
                continue;
            }
        };
        if name.is_empty() {
            continue;
        }
        match projects.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.symbol = symbol.to_string(),
            None => projects.push(Project {
                name: name.to_string(),
                symbol: symbol.to_string(),
            }),
        }
    }
    projects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_bare_names_and_comments() {
        let src = "\
# tracked coins
Bitcoin | bitcoin
Ethereum|ethereum

Solana
bad|line|here
 | orphan
";
        let got = parse_projects(src);
        assert_eq!(
            got,
            vec![
                Project { name: "Bitcoin".into(), symbol: "bitcoin".into() },
                Project { name: "Ethereum".into(), symbol: "ethereum".into() },
                Project { name: "Solana".into(), symbol: String::new() },
            ]
        );
    }

    #[test]
    fn keeps_file_order_and_last_symbol_wins() {
        let got = parse_projects("Solana\nBitcoin|bitcoin\nSolana|solana\n");
        assert_eq!(
            got,
            vec![
                Project { name: "Solana".into(), symbol: "solana".into() },
                Project { name: "Bitcoin".into(), symbol: "bitcoin".into() },
            ]
        );
    }
}
