// src/config/mod.rs
pub mod duration;
pub mod projects;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::{Entity, RetentionPolicy};
pub use duration::parse_duration;
pub use projects::{load_projects_from, Project};

pub const ENV_CONFIG_PATH: &str = "CNS_CONFIG_PATH";
pub const ENV_PROJECTS_PATH: &str = "CNS_PROJECTS_PATH";
pub const ENV_NEWS_DIR: &str = "NEWS_DIR";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_DAILY_CHECK: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_PRICE_API: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssSource {
    pub name: String,
    pub url: String,
}

/// Storage knobs as written in the config file. Durations are strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub archive_dir: String,
    #[serde(default)]
    pub daily_check_interval: String,
    #[serde(default)]
    pub log_retention: String,
    #[serde(default)]
    pub archive_life: String,
    #[serde(default)]
    pub max_workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSettings {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    #[serde(default = "default_web_addr")]
    pub addr: String,
}

fn default_web_enabled() -> bool {
    true
}
fn default_web_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            addr: default_web_addr(),
        }
    }
}

/// On-disk shape of `config/config.json` (or `.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub rss: Vec<RssSource>,
    #[serde(default)]
    pub file_settings: FileSettings,
    #[serde(default)]
    pub web: WebSettings,
    #[serde(default)]
    pub price_lookup: bool,
    #[serde(default)]
    pub price_api_base: Option<String>,
}

/// Fully resolved configuration; built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub interval: Duration,
    pub daily_check_interval: Duration,
    pub rss: Vec<RssSource>,
    pub policy: RetentionPolicy,
    pub root_dir: Option<PathBuf>,
    pub web: WebSettings,
    pub price_lookup: bool,
    pub price_api_base: String,
    pub projects: Vec<Project>,
}

impl AppConfig {
    pub fn resolve(file: FileConfig, projects: Vec<Project>) -> Result<Self> {
        let fs_cfg = &file.file_settings;
        let dur = |label: &str, raw: &str| -> Result<Option<Duration>> {
            let d = parse_duration(raw).with_context(|| format!("config field {label}"))?;
            Ok((!d.is_zero()).then_some(d))
        };

        let policy = RetentionPolicy::resolve(
            dur("file_settings.log_retention", &fs_cfg.log_retention)?,
            dur("file_settings.archive_life", &fs_cfg.archive_life)?,
            Some(fs_cfg.max_workers),
            Some(fs_cfg.archive_dir.as_str()),
        );

        Ok(Self {
            interval: dur("interval", &file.interval)?.unwrap_or(DEFAULT_INTERVAL),
            daily_check_interval: dur(
                "file_settings.daily_check_interval",
                &fs_cfg.daily_check_interval,
            )?
            .unwrap_or(DEFAULT_DAILY_CHECK),
            rss: file.rss.clone(),
            policy,
            root_dir: fs_cfg.root_dir.clone(),
            web: file.web.clone(),
            price_lookup: file.price_lookup,
            price_api_base: file
                .price_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_PRICE_API.to_string()),
            projects,
        })
    }

    /// Load config file and projects list using env vars + fallbacks.
    pub fn load() -> Result<Self> {
        let file = load_config_default()?;
        let projects = load_projects_default()?;
        Self::resolve(file, projects)
    }

    /// Normalized entities for all projects; names without usable characters
    /// are dropped with a warning.
    pub fn entities(&self) -> Vec<Entity> {
        self.projects
            .iter()
            .filter_map(|p| match Entity::new(&p.name) {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!(project = %p.name, error = %e, "project skipped");
                    None
                }
            })
            .collect()
    }

    pub fn storage_root(&self) -> Result<PathBuf> {
        resolve_storage_root(self.root_dir.as_deref())
    }
}

/// Load a config file; TOML when the extension says so, JSON otherwise.
pub fn load_config_from(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext == "toml" {
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Load config using env var + fallbacks:
/// 1) $CNS_CONFIG_PATH
/// 2) config/config.json
/// 3) config/config.toml
pub fn load_config_default() -> Result<FileConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
    }
    for candidate in ["config/config.json", "config/config.toml"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_config_from(&pb);
        }
    }
    Err(anyhow!("no config found (set {ENV_CONFIG_PATH} or add config/config.json)"))
}

/// $CNS_PROJECTS_PATH, else `projects.txt` in the working directory.
pub fn load_projects_default() -> Result<Vec<Project>> {
    let path = std::env::var(ENV_PROJECTS_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("projects.txt"));
    load_projects_from(&path)
}

/// Storage root: explicit setting, else $NEWS_DIR, else `$HOME/news`.
pub fn resolve_storage_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(p.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(ENV_NEWS_DIR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    match std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join("news")),
        None => bail!("cannot determine the home directory for the news storage root"),
    }
}
