// src/config/duration.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Parse Go-style duration strings: `500ms`, `90s`, `5m`, `1h30m`, `336h`.
/// `d` (24h) is accepted as well. Empty string or `0` parse to zero.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() || s == "0" {
        return Ok(Duration::ZERO);
    }

    static RE_PART: OnceCell<Regex> = OnceCell::new();
    let re = RE_PART.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|s|m|h|d)").unwrap());

    let mut total = 0f64;
    let mut consumed = 0usize;
    for cap in re.captures_iter(s) {
        let Some(whole) = cap.get(0) else {
            continue;
        };
        if whole.start() != consumed {
            bail!("invalid duration {raw:?}");
        }
        consumed = whole.end();

        let value: f64 = cap[1].parse()?;
        let unit_secs = match &cap[2] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3_600.0,
            "d" => 86_400.0,
            other => bail!("unknown duration unit {other:?}"),
        };
        total += value * unit_secs;
    }
    if consumed != s.len() {
        bail!("invalid duration {raw:?}");
    }

    Duration::try_from_secs_f64(total).map_err(|_| anyhow!("duration {raw:?} out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_style_units() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("14d").unwrap(), Duration::from_secs(14 * 86_400));
    }

    #[test]
    fn empty_and_zero_mean_unset() {
        assert_eq!(parse_duration("").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration(" 0 ").unwrap(), Duration::ZERO);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_duration("five minutes").is_err());
        assert!(parse_duration("5m junk").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("h").is_err());
    }
}
