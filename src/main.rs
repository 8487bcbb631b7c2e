//! Crypto news selector: binary entrypoint.
//! Loads configuration, prepares storage and runs the polling service.

use crypto_news_selector::config::AppConfig;
use crypto_news_selector::metrics::Metrics;
use crypto_news_selector::service;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crypto_news_selector=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: config load failed: {e:#}");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::init() {
        Ok(m) => Some(m.handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    if let Err(e) = service::run(cfg, metrics).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
