// src/service.rs
//! Polling service: fetch feeds on a timer, pick out items about tracked
//! projects, print and publish them, and persist them through `Storage`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::{AppConfig, Project, RssSource};
use crate::ingest::rss::RssFeed;
use crate::ingest::types::{FeedItem, FeedSource};
use crate::ingest::EntityMatcher;
use crate::price::PriceClient;
use crate::storage::{Entity, NewsRecord, Storage};
use crate::web::{self, NewsHub};

const CHANNEL_CAP: usize = 100;

/// A matched item on its way to the terminal, the web feed and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsMessage {
    pub project: String,
    pub timestamp: String,
    pub item: FeedItem,
    pub price_usd: Option<f64>,
}

impl NewsMessage {
    pub fn to_record(&self) -> NewsRecord {
        NewsRecord {
            title: self.item.title.clone(),
            link: self.item.link.clone(),
            description: self.item.description.clone(),
            body: self.item.body.clone(),
            price_usd: self.price_usd,
        }
    }
}

/// Titles already delivered during this process run. Not persisted, so a
/// restart may deliver the same headline again; the log writer's dedup
/// window catches most of those.
#[derive(Debug, Default)]
pub struct SeenTitles(HashSet<String>);

impl SeenTitles {
    pub fn contains(&self, title: &str) -> bool {
        self.0.contains(title)
    }

    pub fn insert(&mut self, title: &str) {
        self.0.insert(title.to_string());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Poller {
    feeds: Vec<Box<dyn FeedSource>>,
    matcher: EntityMatcher,
    symbols: HashMap<String, String>,
    prices: Option<PriceClient>,
}

impl Poller {
    pub fn new(
        feeds: Vec<Box<dyn FeedSource>>,
        projects: &[Project],
        prices: Option<PriceClient>,
    ) -> Self {
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        Self {
            feeds,
            matcher: EntityMatcher::new(names.as_slice()),
            symbols: projects
                .iter()
                .map(|p| (p.name.clone(), p.symbol.clone()))
                .collect(),
            prices,
        }
    }

    /// One pass over every feed. A failing feed is skipped for this tick.
    pub async fn poll_once(&self, seen: &mut SeenTitles) -> Vec<NewsMessage> {
        let mut out = Vec::new();
        for feed in &self.feeds {
            let items = match feed.fetch_latest().await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(target: "ingest", feed = feed.name(), error = %format!("{e:#}"), "feed fetch failed");
                    counter!("ingest_feed_errors_total").increment(1);
                    continue;
                }
            };

            for item in items {
                if seen.contains(&item.title) {
                    continue;
                }
                let Some(project) = self.matcher.first_match(&item.title) else {
                    continue;
                };
                let project = project.to_string();
                let price_usd = self.lookup_price(&project).await;

                seen.insert(&item.title);
                counter!("ingest_matched_total").increment(1);
                out.push(NewsMessage {
                    project,
                    timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                    item,
                    price_usd,
                });
            }
        }
        out
    }

    async fn lookup_price(&self, project: &str) -> Option<f64> {
        let prices = self.prices.as_ref()?;
        let symbol = self.symbols.get(project)?;
        prices.price_usd(symbol).await
    }
}

pub fn build_feeds(sources: &[RssSource]) -> Vec<Box<dyn FeedSource>> {
    sources
        .iter()
        .filter_map(|s| match RssFeed::from_url(&s.name, &s.url) {
            Ok(feed) => Some(Box::new(feed) as Box<dyn FeedSource>),
            Err(e) => {
                tracing::warn!(target: "service", feed = %s.name, error = %format!("{e:#}"), "feed disabled");
                None
            }
        })
        .collect()
}

/// Print, publish and persist one message. Storage failures are logged; the
/// caller keeps going.
pub async fn handle_message(storage: &Storage, hub: &NewsHub, msg: NewsMessage, print: bool) {
    if print {
        print_news(&msg);
    }
    hub.publish(msg.clone());

    let entity = match Entity::new(&msg.project) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(target: "service", error = %e, "message dropped");
            return;
        }
    };
    if let Err(e) = storage.append_records(&entity, vec![msg.to_record()]).await {
        tracing::error!(target: "service", entity = %entity, error = %e, "news recording failed");
    }
}

/// Run the full-sweep timer. The first sweep happens one `period` from now;
/// `Storage::init` already swept at startup.
pub fn spawn_daily_sweep(storage: Storage, entities: Vec<Entity>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::info!(target: "service", "launching daily storage sweep");
            storage.sweep_all(&entities).await;
        }
    })
}

fn spawn_poll_loop(poller: Poller, every: Duration, tx: mpsc::Sender<NewsMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen = SeenTitles::default();
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::info!(target: "service", seen = seen.len(), "rss analysis tick");
            for msg in poller.poll_once(&mut seen).await {
                if tx.send(msg).await.is_err() {
                    return;
                }
            }
        }
    })
}

fn spawn_consumer(mut rx: mpsc::Receiver<NewsMessage>, storage: Storage, hub: NewsHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            handle_message(&storage, &hub, msg, true).await;
        }
    })
}

/// Start everything and run until Ctrl-C.
pub async fn run(cfg: AppConfig, metrics: Option<PrometheusHandle>) -> Result<()> {
    let root = cfg.storage_root()?;
    let entities = cfg.entities();
    let storage = Storage::init(root, &entities, cfg.policy.clone())
        .await
        .context("initializing news storage")?;

    let hub = NewsHub::default();
    if cfg.web.enabled {
        let app = web::router(hub.clone(), metrics);
        let addr = cfg.web.addr.clone();
        tokio::spawn(async move {
            if let Err(e) = web::serve(&addr, app).await {
                tracing::error!(target: "web", error = %format!("{e:#}"), "web ui stopped");
            }
        });
    }

    let prices = if cfg.price_lookup {
        Some(PriceClient::new(cfg.price_api_base.as_str())?)
    } else {
        None
    };
    let poller = Poller::new(build_feeds(&cfg.rss), &cfg.projects, prices);

    let (tx, rx) = mpsc::channel(CHANNEL_CAP);
    let consumer = spawn_consumer(rx, storage.clone(), hub.clone());
    let polling = spawn_poll_loop(poller, cfg.interval, tx);
    let daily = spawn_daily_sweep(storage.clone(), entities, cfg.daily_check_interval);

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!(target: "service", "shutting down");

    polling.abort();
    daily.abort();
    // The consumer drains what is queued and exits once the sender is gone.
    let _ = consumer.await;
    storage.drain().await;
    Ok(())
}

fn print_news(msg: &NewsMessage) {
    println!(
        "\n[{}] PROJECT: \x1b[1;31m{:<10}\x1b[0m\n",
        msg.timestamp,
        msg.project.to_uppercase()
    );
    println!("TITLE: \x1b[32m{}\x1b[0m", msg.item.title);
    if !msg.item.description.is_empty() {
        println!("DESC: {}\n", msg.item.description);
    }
    if !msg.item.body.is_empty() {
        println!("CONTENT: {}\n", msg.item.body);
    }
    if let Some(price) = msg.price_usd {
        println!("PRICE: ${price:.2}");
    }
    println!("LINK: \x1b[34m{}\x1b[0m\n", msg.item.link);
    println!(">>>{}>>>", "-".repeat(76));
}
