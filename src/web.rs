// src/web.rs
//! Live feed surface: a static page, an SSE stream of matched news, a JSON
//! backlog and a health probe.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;

use crate::service::NewsMessage;

pub const BACKLOG_CAP: usize = 500;
const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Fan-out point for matched news: bounded backlog plus live broadcast.
#[derive(Clone)]
pub struct NewsHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    backlog: Mutex<VecDeque<NewsMessage>>,
    tx: broadcast::Sender<NewsMessage>,
    cap: usize,
}

impl Default for NewsHub {
    fn default() -> Self {
        Self::new(BACKLOG_CAP)
    }
}

impl NewsHub {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        let (tx, _) = broadcast::channel(cap);
        Self {
            inner: Arc::new(HubInner {
                backlog: Mutex::new(VecDeque::with_capacity(cap)),
                tx,
                cap,
            }),
        }
    }

    pub fn publish(&self, msg: NewsMessage) {
        let mut backlog = self.lock_backlog();
        backlog.push_back(msg.clone());
        while backlog.len() > self.inner.cap {
            backlog.pop_front();
        }
        // No subscribers is fine.
        let _ = self.inner.tx.send(msg);
    }

    pub fn snapshot(&self) -> Vec<NewsMessage> {
        self.lock_backlog().iter().cloned().collect()
    }

    /// Backlog and a live receiver taken under one lock, so nothing published
    /// in between is lost or seen twice.
    pub fn subscribe(&self) -> (Vec<NewsMessage>, broadcast::Receiver<NewsMessage>) {
        let backlog = self.lock_backlog();
        (backlog.iter().cloned().collect(), self.inner.tx.subscribe())
    }

    fn lock_backlog(&self) -> std::sync::MutexGuard<'_, VecDeque<NewsMessage>> {
        self.inner.backlog.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
struct WebState {
    hub: NewsHub,
}

pub fn router(hub: NewsHub, metrics: Option<PrometheusHandle>) -> Router {
    let app = Router::new()
        .route("/", get(index))
        .route("/events", get(events))
        .route("/api/news", get(news))
        .route("/health", get(|| async { "OK" }))
        .with_state(WebState { hub });
    match metrics {
        Some(handle) => app.merge(crate::metrics::router(handle)),
        None => app,
    }
}

pub async fn serve(addr: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding web ui on {addr}"))?;
    tracing::info!(target: "web", "web ui at http://{addr}");
    axum::serve(listener, app).await.context("web server")?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn news(State(state): State<WebState>) -> Json<Vec<NewsMessage>> {
    Json(state.hub.snapshot())
}

async fn events(
    State(state): State<WebState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (backlog, rx) = state.hub.subscribe();
    let replay = stream::iter(backlog.into_iter().map(to_event));
    let live = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(msg) => return Some((to_event(msg), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(target: "web", skipped, "sse subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(replay.chain(live)).keep_alive(KeepAlive::default())
}

fn to_event(msg: NewsMessage) -> Result<Event, axum::Error> {
    Event::default().json_data(&msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FeedItem;

    fn msg(title: &str) -> NewsMessage {
        NewsMessage {
            project: "bitcoin".into(),
            timestamp: "2025-10-04 15:04:05".into(),
            item: FeedItem {
                title: title.into(),
                ..Default::default()
            },
            price_usd: None,
        }
    }

    #[test]
    fn backlog_is_bounded() {
        let hub = NewsHub::new(3);
        for i in 0..5 {
            hub.publish(msg(&format!("n{i}")));
        }
        let titles: Vec<String> = hub.snapshot().into_iter().map(|m| m.item.title).collect();
        assert_eq!(titles, vec!["n2", "n3", "n4"]);
    }

    #[tokio::test]
    async fn subscriber_gets_backlog_then_live() {
        let hub = NewsHub::new(10);
        hub.publish(msg("old"));
        let (backlog, mut rx) = hub.subscribe();
        hub.publish(msg("new"));
        assert_eq!(backlog.len(), 1);
        assert_eq!(rx.recv().await.unwrap().item.title, "new");
    }
}
