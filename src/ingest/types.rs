// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String, // HTML stripped
    pub body: String,        // content:encoded, HTML stripped
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>>;
    fn name(&self) -> &str;
}
