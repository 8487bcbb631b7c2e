// src/ingest/rss.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::normalize_text;
use crate::ingest::types::{FeedItem, FeedSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // quick-xml reports the local name; the prefixed spelling is kept for
    // documents read without namespace handling.
    #[serde(rename = "encoded", alias = "content:encoded")]
    content: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// RSS 2.0 feed, either fetched over HTTP or parsed from a fixed document.
pub struct RssFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeed {
    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("crypto-news-selector/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building http client")?;
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    pub fn parse_items_from_str(s: &str) -> Result<Vec<FeedItem>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            out.push(FeedItem {
                title,
                link: it.link.unwrap_or_default().trim().to_string(),
                description: normalize_text(it.description.as_deref().unwrap_or_default()),
                body: normalize_text(it.content.as_deref().unwrap_or_default()),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
            });
        }
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("GET {url}"))?
                    .text()
                    .await
                    .with_context(|| format!("reading body of {url}"))?;
                Self::parse_items_from_str(&body).with_context(|| format!("feed {}", self.name))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// XML only knows five named entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>Bitcoin&nbsp;tops $100k</title>
      <link> https://news.example/btc </link>
      <description><![CDATA[<p>Big <b>day</b></p>]]></description>
      <pubDate>Sat, 04 Oct 2025 15:04:05 +0000</pubDate>
    </item>
    <item>
      <title></title>
      <link>https://news.example/empty</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_and_skips_untitled() {
        let items = RssFeed::parse_items_from_str(XML).unwrap();
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.title, "Bitcoin tops $100k");
        assert_eq!(it.link, "https://news.example/btc");
        assert_eq!(it.description, "Big day");
        assert_eq!(
            it.published_at.map(|d| d.timestamp()),
            Some(1_759_590_245)
        );
    }

    #[test]
    fn channel_without_items_is_empty() {
        let xml = r#"<rss><channel><title>x</title></channel></rss>"#;
        assert!(RssFeed::parse_items_from_str(xml).unwrap().is_empty());
    }

    #[test]
    fn content_encoded_fills_body() {
        let xml = r#"<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <item>
      <title>Ethereum devnet goes live</title>
      <content:encoded><![CDATA[<p>Full <i>body</i></p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;
        let items = RssFeed::parse_items_from_str(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body, "Full body");
    }

    #[test]
    fn channel_fields_between_items_are_tolerated() {
        let xml = r#"<rss><channel>
  <title>x</title>
  <item><title>first</title></item>
  <lastBuildDate>Sat, 04 Oct 2025 15:04:05 +0000</lastBuildDate>
  <item><title>second</title></item>
</channel></rss>"#;
        let titles: Vec<String> = RssFeed::parse_items_from_str(xml)
            .unwrap()
            .into_iter()
            .map(|it| it.title)
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(RssFeed::parse_items_from_str("<rss><channel>").is_err());
    }
}
