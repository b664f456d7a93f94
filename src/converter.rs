//! RSS-to-JSON conversion.
//!
//! The wire types here describe the JSON shape the feed fetcher consumes. The
//! same shape is produced by [`FeedConverter`], which parses feeds directly so
//! the service can act as its own conversion endpoint.

use std::time::Duration;

use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fetcher::strip_html;

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

const PUB_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const WORDS_PER_MINUTE: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConverterResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<ConverterFeed>,
    #[serde(default)]
    pub items: Vec<ConverterItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterFeed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub last_build_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_time: Option<String>,
}

impl ConverterResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

pub struct FeedConverter {
    client: Client,
}

impl FeedConverter {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// Fetches `rss_url` and converts it. Failures become an error-status
    /// response rather than an `Err`.
    pub async fn convert(&self, rss_url: &str) -> ConverterResponse {
        info!("Converting feed: {}", rss_url);

        let response = match self.client.get(rss_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch feed '{}': {}", rss_url, e);
                return ConverterResponse::error(format!("Failed to fetch feed: {}", e));
            }
        };

        if !response.status().is_success() {
            warn!("Feed '{}' answered {}", rss_url, response.status());
            return ConverterResponse::error(format!(
                "Feed answered with status {}",
                response.status()
            ));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return ConverterResponse::error(format!("Failed to read feed: {}", e)),
        };

        match parser::parse(&bytes[..]) {
            Ok(feed) => Self::from_feed(feed),
            Err(e) => {
                warn!("Failed to parse feed '{}': {}", rss_url, e);
                ConverterResponse::error(format!("Failed to parse feed: {}", e))
            }
        }
    }

    pub fn from_feed(feed: Feed) -> ConverterResponse {
        let image = feed
            .logo
            .as_ref()
            .or(feed.icon.as_ref())
            .map(|image| image.uri.clone());

        let converted_feed = ConverterFeed {
            title: feed.title.as_ref().map(|t| t.content.clone()),
            description: feed.description.as_ref().map(|t| t.content.clone()),
            link: feed.links.first().map(|l| l.href.clone()),
            image,
            last_build_date: feed.updated.map(|dt| dt.to_rfc2822()),
        };

        let items = feed.entries.iter().map(Self::convert_entry).collect();

        ConverterResponse {
            status: STATUS_OK.to_string(),
            message: None,
            feed: Some(converted_feed),
            items,
        }
    }

    fn convert_entry(entry: &Entry) -> ConverterItem {
        let description = entry
            .summary
            .as_ref()
            .map(|t| t.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()));

        let estimate = entry
            .content
            .as_ref()
            .and_then(|c| c.body.as_deref())
            .or(description.as_deref())
            .map(read_time);

        let thumbnail = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .next()
            .map(|t| t.image.uri.clone());

        ConverterItem {
            title: entry.title.as_ref().map(|t| t.content.clone()),
            link: entry.links.first().map(|l| l.href.clone()),
            description,
            pub_date: entry
                .published
                .or(entry.updated)
                .map(|dt| dt.format(PUB_DATE_FORMAT).to_string()),
            author: entry.authors.first().map(|p| p.name.clone()),
            categories: entry.categories.iter().map(|c| c.term.clone()).collect(),
            thumbnail,
            read_time: estimate,
        }
    }
}

/// Reading estimate for a body of text or markup, e.g. `"3 min read"`.
pub fn read_time(text: &str) -> String {
    let words = strip_html(text).split_whitespace().count();
    format!("{} min read", words.div_ceil(WORDS_PER_MINUTE))
}
