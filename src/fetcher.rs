use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::FeedSettings;
use crate::converter::{ConverterItem, ConverterResponse};
use crate::models::{Article, NormalizedFeed};
use crate::pruner::SourcePruner;

/// A source must yield at least this many items, before and after cleaning.
pub const MIN_ARTICLES: usize = 5;

const FEED_SUFFIX: &str = "/feed";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to converter failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("converter response did not match the expected schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("converter reported status '{status}'")]
    Status { status: String },
    #[error("feed has {found} items, need {}", MIN_ARTICLES)]
    TooFewItems { found: usize },
    #[error("feed has {found} usable articles after cleaning, need {}", MIN_ARTICLES)]
    TooFewArticles { found: usize },
}

/// Retrieves one source's feed. `None` means the source is not viable.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, url: &str, source_id: i64) -> Option<NormalizedFeed>;
}

pub struct Fetcher {
    client: Client,
    converter_url: String,
    pruner: Arc<SourcePruner>,
}

impl Fetcher {
    pub fn new(settings: &FeedSettings, pruner: Arc<SourcePruner>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            converter_url: settings.converter_url.clone(),
            pruner,
        })
    }

    async fn try_fetch(&self, rss_url: &str) -> Result<NormalizedFeed, FetchError> {
        let body = self
            .client
            .get(&self.converter_url)
            .query(&[("rss_url", rss_url)])
            .send()
            .await?
            .text()
            .await?;

        let response: ConverterResponse = serde_json::from_str(&body)?;
        Self::normalize(response)
    }

    /// Applies the viability rules to a converter response and cleans its items.
    pub fn normalize(response: ConverterResponse) -> Result<NormalizedFeed, FetchError> {
        if !response.is_ok() {
            return Err(FetchError::Status {
                status: response.status,
            });
        }

        if response.items.len() < MIN_ARTICLES {
            return Err(FetchError::TooFewItems {
                found: response.items.len(),
            });
        }

        let feed = response.feed.unwrap_or_default();
        let feed_title = feed.title.unwrap_or_default();

        let articles: Vec<Article> = response
            .items
            .into_iter()
            .map(|item| Self::clean_item(item, &feed_title))
            .filter(|article| !article.title.is_empty() && !article.description.is_empty())
            .collect();

        if articles.len() < MIN_ARTICLES {
            return Err(FetchError::TooFewArticles {
                found: articles.len(),
            });
        }

        Ok(NormalizedFeed {
            feed_title,
            feed_description: feed.description.unwrap_or_default(),
            feed_link: feed.link.unwrap_or_default(),
            feed_image: feed.image.filter(|s| !s.is_empty()),
            articles,
            last_build_date: feed.last_build_date,
        })
    }

    fn clean_item(item: ConverterItem, feed_title: &str) -> Article {
        let full_description = item.description.unwrap_or_default();

        Article {
            title: strip_html(item.title.as_deref().unwrap_or("")),
            link: item.link.unwrap_or_default(),
            description: strip_html(&full_description),
            full_description,
            pub_date: item.pub_date.as_deref().and_then(parse_pub_date),
            author: item
                .author
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| feed_title.to_string()),
            categories: item.categories,
            thumbnail: item.thumbnail.filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl FeedSource for Fetcher {
    async fn fetch_feed(&self, url: &str, source_id: i64) -> Option<NormalizedFeed> {
        let rss_url = feed_url(url);
        info!("Fetching feed for source {}: {}", source_id, rss_url);

        match self.try_fetch(&rss_url).await {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!("Source {} ({}) is not viable: {}", source_id, url, e);
                self.pruner.prune(source_id);
                None
            }
        }
    }
}

/// Points a site URL at its RSS endpoint.
pub fn feed_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with(FEED_SUFFIX) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, FEED_SUFFIX)
    }
}

/// Removes markup, decodes entities and collapses whitespace.
///
/// A `<` only opens a tag when followed by a letter, `/`, `!` or `?`, so
/// text such as `3 < 5` survives.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut chars = html.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '<' if !in_tag && chars.peek().is_some_and(|&next| opens_tag(next)) => {
                in_tag = true;
            }
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let decoded = html_escape::decode_html_entities(&out);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn opens_tag(next: char) -> bool {
    next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?')
}

/// Accepts RFC 3339, RFC 2822 and `YYYY-MM-DD HH:MM:SS` (read as UTC).
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
