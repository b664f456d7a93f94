use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A catalog row: one subscribed feed-bearing site.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub category: String,
}

impl Source {
    /// Whether the category contains `interest`, ignoring case (Unicode folding).
    pub fn matches_interest(&self, interest: &str) -> bool {
        let needle = interest.trim().to_lowercase();
        !needle.is_empty() && self.category.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub link: String,
    /// Plain text, markup removed
    pub description: String,
    /// Description as delivered by the feed
    pub full_description: String,
    pub pub_date: Option<DateTime<Utc>>,
    pub author: String,
    pub categories: Vec<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFeed {
    pub feed_title: String,
    pub feed_description: String,
    pub feed_link: String,
    pub feed_image: Option<String>,
    /// Most recent first, in the order the feed supplied them
    pub articles: Vec<Article>,
    pub last_build_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSource {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub category: String,
    pub articles: Vec<Article>,
    pub last_build_date: Option<String>,
    pub feed_image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub name: Option<String>,
    pub interests: Vec<String>,
    pub frequency: Option<String>,
    pub content_length: Option<String>,
}

impl UserPreferences {
    /// First whitespace-separated word of the name, if any.
    pub fn first_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
    }
}

/// What the calling layer receives for one digest request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestResponse {
    pub newsletters: Vec<SelectedSource>,
    pub digest: String,
}

/// Body of a standalone digest request: newsletters supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestRequest {
    #[serde(default)]
    pub user_name: String,
    pub newsletters: Vec<NewsletterInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsletterInput {
    pub title: String,
    pub category: String,
    pub articles: Vec<ArticleInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArticleInput {
    pub title: String,
    pub author: String,
    pub pub_date: Option<String>,
}
