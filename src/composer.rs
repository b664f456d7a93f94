use std::sync::Arc;

use tracing::{info, warn};

use crate::completion::{CompletionError, TextGenerator};
use crate::fetcher::parse_pub_date;
use crate::models::{NewsletterInput, SelectedSource, UserPreferences};

const SYSTEM_PROMPT: &str = "You are a friendly newsletter curator who turns formal articles \
                             into fun, conversational content.";

const TONE: &str = "Friendly, relatable, and engaging";

/// Description length for the `short`, `long` and any other preference.
pub const SHORT_DESCRIPTION: usize = 100;
pub const LONG_DESCRIPTION: usize = 300;
pub const DEFAULT_DESCRIPTION: usize = 200;

const ARTICLES_PER_SECTION: usize = 5;

const UNKNOWN_DATE: &str = "an unknown date";

/// Writes the digest text for a set of selected sources.
#[derive(Clone)]
pub struct DigestComposer {
    generator: Arc<dyn TextGenerator>,
}

impl DigestComposer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Asks the generator first and renders the template when it fails.
    pub async fn compose(&self, sources: &[SelectedSource], prefs: &UserPreferences) -> String {
        let prompt = match build_prompt(sources, prefs) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not serialize digest context: {}", e);
                return render_fallback(sources, prefs);
            }
        };

        match self.generator.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                info!("Generated digest for {} sources", sources.len());
                text
            }
            Err(e) => {
                warn!("Generated digest unavailable, using template: {}", e);
                render_fallback(sources, prefs)
            }
        }
    }

    /// Digest for newsletters the caller already holds. No template fallback:
    /// generator errors are returned.
    pub async fn compose_requested(
        &self,
        user_name: &str,
        newsletters: &[NewsletterInput],
    ) -> Result<String, CompletionError> {
        let prompt = build_request_prompt(user_name, newsletters);
        let digest = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        info!(
            "Generated requested digest for {} newsletters",
            newsletters.len()
        );
        Ok(digest)
    }
}

/// The user message sent to the generator, with the sources attached as JSON.
pub fn build_prompt(
    sources: &[SelectedSource],
    prefs: &UserPreferences,
) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string_pretty(sources)?;
    let interests = if prefs.interests.is_empty() {
        "a variety of topics".to_string()
    } else {
        prefs.interests.join(", ")
    };

    Ok(format!(
        "You are a friendly and casual newsletter curator. Your job is to take these articles \
         and create a warm, engaging digest that reads like a conversation between friends.\n\
         User's name: {}\n\
         User's interests: {}\n\
         Tone: {}\n\
         Content length: {}\n\n\
         Articles to process:\n{}",
        prefs.first_name().unwrap_or("Reader"),
        interests,
        TONE,
        prefs.content_length.as_deref().unwrap_or("medium"),
        payload
    ))
}

/// Plain-text prompt listing each newsletter and its articles.
pub fn build_request_prompt(user_name: &str, newsletters: &[NewsletterInput]) -> String {
    let mut prompt = format!(
        "Generate a personalized newsletter digest for {}. Here are the newsletters:\n\n",
        user_name
    );

    for newsletter in newsletters {
        prompt.push_str(&format!("- {} ({}):\n", newsletter.title, newsletter.category));
        for article in &newsletter.articles {
            let date = article
                .pub_date
                .as_deref()
                .and_then(parse_pub_date)
                .map(|dt| dt.format("%-m/%-d/%Y").to_string())
                .unwrap_or_else(|| UNKNOWN_DATE.to_string());
            prompt.push_str(&format!(
                "  * {} by {} on {}\n",
                article.title, article.author, date
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str("Please provide a friendly and engaging digest summarizing the articles.\n");
    prompt
}

pub fn description_limit(content_length: Option<&str>) -> usize {
    match content_length {
        Some("short") => SHORT_DESCRIPTION,
        Some("long") => LONG_DESCRIPTION,
        _ => DEFAULT_DESCRIPTION,
    }
}

/// First `limit` characters of `text` followed by an ellipsis.
pub fn truncate_description(text: &str, limit: usize) -> String {
    let mut out: String = text.chars().take(limit).collect();
    out.push_str("...");
    out
}

/// Deterministic template digest.
pub fn render_fallback(sources: &[SelectedSource], prefs: &UserPreferences) -> String {
    let name = prefs.first_name().unwrap_or("there");
    let content_length = prefs.content_length.as_deref().unwrap_or("medium");
    let limit = description_limit(prefs.content_length.as_deref());
    let interests = if prefs.interests.is_empty() {
        "a variety of things".to_string()
    } else {
        prefs.interests.join(", ")
    };

    let mut digest = format!("👋 Hey {}!\n\n", name);
    digest.push_str(&format!(
        "Here’s your personalized newsletter digest, specially curated just for you! \
         We've picked out some great reads on topics that spark your interest in {}.\n\n",
        interests
    ));

    for (index, source) in sources.iter().enumerate() {
        digest.push_str(&format!("📚 **{}** ({})\n", source.title, source.category));

        for (position, article) in source.articles.iter().take(ARTICLES_PER_SECTION).enumerate() {
            let date = article
                .pub_date
                .map(|dt| dt.format("%b %-d, %Y").to_string())
                .unwrap_or_else(|| UNKNOWN_DATE.to_string());

            digest.push_str(&format!("\n{}. **{}**\n", position + 1, article.title));
            digest.push_str(&truncate_description(&article.description, limit));
            digest.push('\n');
            digest.push_str(&format!("✍️ By {} on {}\n", article.author, date));
            digest.push_str(&format!("🔗 [Read more]({})\n", article.link));
        }

        if index + 1 < sources.len() {
            digest.push_str("\n---\n\n");
        }
    }

    digest.push_str("\nHope you enjoy these reads! 📖✨\n\n");
    digest.push_str(&format!(
        "Just a friendly reminder: This digest is tailored to your {}-form preference, \
         so you can look forward to updates {}.",
        content_length,
        prefs
            .frequency
            .as_deref()
            .unwrap_or("whenever we have great stuff!")
    ));

    digest
}
