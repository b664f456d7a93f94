use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Upper bound in seconds for visiting candidate sources in one request
    #[serde(default = "default_request_deadline")]
    pub request_deadline_secs: u64,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub completion: CompletionSettings,
    /// Seed rows for the source catalog, upserted by url at startup
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_request_deadline() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSettings {
    /// RSS-to-JSON conversion endpoint; receives the feed as `rss_url`
    #[serde(default = "default_converter_url")]
    pub converter_url: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_converter_url() -> String {
    "https://api.rss2json.com/v1/api.json".to_string()
}

fn default_feed_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "NewsletterDigest/1.0 (Digest Builder)".to_string()
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            converter_url: default_converter_url(),
            timeout_secs: default_feed_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionSettings {
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_temperature() -> f32 {
    0.7
}

fn default_completion_timeout() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_completion_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl CompletionSettings {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub title: String,
    pub url: String,
    pub category: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_for_empty_config() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.request_deadline_secs, 60);
        assert_eq!(config.feed.converter_url, "https://api.rss2json.com/v1/api.json");
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.completion.model, "gpt-4");
        assert_eq!(config.completion.max_tokens, 1500);
        assert_eq!(config.completion.api_key_env, "OPENAI_API_KEY");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            bind_addr = "127.0.0.1:8080"
            request_deadline_secs = 20

            [feed]
            converter_url = "http://localhost:3000/api/v1/convert"
            timeout_secs = 5

            [completion]
            model = "gpt-4o-mini"
            max_tokens = 800

            [[sources]]
            title = "Money Matters"
            url = "https://money.substack.com"
            category = "Finance"

            [[sources]]
            title = "Chip Talk"
            url = "https://chips.substack.com"
            category = "Technology"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.request_deadline_secs, 20);
        assert_eq!(config.feed.converter_url, "http://localhost:3000/api/v1/convert");
        assert_eq!(config.feed.timeout_secs, 5);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.completion.max_tokens, 800);
        // Unset keys in a present table still get defaults
        assert_eq!(config.completion.timeout_secs, 30);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].category, "Finance");
        assert_eq!(config.sources[1].title, "Chip Talk");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/digest.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_source_missing_required_fields() {
        let content = r#"
            [[sources]]
            title = "No Url"
            category = "Finance"
        "#;

        let result = Config::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_read_from_named_env_var() {
        let settings = CompletionSettings {
            api_key_env: "NEWSLETTER_DIGEST_TEST_KEY_UNSET".to_string(),
            ..CompletionSettings::default()
        };
        assert!(settings.api_key().is_none());
    }
}
