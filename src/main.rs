use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsletter_digest::completion::CompletionClient;
use newsletter_digest::composer::DigestComposer;
use newsletter_digest::config::Config;
use newsletter_digest::converter::FeedConverter;
use newsletter_digest::db::Database;
use newsletter_digest::fetcher::Fetcher;
use newsletter_digest::pipeline::DigestPipeline;
use newsletter_digest::pruner::SourcePruner;
use newsletter_digest::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsletter_digest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("DIGEST_CONFIG").unwrap_or_else(|_| "digest.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded configuration from {} ({} seed sources)",
        config_path,
        config.sources.len()
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:newsletter_digest.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    db.sync_sources(&config.sources).await?;
    info!("Database initialized");

    let db = Arc::new(db);

    // Feed side: pruner, fetcher, and the self-hosted converter
    let pruner = Arc::new(SourcePruner::new(db.clone()));
    let fetcher = Arc::new(Fetcher::new(&config.feed, pruner.clone())?);
    let converter = Arc::new(FeedConverter::new(
        Duration::from_secs(config.feed.timeout_secs),
        &config.feed.user_agent,
    )?);

    // Digest side
    let api_key = config.completion.api_key();
    if api_key.is_none() {
        info!(
            "{} is not set, digests will use the template",
            config.completion.api_key_env
        );
    }
    let completion = Arc::new(CompletionClient::new(&config.completion, api_key)?);
    let composer = DigestComposer::new(completion);

    let pipeline = DigestPipeline::new(db.clone(), fetcher, composer.clone())
        .with_deadline(Duration::from_secs(config.request_deadline_secs));

    let state = Arc::new(AppState {
        db: db.clone(),
        pipeline: Arc::new(pipeline),
        composer: Arc::new(composer),
        converter,
    });

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    // Let in-flight prunes land before exiting
    pruner.settle().await;

    Ok(())
}
