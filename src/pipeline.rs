use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::composer::DigestComposer;
use crate::db::Database;
use crate::fetcher::FeedSource;
use crate::models::DigestResponse;
use crate::selection::{SelectionPlanner, CATALOG_LIMIT};

/// Returned instead of an error when the request cannot be served at all.
pub const FALLBACK_DIGEST: &str = "Sorry, we couldn't generate a digest at this time. \
But don't worry, we're always here to help you find great content!";

/// Runs one digest request: preferences, catalog, selection, composition.
pub struct DigestPipeline {
    db: Arc<Database>,
    fetcher: Arc<dyn FeedSource>,
    composer: DigestComposer,
    deadline: Option<Duration>,
}

impl DigestPipeline {
    pub fn new(db: Arc<Database>, fetcher: Arc<dyn FeedSource>, composer: DigestComposer) -> Self {
        Self {
            db,
            fetcher,
            composer,
            deadline: None,
        }
    }

    /// Bounds how long selection may keep visiting candidates.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Builds the digest for `email`. Never fails; storage errors produce
    /// [`FALLBACK_DIGEST`] with no sources.
    pub async fn run(&self, email: &str) -> DigestResponse {
        match self.try_run(email).await {
            Ok(response) => response,
            Err(e) => {
                error!("Digest request for {} failed: {:#}", email, e);
                DigestResponse {
                    newsletters: Vec::new(),
                    digest: FALLBACK_DIGEST.to_string(),
                }
            }
        }
    }

    async fn try_run(&self, email: &str) -> anyhow::Result<DigestResponse> {
        let started = Instant::now();

        let prefs = self.db.get_user_preferences(email).await?.unwrap_or_default();
        let catalog = self
            .db
            .get_candidate_sources(&prefs.interests, CATALOG_LIMIT)
            .await?;
        info!(
            "Building digest for {} with {} interests and {} candidates",
            email,
            prefs.interests.len(),
            catalog.len()
        );

        let mut planner = SelectionPlanner::new(self.fetcher.as_ref());
        if let Some(deadline) = self.deadline {
            planner = planner.with_deadline(started + deadline);
        }
        let newsletters = planner.select(&prefs.interests, &catalog).await;

        let digest = self.composer.compose(&newsletters, &prefs).await;

        info!(
            "Digest for {} ready in {:?} with {} sources",
            email,
            started.elapsed(),
            newsletters.len()
        );

        Ok(DigestResponse {
            newsletters,
            digest,
        })
    }
}
