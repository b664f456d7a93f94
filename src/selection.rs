use std::collections::HashSet;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::fetcher::FeedSource;
use crate::models::{NormalizedFeed, SelectedSource, Source};

/// Most sources a digest draws from.
pub const MAX_SOURCES: usize = 5;
/// Most articles kept per source.
pub const ARTICLES_PER_SOURCE: usize = 5;
/// Most catalog rows considered per request.
pub const CATALOG_LIMIT: i64 = 15;

/// Chooses which sources feed a digest.
///
/// Interests are honored in declared order during the primary pass, where at
/// most one source per category is accepted. A backfill pass then tops the
/// result up from the whole catalog. Each source is fetched at most once per
/// plan; failed sources stay excluded.
pub struct SelectionPlanner<'a, F: FeedSource + ?Sized> {
    fetcher: &'a F,
    deadline: Option<Instant>,
}

struct Plan {
    accepted: Vec<SelectedSource>,
    failed: HashSet<i64>,
}

impl Plan {
    fn is_full(&self) -> bool {
        self.accepted.len() >= MAX_SOURCES
    }

    fn has_id(&self, id: i64) -> bool {
        self.accepted.iter().any(|s| s.id == id)
    }

    fn has_category(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        self.accepted
            .iter()
            .any(|s| s.category.to_lowercase() == category)
    }
}

impl<'a, F: FeedSource + ?Sized> SelectionPlanner<'a, F> {
    pub fn new(fetcher: &'a F) -> Self {
        Self {
            fetcher,
            deadline: None,
        }
    }

    /// Stop visiting further candidates once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub async fn select(&self, interests: &[String], catalog: &[Source]) -> Vec<SelectedSource> {
        let mut plan = Plan {
            accepted: Vec::new(),
            failed: HashSet::new(),
        };

        'interests: for interest in interests {
            for source in catalog.iter().filter(|s| s.matches_interest(interest)) {
                if plan.is_full() || self.past_deadline() {
                    break 'interests;
                }
                if plan.has_id(source.id)
                    || plan.failed.contains(&source.id)
                    || plan.has_category(&source.category)
                {
                    continue;
                }
                self.visit(source, &mut plan).await;
            }
        }

        let primary = plan.accepted.len();

        if !plan.is_full() {
            for source in catalog {
                if plan.is_full() || self.past_deadline() {
                    break;
                }
                if plan.has_id(source.id) || plan.failed.contains(&source.id) {
                    continue;
                }
                self.visit(source, &mut plan).await;
            }
        }

        info!(
            "Selected {} sources ({} by interest, {} backfilled, {} unviable)",
            plan.accepted.len(),
            primary,
            plan.accepted.len() - primary,
            plan.failed.len()
        );

        plan.accepted
    }

    async fn visit(&self, source: &Source, plan: &mut Plan) {
        match self.fetcher.fetch_feed(&source.url, source.id).await {
            Some(feed) => plan.accepted.push(Self::selected(source, feed)),
            None => {
                plan.failed.insert(source.id);
            }
        }
    }

    fn past_deadline(&self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!("Selection deadline reached, skipping remaining candidates");
                true
            }
            _ => false,
        }
    }

    fn selected(source: &Source, feed: NormalizedFeed) -> SelectedSource {
        let title = if feed.feed_title.trim().is_empty() {
            source.title.clone()
        } else {
            feed.feed_title
        };

        let mut articles = feed.articles;
        articles.truncate(ARTICLES_PER_SOURCE);

        SelectedSource {
            id: source.id,
            title,
            url: source.url.clone(),
            category: source.category.clone(),
            articles,
            last_build_date: feed.last_build_date,
            feed_image: feed.feed_image,
        }
    }
}
