use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::config::SourceConfig;
use crate::models::{Source, UserPreferences};

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    name: Option<String>,
    interests: Option<String>,
    frequency: Option<String>,
    content_length: Option<String>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                category TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY,
                name TEXT,
                interests TEXT NOT NULL DEFAULT '[]',
                frequency TEXT,
                content_length TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn sync_sources(&self, configs: &[SourceConfig]) -> anyhow::Result<()> {
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO sources (url, title, category)
                VALUES (?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    title = excluded.title,
                    category = excluded.category
                "#,
            )
            .bind(&config.url)
            .bind(&config.title)
            .bind(&config.category)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn upsert_user(&self, email: &str, prefs: &UserPreferences) -> anyhow::Result<()> {
        let interests = serde_json::to_string(&prefs.interests)?;

        sqlx::query(
            r#"
            INSERT INTO users (email, name, interests, frequency, content_length)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                interests = excluded.interests,
                frequency = excluded.frequency,
                content_length = excluded.content_length
            "#,
        )
        .bind(email)
        .bind(&prefs.name)
        .bind(interests)
        .bind(&prefs.frequency)
        .bind(&prefs.content_length)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user_preferences(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<UserPreferences>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT name, interests, frequency, content_length FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let interests = match row.interests.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };

        Ok(Some(UserPreferences {
            name: row.name,
            interests,
            frequency: row.frequency,
            content_length: row.content_length,
        }))
    }

    /// Newest-first sources whose category contains any of `interests`,
    /// ignoring case. With no interests every source is a candidate.
    ///
    /// Matching uses [`Source::matches_interest`] (Unicode case folding);
    /// SQLite's `LOWER` folds ASCII only.
    pub async fn get_candidate_sources(
        &self,
        interests: &[String],
        limit: i64,
    ) -> anyhow::Result<Vec<Source>> {
        let interests: Vec<&str> = interests
            .iter()
            .map(|interest| interest.trim())
            .filter(|interest| !interest.is_empty())
            .collect();
        let limit = usize::try_from(limit).unwrap_or(0);

        let sources = self
            .get_all_sources()
            .await?
            .into_iter()
            .filter(|source| {
                interests.is_empty()
                    || interests.iter().any(|interest| source.matches_interest(interest))
            })
            .take(limit)
            .collect();
        Ok(sources)
    }

    pub async fn get_all_sources(&self) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT id, url, title, category FROM sources ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    pub async fn get_source(&self, source_id: i64) -> anyhow::Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(
            "SELECT id, url, title, category FROM sources WHERE id = ?",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// Returns whether a row was removed.
    pub async fn delete_source(&self, source_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
