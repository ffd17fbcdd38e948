use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, Feed, NewArticle, NewFeed, Summary};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            // Cascades in the schema depend on this pragma; SQLite leaves
            // foreign keys off by default.
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Feed operations

    pub async fn insert_feed(&self, feed: NewFeed) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feeds (title, url, site_url, description) VALUES (?1, ?2, ?3, ?4)",
                    params![feed.title, feed.url, feed.site_url, feed.description],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, url, site_url, description, last_fetched, created_at, updated_at FROM feeds ORDER BY title",
                )?;
                let feeds = stmt
                    .query_map([], |row| Ok(feed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, url, site_url, description, last_fetched, created_at, updated_at FROM feeds WHERE id = ?1",
                )?;
                let feed = stmt
                    .query_row(params![id], |row| Ok(feed_from_row(row)))
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, url, site_url, description, last_fetched, created_at, updated_at FROM feeds WHERE url = ?1",
                )?;
                let feed = stmt
                    .query_row(params![url], |row| Ok(feed_from_row(row)))
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn update_feed_last_fetched(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET last_fetched = datetime('now'), updated_at = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_feed(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Article operations

    /// Insert or update an article by its `(feed_id, guid)` key.
    ///
    /// Returns the stored row's id, or 0 when the key is tombstoned in
    /// `deleted_articles` and ingestion is suppressed. The tombstone check
    /// and the upsert run in one transaction so a racing delete resolves to
    /// one consistent outcome.
    pub async fn upsert_article(&self, article: NewArticle) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let tombstoned: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM deleted_articles WHERE feed_id = ?1 AND guid = ?2)",
                    params![article.feed_id, article.guid],
                    |row| row.get(0),
                )?;
                if tombstoned {
                    return Ok(0);
                }

                let id = tx.query_row(
                    r#"INSERT INTO articles (feed_id, guid, title, url, author, content, content_text, published_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(feed_id, guid) DO UPDATE SET
                           title = excluded.title,
                           url = excluded.url,
                           author = excluded.author,
                           content = excluded.content,
                           content_text = excluded.content_text,
                           published_at = excluded.published_at
                       RETURNING id"#,
                    params![
                        article.feed_id,
                        article.guid,
                        article.title,
                        article.url,
                        article.author,
                        article.content,
                        article.content_text,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                    ],
                    |row| row.get(0),
                )?;

                tx.commit()?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// All articles, newest first. `max_age_days` restricts the result to
    /// articles whose effective age (published date, falling back to fetch
    /// date) is inside the window.
    pub async fn list_articles(&self, max_age_days: Option<u32>) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT a.id, a.feed_id, a.guid, a.title, a.url, a.author, a.content,
                              a.content_text, a.published_at, a.fetched_at,
                              f.title AS feed_title
                       FROM articles a
                       JOIN feeds f ON a.feed_id = f.id
                       WHERE ?1 IS NULL
                          OR datetime(COALESCE(a.published_at, a.fetched_at))
                             >= datetime('now', '-' || ?1 || ' days')
                       ORDER BY a.published_at DESC NULLS LAST, a.fetched_at DESC, a.id DESC"#,
                )?;
                let articles = stmt
                    .query_map(params![max_age_days], |row| Ok(article_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Delete an article and record a tombstone so the next refresh does not
    /// resurrect it. The tombstone write, the dependent-row deletes and the
    /// article delete all commit together or not at all.
    pub async fn delete_article(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO deleted_articles (feed_id, guid)
                     SELECT feed_id, guid FROM articles WHERE id = ?1",
                    params![id],
                )?;
                tx.execute("DELETE FROM summaries WHERE article_id = ?1", params![id])?;
                tx.execute(
                    "DELETE FROM saved_to_raindrop WHERE article_id = ?1",
                    params![id],
                )?;
                tx.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete articles whose effective age exceeds `days`, dependents first.
    /// Returns how many article rows were removed.
    ///
    /// Effective age is measured from `published_at` when present, else from
    /// `fetched_at`. Stored values pass through `datetime()` because
    /// `published_at` is RFC 3339 while `datetime('now', ...)` is not; the
    /// two formats do not compare as raw strings.
    pub async fn delete_old_articles(&self, days: u32) -> Result<usize> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM summaries WHERE article_id IN (
                         SELECT id FROM articles
                         WHERE datetime(COALESCE(published_at, fetched_at))
                               < datetime('now', '-' || ?1 || ' days')
                     )",
                    params![days],
                )?;
                tx.execute(
                    "DELETE FROM saved_to_raindrop WHERE article_id IN (
                         SELECT id FROM articles
                         WHERE datetime(COALESCE(published_at, fetched_at))
                               < datetime('now', '-' || ?1 || ' days')
                     )",
                    params![days],
                )?;
                let deleted = tx.execute(
                    "DELETE FROM articles
                     WHERE datetime(COALESCE(published_at, fetched_at))
                           < datetime('now', '-' || ?1 || ' days')",
                    params![days],
                )?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    /// Retention sweep plus storage reclaim: drop old articles, expire
    /// tombstones past the same window (their keys become ingestable again)
    /// and vacuum. A failed vacuum is logged and swallowed; the sweep has
    /// already committed and its count is still returned.
    pub async fn compact(&self, days: u32) -> Result<usize> {
        let deleted = self.delete_old_articles(days).await?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM deleted_articles
                     WHERE datetime(deleted_at) < datetime('now', '-' || ?1 || ' days')",
                    params![days],
                )?;
                if let Err(e) = conn.execute_batch("VACUUM") {
                    tracing::warn!("vacuum failed, skipping space reclaim: {}", e);
                }
                Ok(())
            })
            .await?;

        Ok(deleted)
    }

    // Summary operations

    pub async fn get_summary(&self, article_id: i64) -> Result<Option<Summary>> {
        let summary = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, article_id, content, model_version, generated_at FROM summaries WHERE article_id = ?1",
                )?;
                let summary = stmt
                    .query_row(params![article_id], |row| Ok(summary_from_row(row)))
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    pub async fn save_summary(&self, article_id: i64, content: String, model: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO summaries (article_id, content, model_version)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(article_id) DO UPDATE SET
                           content = excluded.content,
                           model_version = excluded.model_version,
                           generated_at = datetime('now')"#,
                    params![article_id, content, model],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Raindrop tracking

    pub async fn mark_saved_to_raindrop(
        &self,
        article_id: i64,
        raindrop_id: i64,
        tags: Vec<String>,
    ) -> Result<()> {
        let tags_json = serde_json::to_string(&tags)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO saved_to_raindrop (article_id, raindrop_id, tags) VALUES (?1, ?2, ?3)",
                    params![article_id, raindrop_id, tags_json],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn is_saved_to_raindrop(&self, article_id: i64) -> Result<bool> {
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM saved_to_raindrop WHERE article_id = ?1",
                    params![article_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn feed_from_row(row: &Row) -> Feed {
    Feed {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        site_url: row.get(3).unwrap(),
        description: row.get(4).unwrap(),
        last_fetched: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        created_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn article_from_row(row: &Row) -> Article {
    Article {
        id: row.get(0).unwrap(),
        feed_id: row.get(1).unwrap(),
        guid: row.get(2).unwrap(),
        title: row.get(3).unwrap(),
        url: row.get(4).unwrap(),
        author: row.get(5).unwrap(),
        content: row.get(6).unwrap(),
        content_text: row.get(7).unwrap(),
        published_at: row
            .get::<_, Option<String>>(8)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        fetched_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        feed_title: row.get(10).unwrap(),
    }
}

fn summary_from_row(row: &Row) -> Summary {
    Summary {
        id: row.get(0).unwrap(),
        article_id: row.get(1).unwrap(),
        content: row.get(2).unwrap(),
        model_version: row.get(3).unwrap(),
        generated_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}
