use std::path::Path;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{export_opml_file, parse_opml_file, FeedFetcher};
use crate::models::{Article, Feed};
use crate::services::RaindropClient;

/// Application state: the feed and article snapshots plus the services that
/// maintain them. One instance owns everything; consumers borrow from it and
/// reload explicitly after mutations.
pub struct App {
    pub config: Config,
    pub feeds: Vec<Feed>,
    pub articles: Vec<Article>,
    pub repository: Repository,
    fetcher: FeedFetcher,
    raindrop: Option<RaindropClient>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        // Startup retention sweep keeps the working set inside the window
        let removed = repository
            .delete_old_articles(config.article_retention_days)
            .await?;
        if removed > 0 {
            tracing::info!(
                "Removed {} articles older than {} days",
                removed,
                config.article_retention_days
            );
        }

        let raindrop = config
            .raindrop_token
            .as_ref()
            .map(|token| RaindropClient::new(token.clone()));

        let feeds = repository.get_all_feeds().await?;
        let articles = repository
            .list_articles(Some(config.article_retention_days))
            .await?;

        Ok(Self {
            config,
            feeds,
            articles,
            repository,
            fetcher: FeedFetcher::new(),
            raindrop,
        })
    }

    /// Exit hook: compact the store (retention sweep, tombstone expiry,
    /// space reclaim).
    pub async fn close(&self) -> Result<()> {
        self.repository
            .compact(self.config.article_retention_days)
            .await?;
        Ok(())
    }

    /// Run one refresh cycle over every subscribed feed and return how many
    /// candidates were actually stored or changed (tombstoned keys count for
    /// nothing). Feeds whose fetch failed are absent from the scheduler's
    /// results and keep their previous last_fetched.
    pub async fn refresh_feeds(&mut self, per_feed_limit: Option<usize>) -> Result<usize> {
        let feeds = self.feeds.clone();
        let results = self.fetcher.refresh_all(feeds, per_feed_limit).await;

        let mut new_count = 0;
        for (feed_id, articles) in results {
            for article in articles {
                if self.repository.upsert_article(article).await? > 0 {
                    new_count += 1;
                }
            }
            self.repository.update_feed_last_fetched(feed_id).await?;
        }

        self.reload_articles().await?;
        Ok(new_count)
    }

    /// Discover the feed behind `url`, subscribe to it and run its first
    /// fetch. Returns the new feed's id.
    pub async fn add_feed(&mut self, url: &str) -> Result<i64> {
        let new_feed = self.fetcher.discover_feed(url).await?;
        let feed_url = new_feed.url.clone();
        let feed_id = self.repository.insert_feed(new_feed).await?;

        // Populate the new subscription right away; a failed first fetch
        // leaves an empty feed for the next cycle to fill
        match self.fetcher.fetch_feed(feed_id, &feed_url).await {
            Ok(articles) => {
                for article in articles {
                    self.repository.upsert_article(article).await?;
                }
                self.repository.update_feed_last_fetched(feed_id).await?;
            }
            Err(e) => tracing::warn!("Initial fetch of {} failed: {}", feed_url, e),
        }

        self.feeds = self.repository.get_all_feeds().await?;
        self.reload_articles().await?;
        Ok(feed_id)
    }

    /// Import feeds from an OPML file, skipping URLs already subscribed.
    /// Returns the number of feeds added.
    pub async fn import_opml(&mut self, path: &Path) -> Result<usize> {
        let candidates = parse_opml_file(path)?;

        let mut added = 0;
        for feed in candidates {
            if self.repository.get_feed_by_url(&feed.url).await?.is_some() {
                tracing::debug!("Skipping existing feed: {}", feed.url);
                continue;
            }
            let title = feed.title.clone();
            match self.repository.insert_feed(feed).await {
                Ok(_) => added += 1,
                Err(e) => tracing::warn!("Failed to add {}: {}", title, e),
            }
        }

        self.feeds = self.repository.get_all_feeds().await?;
        Ok(added)
    }

    pub async fn export_opml(&self, path: &Path) -> Result<()> {
        export_opml_file(path, &self.feeds)
    }

    /// Delete an article; the store records a tombstone so the next refresh
    /// does not bring it back.
    pub async fn delete_article(&mut self, id: i64) -> Result<()> {
        self.repository.delete_article(id).await?;
        self.reload_articles().await
    }

    /// Unsubscribe a feed; its articles and tombstones go with it.
    pub async fn delete_feed(&mut self, id: i64) -> Result<()> {
        self.repository.delete_feed(id).await?;
        self.feeds = self.repository.get_all_feeds().await?;
        self.reload_articles().await
    }

    /// Push an article to Raindrop.io and record the bookmark locally.
    pub async fn save_to_raindrop(&self, article: &Article, tags: Vec<String>) -> Result<i64> {
        let Some(raindrop) = &self.raindrop else {
            return Err(AppError::RaindropApi(
                "no raindrop_token configured".to_string(),
            ));
        };

        let tags = if tags.is_empty() {
            self.config.default_tags.clone()
        } else {
            tags
        };

        // An existing summary rides along as the bookmark note
        let note = self
            .repository
            .get_summary(article.id)
            .await?
            .map(|s| s.content);
        let excerpt = article
            .content_text
            .as_ref()
            .map(|t| t.chars().take(500).collect::<String>());

        let raindrop_id = raindrop
            .save_bookmark(
                &article.url,
                Some(&article.title),
                excerpt.as_deref(),
                note.as_deref(),
                tags.clone(),
            )
            .await?;

        self.repository
            .mark_saved_to_raindrop(article.id, raindrop_id, tags)
            .await?;
        tracing::info!("Saved to Raindrop: {}", article.url);
        Ok(raindrop_id)
    }

    pub fn get_article_by_id(&self, id: i64) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub async fn reload_articles(&mut self) -> Result<()> {
        self.articles = self
            .repository
            .list_articles(Some(self.config.article_retention_days))
            .await?;
        Ok(())
    }
}
