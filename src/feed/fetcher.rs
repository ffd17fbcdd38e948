use std::time::Duration;

use feed_rs::parser;
use regex::Regex;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::feed::scheduler;
use crate::models::{Feed, NewArticle, NewFeed};

const USER_AGENT: &str = "feedkeeper/0.1";

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetch one feed and parse its items into article candidates.
    pub async fn fetch_feed(&self, feed_id: i64, url: &str) -> Result<Vec<NewArticle>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus(response.status()));
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| entry_to_article(feed_id, entry))
            .collect())
    }

    /// Refresh all feeds concurrently with rate limiting. Failed feeds are
    /// dropped from the result set; see `scheduler::refresh_all`.
    pub async fn refresh_all(
        &self,
        feeds: Vec<Feed>,
        per_feed_limit: Option<usize>,
    ) -> Vec<(i64, Vec<NewArticle>)> {
        scheduler::refresh_all(feeds, per_feed_limit, |feed| {
            let url = feed.url.clone();
            let feed_id = feed.id;
            async move { self.fetch_feed(feed_id, &url).await }
        })
        .await
    }

    /// Discover and create a feed from a URL.
    /// If the URL is a direct RSS/Atom feed, parse it directly.
    /// If it's an HTML page, look for feed links in <link> tags.
    pub async fn discover_feed(&self, url: &str) -> Result<NewFeed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus(response.status()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = response.bytes().await?;

        // Try parsing as RSS/Atom feed first
        if let Ok(feed) = parser::parse(&bytes[..]) {
            return Ok(feed_meta(feed, final_url));
        }

        // If content looks like HTML, search for feed links
        if content_type.contains("html") || bytes.starts_with(b"<!") || bytes.starts_with(b"<html") {
            let html = String::from_utf8_lossy(&bytes);
            if let Some(feed_url) = find_feed_link(&html, &final_url) {
                // Fetch the discovered feed URL
                let feed_response = self.client.get(&feed_url).send().await?;
                if feed_response.status().is_success() {
                    let feed_bytes = feed_response.bytes().await?;
                    if let Ok(feed) = parser::parse(&feed_bytes[..]) {
                        return Ok(feed_meta(feed, feed_url));
                    }
                }
            }
        }

        Err(AppError::Discovery(url.to_string()))
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a parsed entry to an article candidate.
///
/// The natural key `guid` must never be empty: the entry id wins, then the
/// item link, then the title as a last resort.
fn entry_to_article(feed_id: i64, entry: feed_rs::model::Entry) -> NewArticle {
    // Try content first, then fall back to summary
    let content_html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_ref())
        .or_else(|| entry.summary.as_ref().map(|s| &s.content));

    // Best-effort plain text; a failed derivation just leaves the field empty
    let content_text = content_html.and_then(|html| {
        html2text::from_read(html.as_bytes(), 80).ok()
    });

    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let guid = if !entry.id.is_empty() {
        entry.id
    } else if !url.is_empty() {
        url.clone()
    } else {
        title.clone()
    };

    NewArticle {
        feed_id,
        guid,
        title,
        url,
        author: entry.authors.first().map(|a| a.name.clone()),
        content: content_html.cloned(),
        content_text,
        published_at: entry.published.or(entry.updated),
    }
}

fn feed_meta(feed: feed_rs::model::Feed, url: String) -> NewFeed {
    NewFeed {
        title: feed
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled Feed".to_string()),
        url,
        site_url: feed.links.first().map(|l| l.href.clone()),
        description: feed.description.map(|d| d.content),
    }
}

/// Search HTML for RSS/Atom feed links
fn find_feed_link(html: &str, base_url: &str) -> Option<String> {
    // Look for <link rel="alternate" type="application/rss+xml" href="...">
    // or <link rel="alternate" type="application/atom+xml" href="...">
    let link_re = Regex::new(
        r#"(?i)<link[^>]*rel=["']alternate["'][^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#
    ).ok()?;

    // Also try reverse order (type before rel)
    let link_re2 = Regex::new(
        r#"(?i)<link[^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#
    ).ok()?;

    let href = link_re
        .captures(html)
        .or_else(|| link_re2.captures(html))
        .and_then(|cap: regex::Captures| cap.get(2))
        .map(|m: regex::Match| m.as_str().to_string())?;

    // Resolve relative URLs
    Some(resolve_url(&href, base_url))
}

/// Resolve a potentially relative URL against a base URL
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_string()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const RSS_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Feed</title>
    <link>https://example.com</link>
    <description>Example description</description>
    <item>
      <guid>tag:example.com,2026:post-1</guid>
      <title>First post</title>
      <link>https://example.com/post-1</link>
      <pubDate>Mon, 03 Aug 2026 09:00:00 GMT</pubDate>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
    </item>
    <item>
      <title>Link only</title>
      <link>https://example.com/post-2</link>
    </item>
  </channel>
</rss>"#;

    const ATOM_FIXTURE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <link href="https://example.com/"/>
  <updated>2026-08-01T12:00:00Z</updated>
  <entry>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <title>Updated only</title>
    <link href="https://example.com/atom-1"/>
    <updated>2026-08-01T12:00:00Z</updated>
  </entry>
</feed>"#;

    fn parse_fixture(xml: &str) -> Vec<NewArticle> {
        let feed = parser::parse(xml.as_bytes()).unwrap();
        feed.entries
            .into_iter()
            .map(|entry| entry_to_article(7, entry))
            .collect()
    }

    #[test]
    fn entry_normalization_keeps_guid_and_derives_text() {
        let articles = parse_fixture(RSS_FIXTURE);
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.feed_id, 7);
        assert_eq!(first.guid, "tag:example.com,2026:post-1");
        assert_eq!(first.title, "First post");
        assert_eq!(first.url, "https://example.com/post-1");
        assert!(first.published_at.is_some());
        let text = first.content_text.as_deref().unwrap();
        assert!(text.contains("Hello"));

        // No guid in the item: the link is the fallback key
        let second = &articles[1];
        assert!(!second.guid.is_empty());
    }

    #[test]
    fn entry_without_published_uses_updated() {
        let articles = parse_fixture(ATOM_FIXTURE);
        assert_eq!(articles.len(), 1);
        assert!(articles[0].published_at.is_some());
    }

    #[test]
    fn feed_link_found_in_either_attribute_order() {
        let page = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
        </head></html>"#;
        assert_eq!(
            find_feed_link(page, "https://example.com/blog"),
            Some("https://example.com/feed.xml".to_string())
        );

        let reversed = r#"<html><head>
            <link type="application/atom+xml" rel="alternate" href="https://example.com/atom.xml">
        </head></html>"#;
        assert_eq!(
            find_feed_link(reversed, "https://example.com/"),
            Some("https://example.com/atom.xml".to_string())
        );

        assert_eq!(find_feed_link("<html><head></head></html>", "https://example.com/"), None);
    }

    #[test]
    fn relative_hrefs_resolve_against_base() {
        assert_eq!(
            resolve_url("/feed.xml", "https://example.com/blog/index.html"),
            "https://example.com/feed.xml"
        );
        assert_eq!(
            resolve_url("feed.xml", "https://example.com/blog/"),
            "https://example.com/blog/feed.xml"
        );
        assert_eq!(
            resolve_url("https://other.example/feed.xml", "https://example.com/"),
            "https://other.example/feed.xml"
        );
    }

    #[tokio::test]
    async fn fetch_feed_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new();
        let result = fetcher
            .fetch_feed(1, &format!("{}/feed.xml", server.uri()))
            .await;
        assert!(matches!(result, Err(AppError::HttpStatus(_))));
    }

    #[tokio::test]
    async fn fetch_feed_rejects_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new();
        let result = fetcher
            .fetch_feed(1, &format!("{}/feed.xml", server.uri()))
            .await;
        assert!(matches!(result, Err(AppError::FeedParse(_))));
    }

    #[tokio::test]
    async fn discover_parses_direct_feed_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string(RSS_FIXTURE),
            )
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new();
        let feed = fetcher
            .discover_feed(&format!("{}/feed.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(feed.title, "Example Feed");
        assert_eq!(feed.url, format!("{}/feed.xml", server.uri()));
        assert_eq!(feed.description.as_deref(), Some("Example description"));
    }

    #[tokio::test]
    async fn discover_follows_link_tag_from_html_page() {
        let server = MockServer::start().await;
        let page = r#"<!DOCTYPE html><html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
        </head><body>blog</body></html>"#;
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(page),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string(RSS_FIXTURE),
            )
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new();
        let feed = fetcher
            .discover_feed(&format!("{}/blog", server.uri()))
            .await
            .unwrap();
        assert_eq!(feed.title, "Example Feed");
        assert_eq!(feed.url, format!("{}/feed.xml", server.uri()));
    }

    #[tokio::test]
    async fn discover_fails_on_page_without_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nothing"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<!DOCTYPE html><html><head></head><body>no feed here</body></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new();
        let result = fetcher
            .discover_feed(&format!("{}/nothing", server.uri()))
            .await;
        assert!(matches!(result, Err(AppError::Discovery(_))));
    }
}
