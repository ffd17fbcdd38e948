use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Feed, NewArticle};

/// Upper bound on feeds fetched in parallel during one refresh cycle.
pub const MAX_CONCURRENT_FETCHES: usize = 5;

/// Fan out one fetch per feed, never more than `MAX_CONCURRENT_FETCHES` in
/// flight at once, and collect the per-feed results.
///
/// A feed whose fetch fails is logged and dropped from the result set; the
/// batch itself never fails. With `per_feed_limit` set, only the first N
/// items of each feed (the feed's own newest-first convention) are kept.
/// Results arrive in completion order, not input order.
///
/// Generic over the fetch operation so callers can plug in the HTTP adapter
/// or an instrumented stand-in.
pub async fn refresh_all<F, Fut>(
    feeds: Vec<Feed>,
    per_feed_limit: Option<usize>,
    fetch: F,
) -> Vec<(i64, Vec<NewArticle>)>
where
    F: Fn(&Feed) -> Fut,
    Fut: Future<Output = Result<Vec<NewArticle>>>,
{
    stream::iter(feeds)
        .map(|feed| {
            let fut = fetch(&feed);
            async move {
                match fut.await {
                    Ok(mut articles) => {
                        if let Some(limit) = per_feed_limit {
                            articles.truncate(limit);
                        }
                        tracing::debug!("Fetched {} articles from {}", articles.len(), feed.title);
                        Some((feed.id, articles))
                    }
                    Err(e) => {
                        tracing::warn!("Failed to fetch {}: {}", feed.url, e);
                        None
                    }
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .filter_map(|r| async { r })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::error::AppError;

    fn feed(id: i64) -> Feed {
        Feed {
            id,
            title: format!("Feed {}", id),
            url: format!("https://example.com/{}/feed.xml", id),
            site_url: None,
            description: None,
            last_fetched: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(feed_id: i64, n: usize) -> NewArticle {
        NewArticle {
            feed_id,
            guid: format!("{}-{}", feed_id, n),
            title: format!("Item {}", n),
            url: format!("https://example.com/{}/{}", feed_id, n),
            author: None,
            content: None,
            content_text: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn never_more_than_cap_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let feeds: Vec<Feed> = (1..=20).map(feed).collect();

        let results = refresh_all(feeds, None, |f| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let feed_id = f.id;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(vec![item(feed_id, 0)])
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= MAX_CONCURRENT_FETCHES, "peak was {}", peak);
        assert!(peak > 1, "fetches did not overlap at all");
    }

    #[tokio::test]
    async fn one_failing_feed_does_not_abort_the_batch() {
        let feeds: Vec<Feed> = (1..=3).map(feed).collect();

        let results = refresh_all(feeds, None, |f| {
            let feed_id = f.id;
            async move {
                if feed_id == 2 {
                    return Err(AppError::HttpStatus(
                        reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    ));
                }
                Ok(vec![item(feed_id, 0)])
            }
        })
        .await;

        let mut ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn per_feed_limit_keeps_the_first_items() {
        let results = refresh_all(vec![feed(1)], Some(3), |f| {
            let feed_id = f.id;
            async move { Ok((0..10).map(|n| item(feed_id, n)).collect()) }
        })
        .await;

        assert_eq!(results.len(), 1);
        let (_, articles) = &results[0];
        assert_eq!(articles.len(), 3);
        // Truncation keeps the head of the adapter's newest-first sequence
        assert_eq!(articles[0].guid, "1-0");
        assert_eq!(articles[2].guid, "1-2");
    }

    #[tokio::test]
    async fn empty_input_yields_empty_result() {
        let results = refresh_all(vec![], None, |f| {
            let feed_id = f.id;
            async move { Ok(vec![item(feed_id, 0)]) }
        })
        .await;
        assert!(results.is_empty());
    }
}
