use std::path::PathBuf;

use feedkeeper::{App, AppError, Config, Result};

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Vec<String>) -> Result<()> {
    let config = Config::load()?;

    match args.first().map(String::as_str) {
        Some("--refresh") => {
            let mut app = App::new(config.clone()).await?;
            let count = app.refresh_feeds(config.articles_per_feed).await?;
            println!("Refreshed {} feeds, {} new articles", app.feeds.len(), count);
            app.close().await?;
        }

        Some("--import") if args.len() >= 2 => {
            let path = PathBuf::from(&args[1]);
            let mut app = App::new(config).await?;
            let added = app.import_opml(&path).await?;
            println!("Imported {} new feeds from {}", added, path.display());
            app.close().await?;
        }

        Some("--export") if args.len() >= 2 => {
            let path = PathBuf::from(&args[1]);
            let app = App::new(config).await?;
            app.export_opml(&path).await?;
            println!("Exported {} feeds to {}", app.feeds.len(), path.display());
            app.close().await?;
        }

        Some("--add-feed") if args.len() >= 2 => {
            let mut app = App::new(config).await?;
            let feed_id = app.add_feed(&args[1]).await?;
            if let Some(feed) = app.feeds.iter().find(|f| f.id == feed_id) {
                println!("Added feed: {}", feed.title);
            }
            app.close().await?;
        }

        Some("--list-feeds") => {
            let app = App::new(config).await?;
            println!("Feeds ({}):", app.feeds.len());
            for feed in &app.feeds {
                println!("  [{}] {}", feed.id, feed.title);
                println!("      URL: {}", feed.url);
            }
            app.close().await?;
        }

        Some("--list-articles") => {
            let limit: usize = args
                .get(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or(10);
            let app = App::new(config).await?;
            println!("Recent articles (showing up to {}):", limit);
            for article in app.articles.iter().take(limit) {
                println!();
                println!("  [{}] {}", article.id, article.title);
                println!("      Feed: {}", article.feed_title);
                println!("      URL: {}", article.url);
                if let Some(published) = article.published_at {
                    println!("      Published: {}", published);
                }
            }
            app.close().await?;
        }

        Some("--delete-article") if args.len() >= 2 => {
            let id: i64 = args[1]
                .parse()
                .map_err(|_| AppError::Config(format!("invalid article id: {}", args[1])))?;
            let mut app = App::new(config).await?;
            app.delete_article(id).await?;
            println!("Deleted article {}", id);
            app.close().await?;
        }

        Some("--delete-feed") if args.len() >= 2 => {
            let id: i64 = args[1]
                .parse()
                .map_err(|_| AppError::Config(format!("invalid feed id: {}", args[1])))?;
            let mut app = App::new(config).await?;
            app.delete_feed(id).await?;
            println!("Deleted feed {}", id);
            app.close().await?;
        }

        Some("--save") if args.len() >= 2 => {
            let id: i64 = args[1]
                .parse()
                .map_err(|_| AppError::Config(format!("invalid article id: {}", args[1])))?;
            let tags: Vec<String> = args
                .get(2)
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default();

            let app = App::new(config).await?;
            match app.get_article_by_id(id) {
                Some(article) => {
                    let raindrop_id = app.save_to_raindrop(article, tags).await?;
                    println!("Saved to Raindrop with id {}", raindrop_id);
                }
                None => println!("Article {} not found", id),
            }
            app.close().await?;
        }

        Some("--compact") => {
            let app = App::new(config.clone()).await?;
            let removed = app
                .repository
                .compact(config.article_retention_days)
                .await?;
            println!(
                "Compacted database, removed {} articles older than {} days",
                removed, config.article_retention_days
            );
        }

        _ => print_help(),
    }

    Ok(())
}

fn print_help() {
    println!(
        "feedkeeper - RSS/Atom feed ingester

Usage:
  feedkeeper [COMMAND] [ARGS]

Commands:
  --refresh                      Refresh all feeds
  --import <opml_file>           Import feeds from an OPML file
  --export <opml_file>           Export feeds to an OPML file
  --add-feed <url>               Discover and add a feed by URL
  --list-feeds                   List all feeds
  --list-articles [limit]        List recent articles (default: 10)
  --delete-article <id>          Delete an article (it will not be re-added)
  --delete-feed <id>             Unsubscribe a feed and drop its articles
  --save <id> [tags]             Save an article to Raindrop.io (comma-separated tags)
  --compact                      Prune old articles and reclaim space

Configuration:
  Edit ~/.config/feedkeeper/config.toml

  Optional for Raindrop.io integration:
    raindrop_token = \"...\"
"
    );
}
