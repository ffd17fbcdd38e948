use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status: {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("failed to parse feed: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("could not find an RSS/Atom feed at {0}")]
    Discovery(String),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("failed to parse OPML: {0}")]
    OpmlParse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Raindrop API error: {0}")]
    RaindropApi(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
