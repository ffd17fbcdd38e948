use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AI-generated article summary. Summaries are produced by an external
/// summarizer; the store only persists at most one per article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub article_id: i64,
    pub content: String,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}
