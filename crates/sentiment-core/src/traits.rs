use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{FetchError, NewsItem, ScoringError, SentimentResult};

/// Source of company news for a ticker over a date range.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Items in provider order, truncated to `limit` when one is given.
    async fn company_news(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<NewsItem>, FetchError>;
}

/// Markup and noise removal applied to provider text before scoring. Never fails.
pub trait TextCleaner: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

/// Sentiment oracle for a single piece of cleaned text.
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<SentimentResult, ScoringError>;

    fn backend_name(&self) -> &'static str;
}
