use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt, TryStreamExt};
use sentiment_analysis::SentimentAggregator;
use sentiment_core::{
    normalize_ticker, AggregateSummary, FetchError, NewsPreview, NewsSource, ReportPeriod,
    ScoringError, SentimentReport, SentimentResult, SentimentScorer, TextCleaner,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Scored items echoed back to the caller; the aggregate always uses all of them.
pub const PREVIEW_LIMIT: usize = 10;
/// Items requested from the news source per query.
pub const DEFAULT_NEWS_LIMIT: usize = 50;
pub const MAX_DAYS: u32 = 30;

/// Scoring calls in flight per request.
const SCORING_CONCURRENCY: usize = 8;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid ticker format: {0:?}")]
    InvalidTicker(String),

    #[error("days must be between 1 and {max}, got {0}", max = MAX_DAYS)]
    InvalidDays(i64),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Sentiment scoring failed: {0}")]
    Scoring(#[from] ScoringError),
}

/// How a failure should be presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The request itself was wrong.
    BadRequest,
    /// The provider could not serve this ticker.
    NotFound,
    /// Anything else; details stay in the logs.
    Internal,
}

impl PipelineError {
    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineError::InvalidTicker(_) | PipelineError::InvalidDays(_) => Disposition::BadRequest,
            PipelineError::Fetch(e) if e.is_ticker_related() => Disposition::NotFound,
            PipelineError::Fetch(_) | PipelineError::Scoring(_) => Disposition::Internal,
        }
    }
}

/// One fetch, clean, score and aggregate pass per query.
pub struct SentimentPipeline {
    news: Arc<dyn NewsSource>,
    cleaner: Arc<dyn TextCleaner>,
    scorer: Arc<dyn SentimentScorer>,
    aggregator: SentimentAggregator,
    news_limit: Option<usize>,
}

impl SentimentPipeline {
    pub fn new(
        news: Arc<dyn NewsSource>,
        cleaner: Arc<dyn TextCleaner>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Self {
        Self {
            news,
            cleaner,
            scorer,
            aggregator: SentimentAggregator::new(),
            news_limit: Some(DEFAULT_NEWS_LIMIT),
        }
    }

    /// `None` takes everything the provider returns.
    pub fn with_news_limit(mut self, limit: Option<usize>) -> Self {
        self.news_limit = limit;
        self
    }

    pub fn scorer_backend(&self) -> &'static str {
        self.scorer.backend_name()
    }

    /// Sentiment for `ticker` over the last `days` days, ending today (UTC).
    pub async fn analyze(&self, ticker: &str, days: i64) -> Result<SentimentReport, PipelineError> {
        self.analyze_as_of(ticker, days, Utc::now().date_naive()).await
    }

    pub async fn analyze_as_of(
        &self,
        raw_ticker: &str,
        days: i64,
        today: NaiveDate,
    ) -> Result<SentimentReport, PipelineError> {
        let ticker = normalize_ticker(raw_ticker)
            .ok_or_else(|| PipelineError::InvalidTicker(raw_ticker.to_string()))?;
        let days = u32::try_from(days)
            .ok()
            .filter(|d| (1..=MAX_DAYS).contains(d))
            .ok_or(PipelineError::InvalidDays(days))?;
        let period = ReportPeriod::ending(today, days);

        let items = self
            .news
            .company_news(&ticker, period.from, period.to, self.news_limit)
            .await?;

        if items.is_empty() {
            tracing::info!("No news for {} between {} and {}", ticker, period.from, period.to);
            return Ok(SentimentReport {
                message: Some(format!("No news found for {} in the last {} days", ticker, days)),
                ticker,
                period,
                sentiment: AggregateSummary::empty(),
                news_items: Vec::new(),
            });
        }

        let texts: Vec<_> = items
            .iter()
            .filter_map(|item| {
                let headline = self.cleaner.clean(item.headline.as_deref().unwrap_or(""));
                let summary = self.cleaner.clean(item.summary.as_deref().unwrap_or(""));
                let text = format!("{} {}", headline, summary).trim().to_string();
                (!text.is_empty()).then(|| (item.datetime.clone(), headline, text))
            })
            .collect();
        let skipped = items.len() - texts.len();

        let jobs: Vec<_> = texts
            .into_iter()
            .map(|(datetime, headline, text)| self.score_item(datetime, headline, text))
            .collect();
        let scored: Vec<(NewsPreview, SentimentResult)> = stream::iter(jobs)
            .buffered(SCORING_CONCURRENCY)
            .try_collect()
            .await?;

        let (mut news_items, results): (Vec<NewsPreview>, Vec<SentimentResult>) =
            scored.into_iter().unzip();
        let sentiment = self.aggregator.aggregate(&results);
        news_items.truncate(PREVIEW_LIMIT);

        tracing::info!(
            "{}: {} items fetched, {} scored ({} skipped empty) -> {} ({:.0}% agreement)",
            ticker,
            items.len(),
            sentiment.item_count,
            skipped,
            sentiment.overall_sentiment,
            sentiment.confidence * 100.0
        );

        Ok(SentimentReport {
            ticker,
            message: None,
            period,
            sentiment,
            news_items,
        })
    }

    async fn score_item(
        &self,
        datetime: Option<Value>,
        headline: String,
        text: String,
    ) -> Result<(NewsPreview, SentimentResult), ScoringError> {
        let result = self.scorer.score(&text).await?;
        let preview = NewsPreview {
            datetime,
            headline,
            sentiment: result.label,
            score: result.score,
        };
        Ok((preview, result))
    }
}
