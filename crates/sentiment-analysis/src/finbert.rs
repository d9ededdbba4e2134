use async_trait::async_trait;
use ml_client::{MLError, SentimentClient, SentimentPrediction};
use sentiment_core::{ScoringError, SentimentLabel, SentimentResult, SentimentScorer};
use std::collections::BTreeMap;

use crate::model_window;

/// Scores text with the FinBERT inference service.
#[derive(Clone)]
pub struct FinBertScorer {
    client: SentimentClient,
}

impl FinBertScorer {
    pub fn new(client: SentimentClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SentimentScorer for FinBertScorer {
    async fn score(&self, text: &str) -> Result<SentimentResult, ScoringError> {
        let text = model_window(text);
        if text.trim().is_empty() {
            return Ok(SentimentResult::neutral_default());
        }

        let response = self
            .client
            .predict(vec![text.to_string()])
            .await
            .map_err(|e| {
                tracing::warn!("FinBERT request to {} failed: {}", self.client.base_url(), e);
                match e {
                    MLError::InvalidResponse(msg) => ScoringError::InvalidResponse(msg),
                    other => ScoringError::Unavailable(other.to_string()),
                }
            })?;

        let prediction = response
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| ScoringError::InvalidResponse("empty prediction batch".to_string()))?;

        to_result(prediction)
    }

    fn backend_name(&self) -> &'static str {
        "finbert"
    }
}

fn to_result(prediction: SentimentPrediction) -> Result<SentimentResult, ScoringError> {
    let label = SentimentLabel::parse(&prediction.label).ok_or_else(|| {
        ScoringError::InvalidResponse(format!("unknown label '{}'", prediction.label))
    })?;

    let scores = BTreeMap::from([
        (SentimentLabel::Positive, prediction.positive),
        (SentimentLabel::Neutral, prediction.neutral),
        (SentimentLabel::Negative, prediction.negative),
    ]);
    let score = scores.get(&label).copied().unwrap_or(prediction.confidence);

    Ok(SentimentResult::with_scores(label, score, scores))
}
