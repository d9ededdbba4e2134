use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of labels the scoring oracle may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Case-insensitive parse of a label name as returned by model backends.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(SentimentLabel::Positive),
            "neutral" => Some(SentimentLabel::Neutral),
            "negative" => Some(SentimentLabel::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw company-news record as returned by the provider.
///
/// Only the fields the pipeline reads are typed; everything else the provider
/// sends is kept verbatim in `extra`. Typed fields never reject a record: text
/// fields take any scalar, and `datetime` is passed through as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default, rename = "related", deserialize_with = "lenient_text")]
    pub symbol: Option<String>,
    /// Publish time, normally UNIX seconds.
    #[serde(default)]
    pub datetime: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub headline: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Strings as-is, numbers and booleans in their JSON form, anything else absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    })
}

/// Output of the scoring oracle for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    /// Confidence for `label`, in [0, 1].
    pub score: f64,
    /// Full per-label distribution when the backend reports one.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<SentimentLabel, f64>,
}

impl SentimentResult {
    pub fn new(label: SentimentLabel, score: f64) -> Self {
        Self {
            label,
            score,
            scores: BTreeMap::new(),
        }
    }

    pub fn with_scores(label: SentimentLabel, score: f64, scores: BTreeMap<SentimentLabel, f64>) -> Self {
        Self { label, score, scores }
    }

    /// What a backend returns for empty text.
    pub fn neutral_default() -> Self {
        Self::new(SentimentLabel::Neutral, 0.0)
    }

    /// Score this result reports for `label`, if any.
    ///
    /// Results without a per-label map only report their own label.
    pub fn score_for(&self, label: SentimentLabel) -> Option<f64> {
        if self.scores.is_empty() {
            (self.label == label).then_some(self.score)
        } else {
            self.scores.get(&label).copied()
        }
    }
}

/// Consensus over a set of per-item results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub overall_sentiment: SentimentLabel,
    pub confidence: f64,
    pub distribution: BTreeMap<SentimentLabel, f64>,
    pub average_scores: BTreeMap<SentimentLabel, f64>,
    pub item_count: usize,
}

impl AggregateSummary {
    /// Summary reported when nothing was scored.
    pub fn empty() -> Self {
        Self {
            overall_sentiment: SentimentLabel::Neutral,
            confidence: 0.0,
            distribution: BTreeMap::new(),
            average_scores: SentimentLabel::ALL.iter().map(|l| (*l, 0.0)).collect(),
            item_count: 0,
        }
    }
}

impl Default for AggregateSummary {
    fn default() -> Self {
        Self::empty()
    }
}

/// Inclusive calendar window a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ReportPeriod {
    /// Window of `days` days ending on `today`.
    pub fn ending(today: NaiveDate, days: u32) -> Self {
        Self {
            from: today - Duration::days(i64::from(days)),
            to: today,
        }
    }
}

/// One scored item as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsPreview {
    pub datetime: Option<serde_json::Value>,
    pub headline: String,
    pub sentiment: SentimentLabel,
    pub score: f64,
}

/// Response body of a sentiment query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub period: ReportPeriod,
    pub sentiment: AggregateSummary,
    pub news_items: Vec<NewsPreview>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_summary_has_all_average_keys() {
        let summary = AggregateSummary::empty();
        assert_eq!(summary.overall_sentiment, SentimentLabel::Neutral);
        assert!(summary.distribution.is_empty());
        assert_eq!(summary.average_scores.len(), 3);
        assert!(summary.average_scores.values().all(|v| *v == 0.0));

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value,
            json!({
                "overall_sentiment": "neutral",
                "confidence": 0.0,
                "distribution": {},
                "average_scores": {"positive": 0.0, "neutral": 0.0, "negative": 0.0},
                "item_count": 0
            })
        );
    }

    #[test]
    fn test_news_item_keeps_unknown_fields() {
        let item: NewsItem = serde_json::from_value(json!({
            "category": "company",
            "datetime": 1700000000,
            "headline": "Apple beats",
            "id": 42,
            "related": "AAPL",
            "source": "Reuters",
            "summary": "Record quarter",
            "url": "https://example.com/a"
        }))
        .unwrap();

        assert_eq!(item.symbol.as_deref(), Some("AAPL"));
        assert_eq!(item.datetime, Some(json!(1700000000)));
        assert_eq!(item.extra.get("source"), Some(&json!("Reuters")));
        assert_eq!(item.extra.len(), 4);
    }

    #[test]
    fn test_news_item_tolerates_nulls_and_gaps() {
        let item: NewsItem = serde_json::from_value(json!({"headline": null})).unwrap();
        assert!(item.headline.is_none());
        assert!(item.summary.is_none());
        assert!(item.datetime.is_none());
    }

    #[test]
    fn test_news_item_accepts_odd_field_types() {
        let item: NewsItem = serde_json::from_value(json!({
            "datetime": 1709800000.5,
            "headline": 12345,
            "summary": ["not", "text"],
            "related": true
        }))
        .unwrap();

        assert_eq!(item.datetime, Some(json!(1709800000.5)));
        assert_eq!(item.headline.as_deref(), Some("12345"));
        assert!(item.summary.is_none());
        assert_eq!(item.symbol.as_deref(), Some("true"));
        assert!(item.extra.is_empty());
    }

    #[test]
    fn test_score_for_without_distribution() {
        let result = SentimentResult::new(SentimentLabel::Negative, 0.8);
        assert_eq!(result.score_for(SentimentLabel::Negative), Some(0.8));
        assert_eq!(result.score_for(SentimentLabel::Positive), None);
    }

    #[test]
    fn test_score_for_with_distribution() {
        let scores = BTreeMap::from([
            (SentimentLabel::Positive, 0.7),
            (SentimentLabel::Neutral, 0.2),
            (SentimentLabel::Negative, 0.1),
        ]);
        let result = SentimentResult::with_scores(SentimentLabel::Positive, 0.7, scores);
        assert_eq!(result.score_for(SentimentLabel::Negative), Some(0.1));
    }

    #[test]
    fn test_period_serializes_as_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let period = ReportPeriod::ending(today, 7);
        assert_eq!(
            serde_json::to_value(period).unwrap(),
            json!({"from": "2024-03-01", "to": "2024-03-08"})
        );
    }

    #[test]
    fn test_label_parse() {
        assert_eq!(SentimentLabel::parse("Positive"), Some(SentimentLabel::Positive));
        assert_eq!(SentimentLabel::parse(" negative "), Some(SentimentLabel::Negative));
        assert_eq!(SentimentLabel::parse("bullish"), None);
    }
}
