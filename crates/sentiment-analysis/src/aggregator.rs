//! Consensus over per-item sentiment results.
//!
//! The modal label wins; when two labels end with the same tally, the one that
//! reached that tally first while walking the input keeps the lead.

use sentiment_core::{AggregateSummary, SentimentLabel, SentimentResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentAggregator;

impl SentimentAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Reduce `results` to one summary. Total: any input, including an empty
    /// one, produces a summary.
    pub fn aggregate(&self, results: &[SentimentResult]) -> AggregateSummary {
        let Some(first) = results.first() else {
            return AggregateSummary::empty();
        };
        let total = results.len() as f64;

        let mut counts: BTreeMap<SentimentLabel, usize> = BTreeMap::new();
        let mut leader = first.label;
        let mut leader_count = 0usize;
        for result in results {
            let count = counts.entry(result.label).or_insert(0);
            *count += 1;
            // strictly greater: a tie never moves the lead
            if *count > leader_count {
                leader = result.label;
                leader_count = *count;
            }
        }

        let distribution = counts
            .iter()
            .map(|(label, count)| (*label, *count as f64 / total))
            .collect();

        let average_scores = SentimentLabel::ALL
            .iter()
            .map(|label| {
                let reported: Vec<f64> = results.iter().filter_map(|r| r.score_for(*label)).collect();
                (*label, mean(&reported))
            })
            .collect();

        AggregateSummary {
            overall_sentiment: leader,
            confidence: leader_count as f64 / total,
            distribution,
            average_scores,
            item_count: results.len(),
        }
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}
