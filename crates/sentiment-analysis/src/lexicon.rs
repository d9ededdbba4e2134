use async_trait::async_trait;
use sentiment_core::{ScoringError, SentimentLabel, SentimentResult, SentimentScorer};
use std::collections::{BTreeMap, HashSet};

use crate::model_window;

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "gain", "gains", "profit", "growth", "beat", "beats",
    "upgrade", "outperform", "strong", "positive", "rise", "rises", "increase",
    "breakthrough", "innovation", "success", "exceed", "exceeds", "momentum",
    "buy", "recommend", "optimistic", "record", "high", "advance", "soar", "jump",
    // Financial-specific terms
    "dividend", "buyback", "repurchase", "accretive", "upside",
    "recovery", "rebound", "expansion", "robust", "accelerating",
    "overweight", "raised", "upgraded", "outpacing", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "loss", "losses", "fall", "falls", "plunge", "crash", "miss", "misses",
    "downgrade", "underperform", "weak", "negative", "drop", "drops", "decrease",
    "concern", "risk", "fail", "disappoint", "slump", "sell",
    "warning", "pessimistic", "low", "retreat", "fear", "trouble",
    // Financial-specific terms
    "dilution", "dilutive", "headwind", "lawsuit", "litigation",
    "recall", "investigation", "probe", "default", "bankruptcy",
    "restructuring", "layoff", "layoffs", "downside", "overvalued", "bubble",
    "underweight", "lowered", "suspended", "fraud",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

/// A sentiment word is flipped when a negation appears this many words before it or closer.
const NEGATION_WINDOW: usize = 3;

/// Logit given to the neutral class; a single net sentiment word outweighs it.
const NEUTRAL_LOGIT: f64 = 0.5;

/// Offline word-list scorer.
///
/// Counts finance-flavoured positive and negative words (flipping those
/// preceded by a negation) and turns the net count into a three-way
/// softmax distribution.
pub struct LexiconScorer {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    negation: HashSet<&'static str>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
            negation: NEGATION_WORDS.iter().copied().collect(),
        }
    }

    /// Positive minus negative word hits, after negation.
    fn net_score(&self, text: &str) -> i32 {
        let text_lower = text.to_lowercase().replace('\u{2019}', "'");
        let words: Vec<&str> = text_lower
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .collect();

        let mut last_negation: Option<usize> = None;
        let mut score = 0i32;

        for (i, word) in words.iter().enumerate() {
            if self.negation.contains(word) {
                last_negation = Some(i);
                continue;
            }

            let polarity = if self.positive.contains(word) {
                1
            } else if self.negative.contains(word) {
                -1
            } else {
                continue;
            };

            let negated = last_negation.is_some_and(|pos| i - pos <= NEGATION_WINDOW);
            score += if negated { -polarity } else { polarity };
        }

        score
    }

    pub fn score_text(&self, text: &str) -> SentimentResult {
        let text = model_window(text);
        if text.trim().is_empty() {
            return SentimentResult::neutral_default();
        }

        let net = self.net_score(text) as f64;
        let logits = [
            (SentimentLabel::Positive, net.max(0.0)),
            (SentimentLabel::Neutral, NEUTRAL_LOGIT),
            (SentimentLabel::Negative, (-net).max(0.0)),
        ];
        let norm: f64 = logits.iter().map(|(_, z)| z.exp()).sum();
        let scores: BTreeMap<SentimentLabel, f64> =
            logits.iter().map(|(label, z)| (*label, z.exp() / norm)).collect();

        let (label, score) = logits
            .iter()
            .map(|(label, _)| (*label, scores[label]))
            .fold((SentimentLabel::Neutral, f64::MIN), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            });

        SentimentResult::with_scores(label, score, scores)
    }
}

#[async_trait]
impl SentimentScorer for LexiconScorer {
    async fn score(&self, text: &str) -> Result<SentimentResult, ScoringError> {
        Ok(self.score_text(text))
    }

    fn backend_name(&self) -> &'static str {
        "lexicon"
    }
}
