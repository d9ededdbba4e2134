pub mod aggregator;
pub mod finbert;
pub mod lexicon;
pub mod preprocess;

pub use aggregator::SentimentAggregator;
pub use finbert::FinBertScorer;
pub use lexicon::LexiconScorer;
pub use preprocess::NewsTextCleaner;

/// Longest text (in characters) handed to a scoring model.
pub const MAX_INPUT_CHARS: usize = 512;

/// Leading `MAX_INPUT_CHARS` characters of `text`.
pub(crate) fn model_window(text: &str) -> &str {
    match text.char_indices().nth(MAX_INPUT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
