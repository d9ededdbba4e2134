use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TICKER_RE: Regex = Regex::new(r"^[A-Z]{1,5}$").expect("static ticker regex");
}

/// Trim and upper-case a user supplied ticker, returning it only if it is
/// one to five ASCII letters.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let ticker = raw.trim().to_uppercase();
    TICKER_RE.is_match(&ticker).then_some(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_and_normalizes() {
        assert_eq!(normalize_ticker("AAPL").as_deref(), Some("AAPL"));
        assert_eq!(normalize_ticker("  msft ").as_deref(), Some("MSFT"));
        assert_eq!(normalize_ticker("f").as_deref(), Some("F"));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(normalize_ticker("aapl1").is_none());
        assert!(normalize_ticker("").is_none());
        assert!(normalize_ticker("GOOGLE").is_none());
        assert!(normalize_ticker("BRK.B").is_none());
        assert!(normalize_ticker("A A").is_none());
    }
}
