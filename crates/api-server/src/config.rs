use anyhow::{bail, Context, Result};
use finnhub_client::DEFAULT_BASE_URL;
use ml_client::MLConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Which scoring oracle the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerBackend {
    /// External FinBERT inference service.
    FinBert,
    /// In-process word lists; needs no ML service.
    Lexicon,
}

impl FromStr for ScorerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finbert" => Ok(ScorerBackend::FinBert),
            "lexicon" => Ok(ScorerBackend::Lexicon),
            other => bail!("unknown SENTIMENT_BACKEND '{}' (expected finbert or lexicon)", other),
        }
    }
}

/// Server settings. Not `Debug`: it holds the provider token.
#[derive(Clone)]
pub struct AppConfig {
    pub finnhub_api_key: String,
    pub finnhub_base_url: String,
    pub news_limit: usize,
    pub backend: ScorerBackend,
    pub ml: MLConfig,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let finnhub_api_key = get("FINNHUB_API_KEY").context("FINNHUB_API_KEY must be set")?;
        let finnhub_base_url = get("FINNHUB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let news_limit = match get("NEWS_LIMIT") {
            Some(v) => v.parse().context("NEWS_LIMIT must be a positive integer")?,
            None => 50,
        };
        if news_limit == 0 {
            bail!("NEWS_LIMIT must be a positive integer");
        }

        let backend = match get("SENTIMENT_BACKEND") {
            Some(v) => v.parse()?,
            None => ScorerBackend::FinBert,
        };

        let mut ml = MLConfig::default();
        if let Some(url) = get("ML_SENTIMENT_URL") {
            ml.sentiment_url = url;
        }
        if let Some(secs) = get("ML_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().context("ML_TIMEOUT_SECS must be a whole number of seconds")?;
            ml.timeout = Duration::from_secs(secs);
        }

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        Ok(Self {
            finnhub_api_key,
            finnhub_base_url,
            news_limit,
            backend,
            ml,
            bind_addr,
        })
    }
}
