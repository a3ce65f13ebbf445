use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::Result;
use tracing::warn;

const DEFAULT_BIND_PORT: u16 = 8000;
const DEFAULT_SENTIMENT_MODEL: &str = "distilbert/distilbert-base-uncased-finetuned-sst-2-english";
const DEFAULT_EXTRA_STOPWORDS: &str = "phone,review,smartphone";

/// Route groups one process can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSet {
    Query,
    Pipeline,
    All,
}

impl ServiceSet {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "query" => Some(Self::Query),
            "pipeline" => Some(Self::Pipeline),
            "all" | "" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Pipeline => "pipeline",
            Self::All => "all",
        }
    }

    pub fn includes_query(&self) -> bool {
        matches!(self, Self::Query | Self::All)
    }

    pub fn includes_pipeline(&self) -> bool {
        matches!(self, Self::Pipeline | Self::All)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub services: ServiceSet,
    pub database_path: PathBuf,
    pub pool_size: u32,
    pub sentiment_endpoint: String,
    pub sentiment_model: String,
    pub sentiment_max_tokens: usize,
    pub topic_endpoint: String,
    pub topic_top_terms: usize,
    pub extra_stop_words: Vec<String>,
    pub embed_provider: String,
    pub embed_model: Option<String>,
    pub embed_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub inference_api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("REVIEW_INSIGHTS_BIND_ADDR")
            .map(|raw| {
                raw.trim()
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_string()
            })
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_BIND_PORT)));

        let services = match lookup("REVIEW_INSIGHTS_SERVICES") {
            Some(raw) => ServiceSet::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown REVIEW_INSIGHTS_SERVICES, serving all routes");
                ServiceSet::All
            }),
            None => ServiceSet::All,
        };

        let database_path = PathBuf::from(
            non_empty(lookup("REVIEW_INSIGHTS_DATABASE_PATH"))
                .unwrap_or_else(|| "smartphone_reviews.db".to_string()),
        );

        let pool_size = parse_or(lookup("REVIEW_INSIGHTS_POOL_SIZE"), 8u32).max(1);

        let sentiment_endpoint = non_empty(lookup("REVIEW_INSIGHTS_SENTIMENT_ENDPOINT"))
            .unwrap_or_else(|| "http://localhost:8080/sentiment".to_string());
        let sentiment_model = lookup("REVIEW_INSIGHTS_SENTIMENT_MODEL")
            .unwrap_or_else(|| DEFAULT_SENTIMENT_MODEL.to_string());
        let sentiment_max_tokens =
            parse_or(lookup("REVIEW_INSIGHTS_SENTIMENT_MAX_TOKENS"), 512usize).max(1);

        let topic_endpoint = non_empty(lookup("REVIEW_INSIGHTS_TOPIC_ENDPOINT"))
            .unwrap_or_else(|| "http://localhost:8080/topics".to_string());
        let topic_top_terms = parse_or(lookup("REVIEW_INSIGHTS_TOPIC_TOP_TERMS"), 10usize).max(1);

        let extra_stop_words = parse_word_list(
            &lookup("REVIEW_INSIGHTS_EXTRA_STOPWORDS")
                .unwrap_or_else(|| DEFAULT_EXTRA_STOPWORDS.to_string()),
        );

        let embed_provider =
            non_empty(lookup("REVIEW_INSIGHTS_EMBED_PROVIDER")).unwrap_or_else(|| "ollama".into());
        let embed_model = lookup("REVIEW_INSIGHTS_EMBED_MODEL");
        let embed_base_url = non_empty(lookup("REVIEW_INSIGHTS_EMBED_BASE_URL"));
        let openai_api_key = non_empty(lookup("OPENAI_API_KEY"));
        let inference_api_key = non_empty(lookup("REVIEW_INSIGHTS_INFERENCE_API_KEY"));

        let request_timeout_seconds =
            parse_or(lookup("REVIEW_INSIGHTS_REQUEST_TIMEOUT_SECONDS"), 120u64).max(1);

        Ok(Self {
            bind_addr,
            services,
            database_path,
            pool_size,
            sentiment_endpoint,
            sentiment_model,
            sentiment_max_tokens,
            topic_endpoint,
            topic_top_terms,
            extra_stop_words,
            embed_provider,
            embed_model,
            embed_base_url,
            openai_api_key,
            inference_api_key,
            request_timeout_seconds,
        })
    }
}

/// Comma separated, trimmed, lowercased, blanks dropped.
pub fn parse_word_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|w| w.trim().to_ascii_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
