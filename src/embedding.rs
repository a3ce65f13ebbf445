use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::inference::{execute_curl_json, Embedder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Openai,
    Ollama,
}

impl EmbeddingProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "ollama" | "local" => Ok(Self::Ollama),
            other => bail!(
                "Unsupported REVIEW_INSIGHTS_EMBED_PROVIDER `{other}`. Supported: openai, ollama/local."
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Openai => "text-embedding-3-small",
            Self::Ollama => "all-minilm",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Openai => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

/// Sentence-embedding client used to place review documents before
/// clustering.
#[derive(Debug, Clone)]
pub struct EmbeddingRuntimeConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub base_url: String,
    pub openai_api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

impl EmbeddingRuntimeConfig {
    pub fn new(
        provider: &str,
        model: Option<&str>,
        base_url: Option<&str>,
        openai_api_key: Option<String>,
        request_timeout_seconds: u64,
    ) -> Result<Self> {
        let provider = EmbeddingProviderKind::parse(provider)?;
        let model = model
            .map(str::trim)
            .unwrap_or(provider.default_model())
            .to_string();
        if model.is_empty() {
            bail!("REVIEW_INSIGHTS_EMBED_MODEL must be non-empty.");
        }
        let base_url = base_url
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(provider.default_base_url())
            .trim_end_matches('/')
            .to_string();

        let config = Self {
            provider,
            model,
            base_url,
            openai_api_key,
            request_timeout_seconds: request_timeout_seconds.max(1),
        };
        config.validate_runtime_requirements()?;
        Ok(config)
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        match self.provider {
            EmbeddingProviderKind::Openai => self.embed_openai_compatible(
                format!("{}/embeddings", self.base_url),
                self.openai_api_key
                    .as_deref()
                    .context("OPENAI_API_KEY is required for provider=openai")?,
                text,
            ),
            EmbeddingProviderKind::Ollama => {
                self.embed_ollama(format!("{}/api/embeddings", self.base_url), text)
            }
        }
    }

    fn validate_runtime_requirements(&self) -> Result<()> {
        if self.provider == EmbeddingProviderKind::Openai
            && self
                .openai_api_key
                .as_deref()
                .unwrap_or_default()
                .trim()
                .is_empty()
        {
            bail!("Embedding misconfiguration: provider=openai requires OPENAI_API_KEY.");
        }
        Ok(())
    }

    fn embed_openai_compatible(&self, url: String, api_key: &str, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.model,
            "input": [text]
        });
        let response = execute_curl_json(
            &url,
            Some(api_key),
            self.request_timeout_seconds,
            body.to_string(),
        )?;
        extract_embedding_from_response(&response, &url)
    }

    fn embed_ollama(&self, url: String, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.model,
            "prompt": text
        });
        let response =
            execute_curl_json(&url, None, self.request_timeout_seconds, body.to_string())?;
        extract_embedding_from_response(&response, &url)
    }
}

impl Embedder for EmbeddingRuntimeConfig {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text)
    }
}

fn extract_embedding_from_response(response: &Value, url: &str) -> Result<Vec<f32>> {
    if let Some(arr) = response.get("embedding").and_then(Value::as_array) {
        return parse_embedding_array(arr, url);
    }

    if let Some(arr) = response
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|first| first.get("embedding"))
        .and_then(Value::as_array)
    {
        return parse_embedding_array(arr, url);
    }

    bail!("Embedding response from {url} did not contain an `embedding` vector.");
}

fn parse_embedding_array(items: &[Value], url: &str) -> Result<Vec<f32>> {
    if items.is_empty() {
        bail!("Embedding response from {url} returned an empty embedding vector.");
    }

    let mut embedding = Vec::with_capacity(items.len());
    for item in items {
        let value = item
            .as_f64()
            .context("Embedding vector contained a non-numeric value")?;
        embedding.push(value as f32);
    }
    Ok(embedding)
}
