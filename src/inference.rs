use std::{
    io::Write,
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    models::{SentimentPrediction, TopicFit},
    vectorizer::CountVectorizer,
};

pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<SentimentPrediction>;
}

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Trains a fresh topic model over `docs` and reports one cluster id and
/// probability per document, plus the ranked terms of every cluster.
pub trait TopicModel: Send + Sync {
    fn fit_transform(
        &self,
        docs: &[String],
        embedder: &dyn Embedder,
        vectorizer: &CountVectorizer,
    ) -> Result<TopicFit>;
}

/// Text classification service speaking the Hugging Face inference shape.
#[derive(Debug, Clone)]
pub struct RemoteSentimentClassifier {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout_seconds: u64,
    max_length: usize,
}

impl RemoteSentimentClassifier {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout_seconds: u64,
        max_length: usize,
    ) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            bail!("REVIEW_INSIGHTS_SENTIMENT_ENDPOINT must be non-empty.");
        }
        let model = model.trim().to_string();
        if model.is_empty() {
            bail!("REVIEW_INSIGHTS_SENTIMENT_MODEL must be non-empty.");
        }
        Ok(Self {
            endpoint,
            model,
            api_key,
            timeout_seconds: timeout_seconds.max(1),
            max_length: max_length.max(1),
        })
    }

    /// The service tokenizes with its own vocabulary, so the token cap is
    /// sent along with the already word-truncated input.
    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "inputs": text,
            "parameters": {
                "truncation": true,
                "max_length": self.max_length
            }
        })
    }
}

impl SentimentClassifier for RemoteSentimentClassifier {
    fn classify(&self, text: &str) -> Result<SentimentPrediction> {
        let body = self.request_body(text);
        let response = execute_curl_json(
            &self.endpoint,
            self.api_key.as_deref(),
            self.timeout_seconds,
            body.to_string(),
        )?;
        parse_sentiment_response(&response, &self.endpoint)
    }
}

/// Accepts `[{label, score}]` or `[[{label, score}, ...]]` and returns the
/// highest-scoring entry.
fn parse_sentiment_response(response: &Value, url: &str) -> Result<SentimentPrediction> {
    let mut candidates = response
        .as_array()
        .with_context(|| format!("Sentiment response from {url} was not a JSON array"))?;
    if let Some(inner) = candidates.first().and_then(Value::as_array) {
        candidates = inner;
    }

    let mut best: Option<SentimentPrediction> = None;
    for candidate in candidates {
        let prediction: SentimentPrediction = serde_json::from_value(candidate.clone())
            .with_context(|| format!("Malformed sentiment entry from {url}: {candidate}"))?;
        if best.as_ref().map_or(true, |b| prediction.score > b.score) {
            best = Some(prediction);
        }
    }

    best.with_context(|| format!("Sentiment response from {url} contained no predictions"))
}

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    topics: Vec<i64>,
    #[serde(default)]
    probabilities: Option<Vec<f64>>,
}

/// Clustering service fed with precomputed document embeddings. Topic terms
/// are ranked locally from the vectorizer's counts.
#[derive(Debug, Clone)]
pub struct RemoteTopicModel {
    endpoint: String,
    api_key: Option<String>,
    timeout_seconds: u64,
    top_terms: usize,
}

impl RemoteTopicModel {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout_seconds: u64,
        top_terms: usize,
    ) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            bail!("REVIEW_INSIGHTS_TOPIC_ENDPOINT must be non-empty.");
        }
        Ok(Self {
            endpoint,
            api_key,
            timeout_seconds: timeout_seconds.max(1),
            top_terms: top_terms.max(1),
        })
    }
}

impl TopicModel for RemoteTopicModel {
    fn fit_transform(
        &self,
        docs: &[String],
        embedder: &dyn Embedder,
        vectorizer: &CountVectorizer,
    ) -> Result<TopicFit> {
        let embeddings = embed_documents(docs, embedder)?;
        debug!(documents = docs.len(), "Documents embedded for clustering");

        let body = json!({
            "documents": docs,
            "embeddings": embeddings
        });
        let response = execute_curl_json(
            &self.endpoint,
            self.api_key.as_deref(),
            self.timeout_seconds,
            body.to_string(),
        )?;
        let clusters = parse_cluster_response(response, docs.len(), &self.endpoint)?;
        let topic_terms = vectorizer.rank_topic_terms(docs, &clusters.topics, self.top_terms);

        Ok(TopicFit {
            assignments: clusters.topics,
            probabilities: clusters.probabilities,
            topic_terms,
        })
    }
}

/// Embeds every non-empty document. Empty documents carry no signal and get
/// a zero vector sized like the others, so they still reach clustering.
pub(crate) fn embed_documents(docs: &[String], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>> {
    let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(docs.len());
    for (idx, doc) in docs.iter().enumerate() {
        if doc.trim().is_empty() {
            embeddings.push(None);
            continue;
        }
        let embedding = embedder
            .embed(doc)
            .with_context(|| format!("Failed embedding document {idx}"))?;
        embeddings.push(Some(embedding));
    }

    let dim = embeddings.iter().flatten().map(Vec::len).next().unwrap_or(0);
    Ok(embeddings
        .into_iter()
        .map(|embedding| embedding.unwrap_or_else(|| vec![0.0; dim]))
        .collect())
}

fn parse_cluster_response(response: Value, expected: usize, url: &str) -> Result<ClusterResponse> {
    let parsed: ClusterResponse = serde_json::from_value(response)
        .with_context(|| format!("Topic response from {url} did not match the cluster schema"))?;
    if parsed.topics.len() != expected {
        bail!(
            "Topic service at {url} returned {} assignments for {expected} documents",
            parsed.topics.len()
        );
    }
    if let Some(probs) = &parsed.probabilities {
        if probs.len() != expected {
            bail!(
                "Topic service at {url} returned {} probabilities for {expected} documents",
                probs.len()
            );
        }
    }
    Ok(parsed)
}

pub(crate) fn execute_curl_json(
    url: &str,
    bearer_token: Option<&str>,
    timeout_seconds: u64,
    body: String,
) -> Result<Value> {
    let mut command = Command::new("curl");
    command
        .arg("-sS")
        .arg("--max-time")
        .arg(timeout_seconds.to_string())
        .arg("-X")
        .arg("POST")
        .arg(url)
        .arg("-H")
        .arg("Content-Type: application/json")
        .arg("--data-binary")
        .arg("@-");

    if let Some(token) = bearer_token {
        command
            .arg("-H")
            .arg(format!("Authorization: Bearer {token}"));
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute curl for inference request to {url}"))?;
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(body.as_bytes()),
        None => Ok(()),
    };
    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed waiting for curl request to {url}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Inference request to {url} failed: {}", stderr.trim());
    }
    written.with_context(|| format!("Failed writing request body for {url}"))?;

    let stdout =
        String::from_utf8(output.stdout).context("Inference response was not UTF-8")?;
    let parsed = serde_json::from_str::<Value>(&stdout).with_context(|| {
        format!(
            "Inference response was not valid JSON for {url}: {}",
            stdout.trim()
        )
    })?;

    if let Some(error) = parsed.get("error") {
        bail!("Inference service returned error: {error}");
    }

    Ok(parsed)
}
