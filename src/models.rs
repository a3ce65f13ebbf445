use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A result row keyed by column name, in select-list order.
pub type Row = Map<String, Value>;

/// Cluster id the topic model uses for documents with no confident topic.
pub const OUTLIER_TOPIC: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewText {
    pub review_id: i64,
    pub phone_id: i64,
    pub review_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPrediction {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSentiment {
    pub review_id: i64,
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRecord {
    pub topic_id: i64,
    pub phone_id: i64,
    pub topic_label: String,
    pub representative_terms: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewTopicLink {
    pub review_id: i64,
    pub topic_id: i64,
    pub relevance_score: f64,
}

/// Label -> count, labels with no rows are absent.
pub type SentimentSummary = BTreeMap<String, i64>;

/// Output of one topic-model training run over a phone's documents.
///
/// `assignments` and `probabilities` are parallel to the input documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicFit {
    pub assignments: Vec<i64>,
    pub probabilities: Option<Vec<f64>>,
    pub topic_terms: HashMap<i64, Vec<(String, f64)>>,
}

impl TopicFit {
    /// Ranked terms for a cluster, best first. Empty when the cluster has none.
    pub fn terms(&self, topic_id: i64) -> &[(String, f64)] {
        self.topic_terms
            .get(&topic_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn probability(&self, doc_index: usize) -> f64 {
        self.probabilities
            .as_ref()
            .and_then(|probs| probs.get(doc_index).copied())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicScope {
    AllPhones,
    SinglePhone(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobStatus {
    pub status: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub brands: i64,
    pub phones: i64,
    pub reviews: i64,
    pub sentiments: i64,
    pub topics: i64,
    pub review_topics: i64,
}

#[derive(Debug, Deserialize)]
pub struct BrandFilter {
    pub brand_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhoneFilter {
    pub phone_id: i64,
}
