use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ServiceError, ServiceResult},
    inference::SentimentClassifier,
    store::Store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentimentOutcome {
    pub processed: usize,
}

impl SentimentOutcome {
    pub fn summary(&self) -> String {
        format!("Sentiment analysis done for {} reviews", self.processed)
    }
}

/// Cut `text` after `max_tokens` whitespace-separated tokens.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> &str {
    let mut seen = 0usize;
    let mut in_token = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_token = false;
        } else if !in_token {
            if seen == max_tokens {
                return text[..idx].trim_end();
            }
            seen += 1;
            in_token = true;
        }
    }
    text
}

/// Classify every review and upsert one (label, score) row per review.
///
/// Rows written before a failure stay committed; rerunning overwrites them.
pub fn run_sentiment(
    store: &Store,
    classifier: &dyn SentimentClassifier,
    max_input_tokens: usize,
) -> ServiceResult<SentimentOutcome> {
    let run_id = Uuid::new_v4();
    let started = Instant::now();
    let reviews = store.all_reviews()?;
    info!(run_id = %run_id, reviews = reviews.len(), "Sentiment job started");

    for review in &reviews {
        let input = truncate_tokens(&review.review_text, max_input_tokens);
        let prediction = classifier.classify(input).map_err(|err| {
            ServiceError::Inference(err.context(format!(
                "classifying review {}",
                review.review_id
            )))
        })?;
        let label = prediction.label.to_lowercase();
        store.upsert_sentiment(review.review_id, &label, prediction.score)?;
    }

    info!(
        run_id = %run_id,
        processed = reviews.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Sentiment job finished"
    );
    Ok(SentimentOutcome {
        processed: reviews.len(),
    })
}
