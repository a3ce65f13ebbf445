use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::Config,
    embedding::EmbeddingRuntimeConfig,
    error::ServiceResult,
    inference::{
        Embedder, RemoteSentimentClassifier, RemoteTopicModel, SentimentClassifier, TopicModel,
    },
    models::TopicScope,
    normalize::Normalizer,
    sentiment::{run_sentiment, SentimentOutcome},
    store::Store,
    topics::TopicPipeline,
};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sentiment_max_tokens: usize,
    pub extra_stop_words: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sentiment_max_tokens: 512,
            extra_stop_words: vec!["phone".into(), "review".into(), "smartphone".into()],
        }
    }
}

/// Model handles loaded once at start and shared read-only by every job.
pub struct PipelineModels {
    classifier: Box<dyn SentimentClassifier>,
    embedder: Box<dyn Embedder>,
    topic_model: Box<dyn TopicModel>,
    normalizer: Normalizer,
    settings: PipelineSettings,
}

impl PipelineModels {
    pub fn new(
        classifier: Box<dyn SentimentClassifier>,
        embedder: Box<dyn Embedder>,
        topic_model: Box<dyn TopicModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            classifier,
            embedder,
            topic_model,
            normalizer: Normalizer::default(),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let classifier = RemoteSentimentClassifier::new(
            &config.sentiment_endpoint,
            &config.sentiment_model,
            config.inference_api_key.clone(),
            config.request_timeout_seconds,
            config.sentiment_max_tokens,
        )
        .context("Invalid sentiment classifier configuration")?;
        let embedder = EmbeddingRuntimeConfig::new(
            &config.embed_provider,
            config.embed_model.as_deref(),
            config.embed_base_url.as_deref(),
            config.openai_api_key.clone(),
            config.request_timeout_seconds,
        )
        .context("Invalid embedding configuration")?;
        let topic_model = RemoteTopicModel::new(
            &config.topic_endpoint,
            config.inference_api_key.clone(),
            config.request_timeout_seconds,
            config.topic_top_terms,
        )
        .context("Invalid topic model configuration")?;

        info!(
            sentiment_endpoint = %config.sentiment_endpoint,
            topic_endpoint = %config.topic_endpoint,
            embed_provider = embedder.provider.as_str(),
            embed_model = %embedder.model,
            "Pipeline models ready"
        );

        Ok(Self::new(
            Box::new(classifier),
            Box::new(embedder),
            Box::new(topic_model),
            PipelineSettings {
                sentiment_max_tokens: config.sentiment_max_tokens,
                extra_stop_words: config.extra_stop_words.clone(),
            },
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn run_sentiment(&self, store: &Store) -> ServiceResult<SentimentOutcome> {
        run_sentiment(
            store,
            self.classifier.as_ref(),
            self.settings.sentiment_max_tokens,
        )
    }

    pub fn run_topics(&self, store: &Store, scope: TopicScope) -> ServiceResult<Vec<String>> {
        self.topic_pipeline(store).run(scope)
    }

    pub fn run_single_topic(&self, store: &Store, phone_id: i64) -> ServiceResult<String> {
        self.topic_pipeline(store).run_single(phone_id)
    }

    fn topic_pipeline<'a>(&'a self, store: &'a Store) -> TopicPipeline<'a> {
        TopicPipeline {
            store,
            normalizer: &self.normalizer,
            topic_model: self.topic_model.as_ref(),
            embedder: self.embedder.as_ref(),
            extra_stop_words: &self.settings.extra_stop_words,
        }
    }
}
