use std::collections::HashMap;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use review_insights_api::{
    build_router,
    config::ServiceSet,
    inference::{Embedder, SentimentClassifier, TopicModel},
    models::{SentimentPrediction, TopicFit, OUTLIER_TOPIC},
    pipeline::{PipelineModels, PipelineSettings},
    store::Store,
    vectorizer::CountVectorizer,
    AppState,
};
use rusqlite::params;
use serde_json::{json, Value};
use tower::ServiceExt;

struct FixedClassifier;

impl SentimentClassifier for FixedClassifier {
    fn classify(&self, text: &str) -> Result<SentimentPrediction> {
        let label = if text.to_lowercase().contains("drains") {
            "NEGATIVE"
        } else {
            "POSITIVE"
        };
        Ok(SentimentPrediction {
            label: label.to_string(),
            score: 0.9,
        })
    }
}

struct ZeroEmbedder;

impl Embedder for ZeroEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; 4])
    }
}

/// Documents mentioning "battery" form cluster 0, everything else is noise.
struct KeywordTopicModel;

impl TopicModel for KeywordTopicModel {
    fn fit_transform(
        &self,
        docs: &[String],
        _embedder: &dyn Embedder,
        _vectorizer: &CountVectorizer,
    ) -> Result<TopicFit> {
        let assignments: Vec<i64> = docs
            .iter()
            .map(|d| if d.contains("battery") { 0 } else { OUTLIER_TOPIC })
            .collect();
        Ok(TopicFit {
            probabilities: Some(vec![0.7; docs.len()]),
            topic_terms: HashMap::from([(
                0,
                vec![("battery".to_string(), 0.4), ("charge".to_string(), 0.1)],
            )]),
            assignments,
        })
    }
}

fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store
        .execute(
            "INSERT INTO brands (brand_id, brand_name) VALUES (?1, ?2)",
            params![1, "Pixel Works"],
        )
        .unwrap();
    store
        .execute(
            "INSERT INTO phones (phone_id, brand_id, phone_name, release_year, price)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![7, 1, "Pixel 9", 2024, 799.0],
        )
        .unwrap();
    store
        .execute(
            "INSERT INTO phones (phone_id, brand_id, phone_name) VALUES (?1, ?2, ?3)",
            params![8, 1, "Pixel 9a"],
        )
        .unwrap();
    for (review_id, phone_id, text) in [
        (1, 7, "Battery lasts forever on this phone."),
        (2, 7, "Great battery and quick charging."),
        (3, 7, "Lovely display colours."),
        (4, 8, "Battery drains overnight."),
    ] {
        store
            .execute(
                "INSERT INTO reviews (review_id, phone_id, review_text) VALUES (?1, ?2, ?3)",
                params![review_id, phone_id, text],
            )
            .unwrap();
    }
    store
}

fn fake_pipeline() -> PipelineModels {
    PipelineModels::new(
        Box::new(FixedClassifier),
        Box::new(ZeroEmbedder),
        Box::new(KeywordTopicModel),
        PipelineSettings::default(),
    )
}

fn app(store: Store, services: ServiceSet) -> Router {
    let pipeline = services.includes_pipeline().then(fake_pipeline);
    build_router(AppState::new(store, pipeline), services)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = app(Store::open_in_memory().unwrap(), ServiceSet::Query);
    let (status, body) = send(&app, Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn lists_records_by_filter() {
    let app = app(seeded_store(), ServiceSet::Query);

    let (status, brands) = send(&app, Method::GET, "/brands").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(brands, json!([{ "brand_id": 1, "brand_name": "Pixel Works" }]));

    let (_, phones) = send(&app, Method::GET, "/phones?brand_id=1").await;
    assert_eq!(phones.as_array().unwrap().len(), 2);

    let (_, reviews) = send(&app, Method::GET, "/reviews?phone_id=7").await;
    assert_eq!(reviews.as_array().unwrap().len(), 3);
    assert_eq!(reviews[0]["review_date"], Value::Null);

    let (status, empty) = send(&app, Method::GET, "/reviews?phone_id=999").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty, json!([]));
}

#[tokio::test]
async fn missing_or_malformed_filter_is_rejected() {
    let app = app(seeded_store(), ServiceSet::Query);
    let (status, _) = send(&app, Method::GET, "/phones").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::GET, "/topics?phone_id=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sentiment_summary_omits_absent_labels() {
    let store = seeded_store();
    for review_id in 1..=3 {
        store
            .execute(
                "INSERT INTO sentiments (review_id, sentiment_label, sentiment_score)
                 VALUES (?1, 'positive', 0.9)",
                params![review_id],
            )
            .unwrap();
    }
    let app = app(store, ServiceSet::Query);

    let (status, body) = send(&app, Method::GET, "/sentiments?phone_id=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "positive": 3 }));
}

#[tokio::test]
async fn pipeline_routes_require_loaded_models() {
    let store = seeded_store();
    let state = AppState::new(store, None);
    let app = build_router(state, ServiceSet::All);

    let (status, body) = send(&app, Method::POST, "/run-sentiment").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "PIPELINE_UNAVAILABLE");
}

#[tokio::test]
async fn route_groups_follow_service_set() {
    let query_only = app(seeded_store(), ServiceSet::Query);
    let (status, _) = send(&query_only, Method::POST, "/run-all-topics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let pipeline_only = app(seeded_store(), ServiceSet::Pipeline);
    let (status, _) = send(&pipeline_only, Method::GET, "/brands").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&pipeline_only, Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn run_sentiment_then_query_counts() {
    let app = app(seeded_store(), ServiceSet::All);

    let (status, body) = send(&app, Method::POST, "/run-sentiment").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Sentiment analysis done for 4 reviews" }));

    let (_, summary) = send(&app, Method::GET, "/sentiments?phone_id=7").await;
    assert_eq!(summary, json!({ "positive": 3 }));
    let (_, summary) = send(&app, Method::GET, "/sentiments?phone_id=8").await;
    assert_eq!(summary, json!({ "negative": 1 }));
}

#[tokio::test]
async fn run_topics_for_one_phone() {
    let app = app(seeded_store(), ServiceSet::All);

    let (status, body) = send(&app, Method::POST, "/run-topics/7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Topics generated for phone_id 7" }));

    let (_, topics) = send(&app, Method::GET, "/topics?phone_id=7").await;
    let topics = topics.as_array().unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0]["topic_label"], "battery");
    assert_eq!(topics[0]["representative_terms"], "battery, charge");

    let (_, stats) = send(&app, Method::GET, "/stats").await;
    assert_eq!(stats["topics"], 1);
    assert_eq!(stats["review_topics"], 2);
}

#[tokio::test]
async fn run_topics_reports_phone_without_reviews() {
    let store = seeded_store();
    store
        .execute(
            "INSERT INTO phones (phone_id, brand_id, phone_name) VALUES (?1, ?2, ?3)",
            params![9, 1, "Pixel Fold"],
        )
        .unwrap();
    let app = app(store, ServiceSet::All);

    let (status, body) = send(&app, Method::POST, "/run-topics/9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "No reviews found for phone_id 9" }));

    let (_, batch) = send(&app, Method::POST, "/run-all-topics").await;
    assert_eq!(
        batch,
        json!({
            "status": [
                "Topics generated/updated for phone_id 7",
                "Topics generated/updated for phone_id 8"
            ]
        })
    );
}

#[tokio::test]
async fn rerunning_topics_keeps_labels_unique() {
    let store = seeded_store();
    let app = app(store.clone(), ServiceSet::All);
    send(&app, Method::POST, "/run-topics/7").await;

    store
        .execute(
            "INSERT INTO reviews (review_id, phone_id, review_text) VALUES (?1, ?2, ?3)",
            params![5, 7, "Battery still strong after a year."],
        )
        .unwrap();
    send(&app, Method::POST, "/run-topics/7").await;

    let (_, topics) = send(&app, Method::GET, "/topics?phone_id=7").await;
    assert_eq!(topics.as_array().unwrap().len(), 1);
    let (_, stats) = send(&app, Method::GET, "/stats").await;
    assert_eq!(stats["review_topics"], 3);
}

#[tokio::test]
async fn phone_overview_merges_related_data() {
    let app = app(seeded_store(), ServiceSet::All);
    send(&app, Method::POST, "/run-sentiment").await;
    send(&app, Method::POST, "/run-topics/7").await;

    let (status, body) = send(&app, Method::GET, "/phones/7/complete").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone_name"], "Pixel 9");
    assert_eq!(body["brand_name"], "Pixel Works");
    assert_eq!(body["review_count"], 3);
    assert_eq!(body["sentiments"], json!({ "positive": 3 }));
    assert_eq!(body["topics"], "battery");

    let (status, body) = send(&app, Method::GET, "/phones/404/complete").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
