use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{
    error::{ServiceError, ServiceResult},
    models::{
        BatchJobStatus, BrandFilter, JobStatus, PhoneFilter, Row, SentimentSummary, TableCounts,
        TopicScope,
    },
    AppState,
};

/// Run a blocking store or model call off the async workers.
async fn blocking<T, F>(work: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn list_brands(State(state): State<AppState>) -> ServiceResult<Json<Vec<Row>>> {
    let rows = blocking(move || state.store.list_brands()).await?;
    Ok(Json(rows))
}

pub async fn list_phones(
    State(state): State<AppState>,
    Query(filter): Query<BrandFilter>,
) -> ServiceResult<Json<Vec<Row>>> {
    let rows = blocking(move || state.store.list_phones(filter.brand_id)).await?;
    Ok(Json(rows))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(filter): Query<PhoneFilter>,
) -> ServiceResult<Json<Vec<Row>>> {
    let rows = blocking(move || state.store.list_reviews(filter.phone_id)).await?;
    Ok(Json(rows))
}

pub async fn sentiment_summary(
    State(state): State<AppState>,
    Query(filter): Query<PhoneFilter>,
) -> ServiceResult<Json<SentimentSummary>> {
    let summary = blocking(move || state.store.sentiment_summary(filter.phone_id)).await?;
    Ok(Json(summary))
}

pub async fn list_topics(
    State(state): State<AppState>,
    Query(filter): Query<PhoneFilter>,
) -> ServiceResult<Json<Vec<Row>>> {
    let rows = blocking(move || state.store.list_topics(filter.phone_id)).await?;
    Ok(Json(rows))
}

pub async fn phone_overview(
    State(state): State<AppState>,
    Path(phone_id): Path<i64>,
) -> ServiceResult<Json<Row>> {
    let overview = blocking(move || state.store.phone_overview(phone_id)).await?;
    overview
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("phone {phone_id}")))
}

pub async fn stats(State(state): State<AppState>) -> ServiceResult<Json<TableCounts>> {
    let counts = blocking(move || state.store.table_counts()).await?;
    Ok(Json(counts))
}

pub async fn run_sentiment(State(state): State<AppState>) -> ServiceResult<Json<JobStatus>> {
    let pipeline = state.pipeline()?;
    let store = state.store.clone();
    let outcome = blocking(move || pipeline.run_sentiment(&store)).await?;
    info!(processed = outcome.processed, "Sentiment run requested over HTTP completed");
    Ok(Json(JobStatus {
        status: outcome.summary(),
    }))
}

pub async fn run_all_topics(State(state): State<AppState>) -> ServiceResult<Json<BatchJobStatus>> {
    let pipeline = state.pipeline()?;
    let store = state.store.clone();
    let status = blocking(move || pipeline.run_topics(&store, TopicScope::AllPhones)).await?;
    Ok(Json(BatchJobStatus { status }))
}

pub async fn run_topics(
    State(state): State<AppState>,
    Path(phone_id): Path<i64>,
) -> ServiceResult<Json<JobStatus>> {
    let pipeline = state.pipeline()?;
    let store = state.store.clone();
    let status = blocking(move || pipeline.run_single_topic(&store, phone_id)).await?;
    Ok(Json(JobStatus { status }))
}
