pub mod api;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod inference;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod sentiment;
pub mod store;
pub mod topics;
pub mod vectorizer;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::ServiceSet,
    error::{ServiceError, ServiceResult},
    pipeline::PipelineModels,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub pipeline: Option<Arc<PipelineModels>>,
}

impl AppState {
    pub fn new(store: Store, pipeline: Option<PipelineModels>) -> Self {
        Self {
            store,
            pipeline: pipeline.map(Arc::new),
        }
    }

    pub fn pipeline(&self) -> ServiceResult<Arc<PipelineModels>> {
        self.pipeline
            .clone()
            .ok_or(ServiceError::PipelineUnavailable)
    }
}

pub fn build_router(state: AppState, services: ServiceSet) -> Router {
    let mut app = Router::new().route("/healthz", get(api::healthz));

    if services.includes_query() {
        app = app
            .route("/brands", get(api::list_brands))
            .route("/phones", get(api::list_phones))
            .route("/phones/{phone_id}/complete", get(api::phone_overview))
            .route("/reviews", get(api::list_reviews))
            .route("/sentiments", get(api::sentiment_summary))
            .route("/topics", get(api::list_topics))
            .route("/stats", get(api::stats));
    }

    if services.includes_pipeline() {
        app = app
            .route("/run-sentiment", post(api::run_sentiment))
            .route("/run-all-topics", post(api::run_all_topics))
            .route("/run-topics/{phone_id}", post(api::run_topics));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
