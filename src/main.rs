use anyhow::Result;
use review_insights_api::{
    build_router, cli, config::Config, pipeline::PipelineModels, store::Store, AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_insights_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let args: Vec<String> = std::env::args().collect();
    if cli::maybe_run_from_cli(&args, &config).await? {
        return Ok(());
    }

    let store = {
        let path = config.database_path.clone();
        let pool_size = config.pool_size;
        tokio::task::spawn_blocking(move || Store::open(&path, pool_size)).await??
    };
    let pipeline = if config.services.includes_pipeline() {
        Some(PipelineModels::from_config(&config)?)
    } else {
        None
    };

    let app = build_router(AppState::new(store, pipeline), config.services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        services = config.services.as_str(),
        "review-insights-api listening on {}", config.bind_addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
