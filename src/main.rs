use axum::extract::DefaultBodyLimit;
use http::HeaderValue;
use lms_scorm_backend::{
    config::AppConfig,
    db,
    mailer::LogMailer,
    router,
    store::postgres::PgStore,
    AppState,
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "lms_scorm_backend=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;
    tokio::fs::create_dir_all(config.content_root()).await?;
    tokio::fs::create_dir_all(config.archive_root()).await?;

    let port = config.port;
    // multipart framing on top of the archive itself
    let body_limit = config.max_upload_bytes + 1024 * 1024;
    let cors = cors_layer(&config.cors_allowed_origins)?;
    let state = AppState::new(config, Arc::new(PgStore::new(pool)), Arc::new(LogMailer));

    let app = router(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(origins))
}
