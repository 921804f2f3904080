mod admin;
mod config;
mod data;
mod db;
mod errors;
mod models;
mod ocr;
mod recommendation;
mod records;
mod routes;
mod session;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod wizard;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::admin::editor::EditorSessions;
use crate::admin::gate::AdminGate;
use crate::config::Config;
use crate::data::postgres::PgDataService;
use crate::db::create_pool;
use crate::ocr::HttpOcrService;
use crate::recommendation::client::HttpRecommender;
use crate::routes::build_router;
use crate::session::identity::GoTrueIdentityProvider;
use crate::state::AppState;
use crate::storage::S3FileStorage;
use crate::wizard::store::WizardStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Portfolio API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    let data = Arc::new(PgDataService::new(pool));

    // Initialize S3-compatible storage
    let s3 = build_s3_client(&config).await;
    let storage = Arc::new(S3FileStorage::new(
        s3,
        config.s3_bucket.clone(),
        &config.s3_public_url,
    ));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Outbound HTTP clients share one connection pool
    let http = reqwest::Client::new();
    let identity = Arc::new(GoTrueIdentityProvider::new(
        http.clone(),
        &config.auth_url,
        config.auth_anon_key.clone(),
    ));
    let ocr = Arc::new(HttpOcrService::new(
        http.clone(),
        config.ocr_url.clone(),
        Duration::from_secs(config.ocr_timeout_secs),
    ));
    info!(
        "OCR service: {} (timeout {}s)",
        config.ocr_url, config.ocr_timeout_secs
    );
    let recommender = Arc::new(HttpRecommender::new(
        http,
        config.recommendation_url.clone(),
    ));

    // Build app state
    let state = AppState {
        data,
        identity,
        storage,
        ocr,
        recommender,
        wizards: WizardStore::with_capacity(config.wizard_capacity),
        editors: EditorSessions::default(),
        admin_gate: AdminGate::new(config.admin_registration_secret.clone()),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the portfolio front end

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client for the backend's S3-compatible storage endpoint.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "portfolio-static",
    );

    let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
