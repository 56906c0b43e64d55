//! VoxReply Gateway: `POST /chat` takes a spoken question as multipart audio and answers
//! with formatted markup (plus base64 speech for profiles that talk back).

mod api;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxreply_core::{AppConfig, ResponsePipeline};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[voxreply-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration: {}", e);
            std::process::exit(1);
        }
    };
    let pipeline = match ResponsePipeline::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("pipeline setup: {}", e);
            std::process::exit(1);
        }
    };

    let addr = config.bind_addr();
    tracing::info!(
        profile = %config.active_profile,
        profiles = config.profiles.len(),
        scratch = %config.scratch_dir,
        "voxreply {} starting",
        voxreply_core::version()
    );
    let app = api::build_router(api::AppState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
    });

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
