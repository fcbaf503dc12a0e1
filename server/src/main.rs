use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use giveaway_server::config::Config;
use giveaway_server::http::{router, AppState};
use giveaway_server::{db, reclamation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            "debug".to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            "info".to_string()
        }
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting giveaway core");

    let config = Arc::new(Config::from_env());
    let pool = db::init_db(&config).await?;
    tracing::info!("database initialized");

    let reclamation_pool = pool.clone();
    let reclamation_config = (*config).clone();
    tokio::spawn(async move {
        reclamation::run_worker(reclamation_pool, reclamation_config).await;
    });
    tracing::info!("reclamation loop started");

    let state = AppState {
        pool,
        config: config.clone(),
    };

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
