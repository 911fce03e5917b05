//! Stratum Server Binary
//!
//! Entry point for running Stratum as a standalone document-ingestion and
//! retrieval-augmented Q&A server. For library usage, import from the
//! `stratum` crate instead.

use stratum::{api, config::Config, context::AppContext};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting stratum");

    let config = Config::from_env()?;
    let ctx = AppContext::build(config).await?;

    let addr = format!("{}:{}", ctx.config.host, ctx.config.port);
    let app = api::routes::create_router(ctx).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
