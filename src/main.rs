use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod analytics;
mod billing;
mod config;
mod error;
mod experiments;
mod extract;
mod insights;
mod limits;
mod models;
mod outbound;
mod routes;
mod state;
mod store;
mod subscription;

use config::AppConfig;
use outbound::{
    openai::OpenAiClient,
    stripe::{StripeClient, WebhookVerifier},
};
use state::AppState;
use store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running migrations")?;
        tracing::info!("🗄️ migrations applied");
    }

    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, insights will use fallback copy");
    }

    let state = AppState {
        repo: Arc::new(PgStore::new(pool)),
        billing: Arc::new(StripeClient::new(
            &config.stripe,
            &config.app_base_url,
            config.http_timeout,
        )?),
        insights: Arc::new(OpenAiClient::new(&config.openai, config.http_timeout)?),
        webhooks: WebhookVerifier::new(config.stripe.webhook_secret.clone()),
    };

    let app = routes::app(state);

    tracing::info!("🧠 Server running at {}", config.bind_addr);

    axum::serve(
        tokio::net::TcpListener::bind(config.bind_addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
