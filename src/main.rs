use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;

use sqlx::PgPool;

use newsletter::app;
use newsletter::client::EmailClient;
use newsletter::crypto::{SigningKey, TokenIssuer};
use newsletter::limiter::{RateLimitSweeper, RateLimiter};
use newsletter::settings::Settings;
use newsletter::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber("info", std::io::stdout);
    telemetry::set_subscriber(subscriber)?;

    let settings = Settings::load()?;

    let pool = PgPool::connect_with(settings.database.with_db())
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let signing_key = SigningKey::new(settings.app.secret_key())?;
    let token_issuer = TokenIssuer::new(signing_key);

    let email_client = EmailClient::new(
        settings.email.sender()?,
        settings.email.api_timeout(),
        settings.email.api_base_url()?,
        settings.email.api_auth_token(),
    )?;

    let limiter = Arc::new(RateLimiter::new(settings.rate_limit.policy()));
    let sweeper = RateLimitSweeper::spawn(limiter.clone(), settings.rate_limit.sweep_interval());

    let listener = TcpListener::bind(settings.app.addr())?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let result = app::run(
        listener,
        pool,
        token_issuer,
        email_client,
        limiter,
        settings.tokens,
    )?
    .await
    .context("Failed to run app");

    sweeper.shutdown().await;

    result
}
