use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{get, HttpResponse, Responder};
use actix_web::{web, App, HttpServer};

use sqlx::PgPool;

use tracing_actix_web::TracingLogger;

use crate::client::EmailClient;
use crate::controller::{count, subscriptions};
use crate::crypto::TokenIssuer;
use crate::limiter::RateLimiter;
use crate::settings::TokenSettings;

/// Simple health-check endpoint
#[tracing::instrument(name = "Health check")]
#[get("/health_check")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().finish()
}

/// Run the application on a specified TCP listener
pub fn run(
    listener: TcpListener,
    pool: PgPool,
    token_issuer: TokenIssuer,
    email_client: EmailClient,
    limiter: Arc<RateLimiter>,
    token_settings: TokenSettings,
) -> anyhow::Result<Server> {
    // Wrap application data
    let pool = web::Data::new(pool);
    let token_issuer = web::Data::new(token_issuer);
    let email_client = web::Data::new(email_client);
    let limiter = web::Data::from(limiter);
    let token_settings = web::Data::new(token_settings);

    // Start the server
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(pool.clone())
            .app_data(token_issuer.clone())
            .app_data(email_client.clone())
            .app_data(limiter.clone())
            .app_data(token_settings.clone())
            .service(health_check)
            .service(subscriptions::scope())
            .service(count::scope())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
