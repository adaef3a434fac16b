use actix_web::dev::HttpServiceFactory;
use actix_web::{get, web, HttpResponse, Responder};

use serde::Serialize;

use sqlx::PgPool;

use crate::error::RestResult;
use crate::repo::SubscriptionRepo;

#[derive(Debug, Serialize)]
struct CountBody {
    count: i64,
}

#[tracing::instrument(name = "Count active subscriptions", skip(pool))]
#[get("/count")]
async fn count(pool: web::Data<PgPool>) -> RestResult<impl Responder> {
    let count = SubscriptionRepo::count_active(pool.get_ref()).await?;

    Ok(HttpResponse::Ok().json(CountBody { count }))
}

/// Read-only subscription statistics
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/subscriptions").service(count)
}
