//! Endpoints behind the links in the welcome email.

use actix_web::http::StatusCode;
use actix_web::{get, web, HttpRequest, HttpResponse};

use serde::Deserialize;

use sqlx::PgPool;

use crate::controller::envelope::Outcome;
use crate::crypto::{ConsumeError, TokenIssuer};
use crate::domain::SubscriptionStatus;
use crate::error::{RestError, RestResult};
use crate::model::TokenKind;
use crate::repo::SubscriptionRepo;

pub const CONFIRM_ROUTE: &str = "confirm_subscription";
pub const UNSUBSCRIBE_ROUTE: &str = "unsubscribe";

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// Unparseable query strings get the same answer as a malformed token
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, req: &HttpRequest| {
        tracing::debug!(error = %err, path = req.path(), "Rejected token query");
        RestError::TokenInvalid.into()
    })
}

impl TokenQuery {
    fn token(&self) -> RestResult<&str> {
        self.token.as_deref().ok_or(RestError::TokenInvalid)
    }
}

/// Subscription confirmation endpoint
#[tracing::instrument(name = "Confirm a subscription by token", skip(query, pool, token_issuer))]
#[get("/confirm", name = "confirm_subscription")]
pub async fn confirm(
    query: web::Query<TokenQuery>,
    pool: web::Data<PgPool>,
    token_issuer: web::Data<TokenIssuer>,
) -> RestResult<HttpResponse> {
    let token = query.token()?;
    let mut tx = pool.begin().await?;

    match token_issuer
        .consume(&mut tx, token, TokenKind::Confirmation)
        .await
    {
        Ok(subscription) => {
            SubscriptionRepo::confirm_by_id(&mut *tx, subscription.id).await?;
            tx.commit().await?;

            Ok(Outcome::new(true, "Your subscription is confirmed", "CONFIRMED")
                .respond(StatusCode::OK))
        }
        Err(ConsumeError::AlreadyUsed) => Ok(Outcome::new(
            true,
            "Your subscription was already confirmed",
            "ALREADY_CONFIRMED",
        )
        .respond(StatusCode::OK)),
        Err(e) => Err(e.into()),
    }
}

/// One-click unsubscribe endpoint
#[tracing::instrument(name = "Unsubscribe by token", skip(query, pool, token_issuer))]
#[get("/unsubscribe", name = "unsubscribe")]
pub async fn unsubscribe(
    query: web::Query<TokenQuery>,
    pool: web::Data<PgPool>,
    token_issuer: web::Data<TokenIssuer>,
) -> RestResult<HttpResponse> {
    let already_unsubscribed = || {
        Outcome::new(
            true,
            "You are already unsubscribed",
            "ALREADY_UNSUBSCRIBED",
        )
        .respond(StatusCode::OK)
    };

    let token = query.token()?;
    let mut tx = pool.begin().await?;

    match token_issuer
        .consume(&mut tx, token, TokenKind::Unsubscribe)
        .await
    {
        Ok(subscription) if subscription.status == SubscriptionStatus::Unsubscribed => {
            tx.commit().await?;
            Ok(already_unsubscribed())
        }
        Ok(subscription) => {
            SubscriptionRepo::update_status(
                &mut *tx,
                subscription.id,
                SubscriptionStatus::Unsubscribed,
            )
            .await?;
            tx.commit().await?;

            Ok(Outcome::new(true, "You have been unsubscribed", "UNSUBSCRIBED")
                .respond(StatusCode::OK))
        }
        Err(ConsumeError::AlreadyUsed) => Ok(already_unsubscribed()),
        Err(e) => Err(e.into()),
    }
}
