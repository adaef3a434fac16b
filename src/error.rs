use actix_web::error::UrlGenerationError;
use actix_web::http::header::{ALLOW, RETRY_AFTER};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use chrono::Utc;

use serde_json::{json, Value};

use thiserror::Error;

use crate::controller::envelope::{rate_limit_headers, Envelope, Outcome};
use crate::controller::subscriptions::MAX_BODY_BYTES;
use crate::crypto::ConsumeError;
use crate::domain::{EmailError, SchemaError};
use crate::limiter::{DenialReason, RateLimitDenial};
use crate::repo::StoreError;

pub type RestResult<T> = Result<T, RestError>;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("Content-Type must be application/json")]
    ContentType,

    #[error("Request body must be at most {} bytes", MAX_BODY_BYTES)]
    BodyTooLarge,

    #[error("Failed to read request body: {0}")]
    BodyUnreadable(String),

    #[error("Request body is not valid JSON")]
    Json(#[source] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("{}", rate_limit_message(.0.reason))]
    RateLimited(#[from] RateLimitDenial),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

fn rate_limit_message(reason: DenialReason) -> &'static str {
    match reason {
        DenialReason::DuplicateEmail => "This email was submitted moments ago, please wait",
        DenialReason::RateLimit => "Too many requests, please try again later",
    }
}

impl RestError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::ContentType => "VALIDATION_CONTENT_TYPE",
            Self::BodyTooLarge | Self::BodyUnreadable(_) | Self::Json(_) => "VALIDATION_JSON",
            Self::Schema(_) => "VALIDATION_SCHEMA",
            Self::Email(_) => "VALIDATION_EMAIL",
            Self::RateLimited(denial) => match denial.reason {
                DenialReason::DuplicateEmail => "RATE_LIMIT_DUPLICATE",
                DenialReason::RateLimit => "RATE_LIMIT_EXCEEDED",
            },
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Internal(_) => "SERVER_INTERNAL",
        }
    }

    /// Token link endpoints answer with the short outcome body instead of the envelope
    fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenInvalid | Self::TokenNotFound | Self::TokenExpired
        )
    }
}

impl From<sqlx::Error> for RestError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(e).context("Database error"))
    }
}

impl From<StoreError> for RestError {
    fn from(e: StoreError) -> Self {
        Self::Internal(anyhow::Error::new(e).context("Subscription store error"))
    }
}

impl From<UrlGenerationError> for RestError {
    fn from(e: UrlGenerationError) -> Self {
        Self::Internal(anyhow::Error::new(e).context("Failed to generate URL for controller"))
    }
}

impl From<ConsumeError> for RestError {
    fn from(e: ConsumeError) -> Self {
        match e {
            ConsumeError::InvalidFormat(_) => Self::TokenInvalid,
            ConsumeError::NotFound => Self::TokenNotFound,
            ConsumeError::Expired => Self::TokenExpired,
            other => Self::Internal(anyhow::Error::new(other).context("Failed to consume token")),
        }
    }
}

impl ResponseError for RestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ContentType
            | Self::BodyTooLarge
            | Self::BodyUnreadable(_)
            | Self::Json(_)
            | Self::Schema(_)
            | Self::Email(_)
            | Self::TokenInvalid => StatusCode::BAD_REQUEST,
            Self::RateLimited(denial) => match denial.reason {
                DenialReason::DuplicateEmail => StatusCode::CONFLICT,
                DenialReason::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            },
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::TokenNotFound => StatusCode::NOT_FOUND,
            Self::TokenExpired => StatusCode::GONE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        if let Self::Internal(e) = self {
            tracing::error!(error.cause_chain = ?e, "Request failed with an internal error");
        }

        if self.is_token_error() {
            return Outcome::new(false, self.to_string(), self.code()).respond(status);
        }

        let mut builder = HttpResponse::build(status);
        let mut data: Option<Value> = None;

        match self {
            Self::Email(e) if !e.suggestions().is_empty() => {
                data = Some(json!({ "suggestions": e.suggestions() }));
            }
            Self::RateLimited(denial) => {
                rate_limit_headers(
                    &mut builder,
                    denial.limit,
                    denial.remaining,
                    denial.reset_at,
                );
                builder.insert_header((
                    RETRY_AFTER,
                    denial.retry_after_secs(Utc::now()).to_string(),
                ));
            }
            Self::MethodNotAllowed => {
                builder.insert_header((ALLOW, "POST"));
            }
            _ => {}
        }

        builder.json(Envelope::failure(self.code(), self.to_string(), data))
    }
}
