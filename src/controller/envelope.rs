use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};

use chrono::{DateTime, SecondsFormat, Utc};

use serde::Serialize;

/// Body shared by every `/subscribe` response
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    code: &'static str,
    timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(code: &'static str, data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code,
            timestamp: timestamp(),
        }
    }

    pub fn failure(code: &'static str, error: String, data: Option<T>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error),
            code,
            timestamp: timestamp(),
        }
    }
}

/// Body of the token link endpoints
#[derive(Debug, Serialize)]
pub struct Outcome {
    success: bool,
    message: String,
    code: &'static str,
}

impl Outcome {
    pub fn new(success: bool, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            success,
            message: message.into(),
            code,
        }
    }

    pub fn respond(self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self)
    }
}

/// Attach the `X-RateLimit-*` headers
pub fn rate_limit_headers(
    builder: &mut HttpResponseBuilder,
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
) {
    builder
        .insert_header(("X-RateLimit-Limit", limit.to_string()))
        .insert_header(("X-RateLimit-Remaining", remaining.to_string()))
        .insert_header(("X-RateLimit-Reset", reset_at.timestamp().to_string()));
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
