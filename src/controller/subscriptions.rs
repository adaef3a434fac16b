use actix_web::dev::HttpServiceFactory;
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};

use serde::{Deserialize, Serialize};

use serde_json::{Map, Value};

use sqlx::PgPool;

use url::Url;

use crate::client::{EmailClient, WelcomeLinks};
use crate::controller::envelope::{rate_limit_headers, Envelope};
use crate::controller::links::{self, CONFIRM_ROUTE, UNSUBSCRIBE_ROUTE};
use crate::crypto::{SubscriptionToken, TokenIssuer};
use crate::domain::{EmailAddress, Metadata, SchemaError, SubscriptionSource, Tags};
use crate::error::{RestError, RestResult};
use crate::limiter::{RateLimitAllowance, RateLimiter};
use crate::model::{NewSubscription, Subscription, TokenKind};
use crate::repo::{StoreError, SubscriptionRepo, TokenRepo};
use crate::settings::TokenSettings;

const UNKNOWN_CLIENT: &str = "unknown";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// JSON body of a subscribe request
#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    email: String,
    source: Option<SubscriptionSource>,
    tags: Option<Vec<String>>,
    metadata: Option<Map<String, Value>>,
}

impl TryFrom<SubscribeBody> for NewSubscription {
    type Error = RestError;

    fn try_from(body: SubscribeBody) -> RestResult<Self> {
        // Shape is checked before the address itself
        let tags = Tags::try_from(body.tags.unwrap_or_default())?;
        let metadata = Metadata::try_from(body.metadata.unwrap_or_default())?;
        let email = EmailAddress::parse(&body.email)?;

        Ok(Self {
            email,
            source: body.source.unwrap_or_default(),
            tags,
            metadata,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeData<'a> {
    message: &'static str,
    subscriber_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscription: Option<&'a Subscription>,
}

/// Identify the caller by the first non-empty forwarding header
fn client_id(req: &HttpRequest) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    let forwarded_for = header("X-Forwarded-For").and_then(|value| value.split(',').next());

    [
        forwarded_for,
        header("CF-Connecting-IP"),
        header("X-Real-IP"),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|value| !value.is_empty())
    .unwrap_or(UNKNOWN_CLIENT)
    .to_string()
}

fn check_content_type(req: &HttpRequest) -> RestResult<()> {
    if !req.content_type().eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        return Err(RestError::ContentType);
    }
    Ok(())
}

/// Buffer the body, refusing anything over [`MAX_BODY_BYTES`]
async fn read_body(payload: web::Payload) -> RestResult<web::Bytes> {
    match payload.to_bytes_limited(MAX_BODY_BYTES).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(_)) => Err(RestError::BodyTooLarge),
        Err(e) => Err(RestError::BodyUnreadable(e.to_string())),
    }
}

fn parse_body(body: &[u8]) -> RestResult<SubscribeBody> {
    let value: Value = serde_json::from_slice(body).map_err(RestError::Json)?;

    serde_json::from_value(value)
        .map_err(|e| SchemaError::Malformed(e.to_string()).into())
}

/// Create endpoint for new subscriptions
#[tracing::instrument(
    name = "Create a new subscriber",
    skip(req, payload, pool, limiter, token_issuer, token_settings, email_client),
    fields(client_id = tracing::field::Empty)
)]
async fn create(
    req: HttpRequest,
    payload: web::Payload,
    pool: web::Data<PgPool>,
    limiter: web::Data<RateLimiter>,
    token_issuer: web::Data<TokenIssuer>,
    token_settings: web::Data<TokenSettings>,
    email_client: web::Data<EmailClient>,
) -> RestResult<HttpResponse> {
    check_content_type(&req)?;
    let body = read_body(payload).await?;
    let new_subscription: NewSubscription = parse_body(&body)?.try_into()?;

    let client_id = client_id(&req);
    tracing::Span::current().record("client_id", client_id.as_str());

    let allowance = limiter.check(&client_id, Some(new_subscription.email.as_ref()))?;

    let mut tx = pool.begin().await?;

    let (subscription, reactivated) =
        match SubscriptionRepo::fetch_by_email(&mut *tx, &new_subscription.email).await? {
            Some(existing) if existing.is_active() => {
                // Release the connection before counting on the pool
                tx.rollback().await?;
                return already_subscribed(pool.get_ref(), Some(existing), allowance).await;
            }
            Some(existing) => {
                TokenRepo::delete_for_subscription(&mut *tx, existing.id).await?;
                let subscription =
                    SubscriptionRepo::reactivate(&mut *tx, existing.id, &new_subscription).await?;
                (subscription, true)
            }
            None => match SubscriptionRepo::insert(&mut *tx, &new_subscription).await {
                Ok(subscription) => (subscription, false),
                Err(StoreError::UniqueViolation) => {
                    // Lost a race with a concurrent request for the same email
                    tx.rollback().await?;
                    let existing =
                        SubscriptionRepo::fetch_by_email(pool.get_ref(), &new_subscription.email)
                            .await?;
                    return already_subscribed(pool.get_ref(), existing, allowance).await;
                }
                Err(e) => return Err(e.into()),
            },
        };

    let confirmation_token = token_issuer
        .issue(
            &mut *tx,
            subscription.id,
            TokenKind::Confirmation,
            token_settings.confirmation_ttl(),
        )
        .await?;
    let unsubscribe_token = token_issuer
        .issue(
            &mut *tx,
            subscription.id,
            TokenKind::Unsubscribe,
            token_settings.unsubscribe_ttl(),
        )
        .await?;

    let links = WelcomeLinks {
        confirm: link(&req, CONFIRM_ROUTE, &confirmation_token)?,
        unsubscribe: link(&req, UNSUBSCRIBE_ROUTE, &unsubscribe_token)?,
    };

    tx.commit().await?;

    notify(email_client.get_ref(), &new_subscription.email, &links).await;

    let subscriber_count = SubscriptionRepo::count_active(pool.get_ref()).await?;
    let message = if reactivated {
        "Welcome back! Please confirm your subscription"
    } else {
        "Subscription created. Please confirm your email address"
    };

    let mut builder = HttpResponse::build(StatusCode::CREATED);
    rate_limit_headers(
        &mut builder,
        allowance.limit,
        allowance.remaining,
        allowance.reset_at,
    );
    Ok(builder.json(Envelope::success(
        "SUCCESS",
        SubscribeData {
            message,
            subscriber_count,
            subscription: Some(&subscription),
        },
    )))
}

async fn already_subscribed(
    pool: &PgPool,
    subscription: Option<Subscription>,
    allowance: RateLimitAllowance,
) -> RestResult<HttpResponse> {
    let subscriber_count = SubscriptionRepo::count_active(pool).await?;

    let mut builder = HttpResponse::Ok();
    rate_limit_headers(
        &mut builder,
        allowance.limit,
        allowance.remaining,
        allowance.reset_at,
    );
    Ok(builder.json(Envelope::success(
        "ALREADY_SUBSCRIBED",
        SubscribeData {
            message: "This email is already subscribed",
            subscriber_count,
            subscription: subscription.as_ref(),
        },
    )))
}

/// Send the welcome email. The subscription is already stored, so failures are only logged.
async fn notify(email_client: &EmailClient, recipient: &EmailAddress, links: &WelcomeLinks) {
    if let Err(error) = email_client.send_welcome(recipient, links).await {
        tracing::warn!(
            error.cause_chain = ?error,
            "Failed to send welcome email to {}",
            recipient
        );
    }
}

fn link(req: &HttpRequest, route: &str, token: &SubscriptionToken) -> RestResult<Url> {
    let mut url = req.url_for_static(route)?;
    url.query_pairs_mut().append_pair("token", token.as_ref());
    Ok(url)
}

async fn method_not_allowed() -> RestResult<HttpResponse> {
    Err(RestError::MethodNotAllowed)
}

/// Subscription API endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/subscribe")
        .app_data(links::query_config())
        .service(
            web::resource("")
                .route(web::post().to(create))
                .default_service(web::to(method_not_allowed)),
        )
        .service(links::confirm)
        .service(links::unsubscribe)
}
