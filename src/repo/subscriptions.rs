use uuid::Uuid;

use chrono::{DateTime, Utc};

use serde_json::Value;

use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::domain::{EmailAddress, SubscriptionSource, SubscriptionStatus};
use crate::model::{NewSubscription, Subscription};

const SUBSCRIPTION_COLUMNS: &str = "id, email, status, source, tags, metadata, \
     subscribed_at, confirmed_at, unsubscribed_at";

/// Write failures the caller needs to tell apart
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another row already holds this email
    #[error("A subscription already exists for this email")]
    UniqueViolation,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    fn from_write(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return Self::UniqueViolation;
            }
        }
        Self::Database(e)
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    email: String,
    status: String,
    source: String,
    tags: Vec<String>,
    metadata: Json<Value>,
    subscribed_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    unsubscribed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = sqlx::Error;

    fn try_from(row: SubscriptionRow) -> sqlx::Result<Self> {
        let status: SubscriptionStatus = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let source: SubscriptionSource = row
            .source
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            id: row.id,
            email: row.email,
            status,
            source,
            tags: row.tags,
            metadata: row.metadata.0,
            subscribed_at: row.subscribed_at,
            confirmed_at: row.confirmed_at,
            unsubscribed_at: row.unsubscribed_at,
        })
    }
}

/// Repository for interfacing with the subscriptions table
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Insert a new, active subscription.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when the email is already stored.
    #[tracing::instrument(name = "Insert subscriber", skip(executor))]
    pub async fn insert<'con>(
        executor: impl PgExecutor<'con>,
        new_subscription: &NewSubscription,
    ) -> Result<Subscription, StoreError> {
        let query = format!(
            "insert into subscriptions(id, email, status, source, tags, metadata, subscribed_at) \
             values ($1, $2, $3, $4, $5, $6, $7) returning {}",
            SUBSCRIPTION_COLUMNS
        );
        let row: SubscriptionRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(new_subscription.email.as_ref())
            .bind(SubscriptionStatus::Active.as_str())
            .bind(new_subscription.source.as_str())
            .bind(new_subscription.tags.as_ref())
            .bind(Json(new_subscription.metadata.clone().into_value()))
            .bind(Utc::now())
            .fetch_one(executor)
            .await
            .map_err(StoreError::from_write)?;

        Ok(row.try_into()?)
    }

    #[tracing::instrument(name = "Fetch subscriber by email", skip(executor))]
    pub async fn fetch_by_email<'con>(
        executor: impl PgExecutor<'con>,
        email: &EmailAddress,
    ) -> sqlx::Result<Option<Subscription>> {
        let query = format!(
            "select {} from subscriptions where email=$1",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(email.as_ref())
            .fetch_optional(executor)
            .await?;

        row.map(Subscription::try_from).transpose()
    }

    #[tracing::instrument(name = "Fetch subscriber by id", skip(executor))]
    pub async fn fetch_by_id<'con>(
        executor: impl PgExecutor<'con>,
        id: Uuid,
    ) -> sqlx::Result<Option<Subscription>> {
        let query = format!(
            "select {} from subscriptions where id=$1",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.map(Subscription::try_from).transpose()
    }

    /// Bring an inactive subscription back to `active` with the newly requested details.
    /// The subscription has to be confirmed again afterwards.
    #[tracing::instrument(name = "Reactivate subscriber", skip(executor))]
    pub async fn reactivate<'con>(
        executor: impl PgExecutor<'con>,
        id: Uuid,
        new_subscription: &NewSubscription,
    ) -> sqlx::Result<Subscription> {
        let query = format!(
            "update subscriptions \
             set status=$2, source=$3, tags=$4, metadata=$5, subscribed_at=$6, \
                 confirmed_at=null, unsubscribed_at=null \
             where id=$1 returning {}",
            SUBSCRIPTION_COLUMNS
        );
        let row: SubscriptionRow = sqlx::query_as(&query)
            .bind(id)
            .bind(SubscriptionStatus::Active.as_str())
            .bind(new_subscription.source.as_str())
            .bind(new_subscription.tags.as_ref())
            .bind(Json(new_subscription.metadata.clone().into_value()))
            .bind(Utc::now())
            .fetch_one(executor)
            .await?;

        row.try_into()
    }

    /// Move a subscription to `status`, stamping `unsubscribed_at` when leaving
    #[tracing::instrument(name = "Update subscriber status", skip(executor))]
    pub async fn update_status<'con>(
        executor: impl PgExecutor<'con>,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> sqlx::Result<()> {
        let unsubscribed_at = (status == SubscriptionStatus::Unsubscribed).then(Utc::now);
        sqlx::query(
            "update subscriptions \
             set status=$2, unsubscribed_at=coalesce($3, unsubscribed_at) \
             where id=$1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(unsubscribed_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Confirm a subscriber by id", skip(executor))]
    pub async fn confirm_by_id<'con>(
        executor: impl PgExecutor<'con>,
        id: Uuid,
    ) -> sqlx::Result<()> {
        let confirmed_at = Utc::now();
        sqlx::query("update subscriptions set confirmed_at=$2 where id=$1")
            .bind(id)
            .bind(confirmed_at)
            .execute(executor)
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Count active subscribers", skip(executor))]
    pub async fn count_active<'con>(executor: impl PgExecutor<'con>) -> sqlx::Result<i64> {
        sqlx::query_scalar("select count(*) from subscriptions where status=$1")
            .bind(SubscriptionStatus::Active.as_str())
            .fetch_one(executor)
            .await
    }
}
