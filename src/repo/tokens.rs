use uuid::Uuid;

use chrono::{DateTime, Utc};

use sqlx::PgExecutor;

use crate::model::{TokenKind, TokenRecord};

#[derive(sqlx::FromRow)]
struct TokenRow {
    subscription_id: Uuid,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        Self {
            subscription_id: row.subscription_id,
            expires_at: row.expires_at,
            used_at: row.used_at,
        }
    }
}

/// Repository for subscription tokens, keyed by token digest
pub struct TokenRepo;

impl TokenRepo {
    #[tracing::instrument(name = "Insert subscription token", skip(executor, digest))]
    pub async fn insert<'con>(
        executor: impl PgExecutor<'con>,
        digest: &str,
        subscription_id: Uuid,
        kind: TokenKind,
        expires_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "insert into subscription_tokens(token_hash, subscription_id, kind, created_at, expires_at) \
             values ($1, $2, $3, $4, $5)",
        )
        .bind(digest)
        .bind(subscription_id)
        .bind(kind.as_str())
        .bind(Utc::now())
        .bind(expires_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Fetch subscription token", skip(executor, digest))]
    pub async fn fetch_by_digest<'con>(
        executor: impl PgExecutor<'con>,
        digest: &str,
        kind: TokenKind,
    ) -> sqlx::Result<Option<TokenRecord>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "select subscription_id, expires_at, used_at \
             from subscription_tokens where token_hash=$1 and kind=$2",
        )
        .bind(digest)
        .bind(kind.as_str())
        .fetch_optional(executor)
        .await?;

        Ok(row.map(TokenRecord::from))
    }

    /// Stamp `used_at` if nobody has yet. Returns `false` when the token was already used.
    #[tracing::instrument(name = "Mark subscription token used", skip(executor, digest))]
    pub async fn mark_used<'con>(
        executor: impl PgExecutor<'con>,
        digest: &str,
        used_at: DateTime<Utc>,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "update subscription_tokens set used_at=$2 where token_hash=$1 and used_at is null",
        )
        .bind(digest)
        .bind(used_at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Delete subscription tokens", skip(executor))]
    pub async fn delete_for_subscription<'con>(
        executor: impl PgExecutor<'con>,
        subscription_id: Uuid,
    ) -> sqlx::Result<u64> {
        let result = sqlx::query("delete from subscription_tokens where subscription_id=$1")
            .bind(subscription_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
