use chrono::{DateTime, Duration, Utc};

use sqlx::{PgConnection, PgExecutor};

use uuid::Uuid;

use crate::model::{Subscription, TokenKind, TokenState};
use crate::repo::{SubscriptionRepo, TokenRepo};

use super::{SigningKey, SubscriptionToken, TokenError};

/// Ways consuming a token can fail
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error(transparent)]
    InvalidFormat(#[from] TokenError),
    #[error("Token not found")]
    NotFound,
    #[error("Token expired")]
    Expired,
    #[error("Token already used")]
    AlreadyUsed,
    #[error("Failed to consume token")]
    Database(#[from] sqlx::Error),
}

/// Issues single-use subscription tokens and consumes them exactly once
#[derive(Clone)]
pub struct TokenIssuer {
    key: SigningKey,
}

impl TokenIssuer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Generate a token for `subscription_id` and store its digest
    #[tracing::instrument(name = "Issue subscription token", skip(self, executor))]
    pub async fn issue<'con>(
        &self,
        executor: impl PgExecutor<'con>,
        subscription_id: Uuid,
        kind: TokenKind,
        ttl: Duration,
    ) -> sqlx::Result<SubscriptionToken> {
        let token = SubscriptionToken::generate();
        let expires_at = Utc::now() + ttl;

        TokenRepo::insert(
            executor,
            &token.digest(&self.key),
            subscription_id,
            kind,
            expires_at,
        )
        .await?;

        Ok(token)
    }

    /// Use up a token supplied by a user, returning the subscription it belongs to
    pub async fn consume(
        &self,
        conn: &mut PgConnection,
        raw: &str,
        kind: TokenKind,
    ) -> Result<Subscription, ConsumeError> {
        self.consume_at(conn, raw, kind, Utc::now()).await
    }

    #[tracing::instrument(name = "Consume subscription token", skip(self, conn, raw))]
    pub async fn consume_at(
        &self,
        conn: &mut PgConnection,
        raw: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Subscription, ConsumeError> {
        let token: SubscriptionToken = raw.parse()?;
        let digest = token.digest(&self.key);

        let record = TokenRepo::fetch_by_digest(&mut *conn, &digest, kind)
            .await?
            .ok_or(ConsumeError::NotFound)?;

        match record.state_at(now) {
            TokenState::Expired => return Err(ConsumeError::Expired),
            TokenState::Used => return Err(ConsumeError::AlreadyUsed),
            TokenState::Usable => {}
        }

        // Lost a race against a concurrent consumer
        if !TokenRepo::mark_used(&mut *conn, &digest, now).await? {
            return Err(ConsumeError::AlreadyUsed);
        }

        SubscriptionRepo::fetch_by_id(&mut *conn, record.subscription_id)
            .await?
            .ok_or(ConsumeError::NotFound)
    }
}
