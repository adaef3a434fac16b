use uuid::Uuid;

use chrono::{DateTime, Utc};

use serde::Serialize;

use serde_json::Value;

use crate::domain::{EmailAddress, Metadata, SubscriptionSource, SubscriptionStatus, Tags};

/// New Subscription request, validated and ready to store
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub email: EmailAddress,
    pub source: SubscriptionSource,
    pub tags: Tags,
    pub metadata: Metadata,
}

/// Stored Subscription record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// ID of the subscription
    pub id: Uuid,
    /// Normalized email, unique across the table
    pub email: String,
    pub status: SubscriptionStatus,
    pub source: SubscriptionSource,
    pub tags: Vec<String>,
    /// Caller supplied data, never echoed back
    #[serde(skip_serializing)]
    pub metadata: Value,
    pub subscribed_at: DateTime<Utc>,
    /// `None` until a confirmation token for this subscription is consumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
