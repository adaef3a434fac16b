use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use uuid::Uuid;

/// What consuming a token does to its subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Confirmation,
    Unsubscribe,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmation" => Ok(Self::Confirmation),
            "unsubscribe" => Ok(Self::Unsubscribe),
            other => Err(format!("{} is not a valid token kind", other)),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Usable,
    Expired,
    Used,
}

/// Stored token row, addressed by the digest of the token
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub subscription_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Expiry wins over prior use: an expired token never reports `Used`
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if now > self.expires_at {
            TokenState::Expired
        } else if self.used_at.is_some() {
            TokenState::Used
        } else {
            TokenState::Usable
        }
    }
}
