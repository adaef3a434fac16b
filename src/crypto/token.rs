use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;

use super::SigningKey;

/// Random bytes per token
pub const TOKEN_BYTES: usize = 32;
/// Length of a token as it appears in a `?token=` link: 32 bytes as 64 lowercase hex characters
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Errors that can occur when reading a token supplied by a user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token must be {} lowercase hex characters", TOKEN_LEN)]
    InvalidFormat,
}

/// A single-use secret handed out in confirmation and unsubscribe links.
///
/// Only the keyed digest of a token is ever persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    /// Generate a fresh token from the operating system's CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Hex-encoded HMAC of the token, used as its storage key
    pub fn digest(&self, key: &SigningKey) -> String {
        hex::encode(key.digest(self.0.as_bytes()))
    }
}

impl FromStr for SubscriptionToken {
    type Err = TokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let well_formed = value.len() == TOKEN_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(TokenError::InvalidFormat)
        }
    }
}

impl AsRef<str> for SubscriptionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs
impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubscriptionToken(..)")
    }
}
