use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use serde_json::{Map, Value};

use unicode_segmentation::UnicodeSegmentation;

pub const MAX_TAGS: usize = 10;
pub const MAX_METADATA_KEYS: usize = 20;

const MAX_TAG_LEN: usize = 50;
const MAX_METADATA_KEY_LEN: usize = 64;

/// Request shape violations, reported before the email itself is looked at
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{0}")]
    Malformed(String),
    #[error("At most {} tags are allowed", MAX_TAGS)]
    TooManyTags,
    #[error("Tags must be between 1 and {} characters", MAX_TAG_LEN)]
    InvalidTag,
    #[error("At most {} metadata keys are allowed", MAX_METADATA_KEYS)]
    TooManyMetadataKeys,
    #[error("Metadata keys must be between 1 and {} characters", MAX_METADATA_KEY_LEN)]
    InvalidMetadataKey,
}

/// Lifecycle state of a stored subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Unsubscribed,
    Bounced,
    Blocked,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Unsubscribed => "unsubscribed",
            Self::Bounced => "bounced",
            Self::Blocked => "blocked",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "bounced" => Ok(Self::Bounced),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("{} is not a valid subscription status", other)),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a subscription request originated
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionSource {
    #[default]
    Web,
    Mobile,
    Widget,
}

impl SubscriptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
            Self::Widget => "widget",
        }
    }
}

impl FromStr for SubscriptionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "mobile" => Ok(Self::Mobile),
            "widget" => Ok(Self::Widget),
            other => Err(format!("{} is not a valid subscription source", other)),
        }
    }
}

/// Short labels attached to a subscription, trimmed and de-duplicated
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tags(Vec<String>);

impl TryFrom<Vec<String>> for Tags {
    type Error = SchemaError;

    fn try_from(raw: Vec<String>) -> Result<Self, Self::Error> {
        if raw.len() > MAX_TAGS {
            return Err(SchemaError::TooManyTags);
        }

        let mut tags: Vec<String> = Vec::with_capacity(raw.len());
        for tag in raw {
            let tag = tag.trim();
            let len = tag.graphemes(true).count();
            if len == 0 || len > MAX_TAG_LEN {
                return Err(SchemaError::InvalidTag);
            }
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        Ok(Self(tags))
    }
}

impl AsRef<[String]> for Tags {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}

/// Opaque key/value data supplied by the caller
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metadata(Map<String, Value>);

impl TryFrom<Map<String, Value>> for Metadata {
    type Error = SchemaError;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        if raw.len() > MAX_METADATA_KEYS {
            return Err(SchemaError::TooManyMetadataKeys);
        }
        let bad_key = raw.keys().any(|key| {
            let len = key.graphemes(true).count();
            len == 0 || len > MAX_METADATA_KEY_LEN
        });
        if bad_key {
            return Err(SchemaError::InvalidMetadataKey);
        }
        Ok(Self(raw))
    }
}

impl Metadata {
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
