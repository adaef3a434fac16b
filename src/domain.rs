mod email_address;
mod subscription;

pub use email_address::{EmailAddress, EmailError};
pub use subscription::{
    Metadata, SchemaError, SubscriptionSource, SubscriptionStatus, Tags, MAX_METADATA_KEYS,
    MAX_TAGS,
};
