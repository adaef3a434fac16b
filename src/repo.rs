mod subscriptions;
mod tokens;

pub use subscriptions::{StoreError, SubscriptionRepo};
pub use tokens::TokenRepo;
