mod subscriptions;
mod tokens;

pub use subscriptions::{NewSubscription, Subscription};
pub use tokens::{TokenKind, TokenRecord, TokenState};
