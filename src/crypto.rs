mod issuer;
mod signing_key;
mod token;

pub use issuer::{ConsumeError, TokenIssuer};
pub use signing_key::SigningKey;
pub use token::{SubscriptionToken, TokenError, TOKEN_LEN};
