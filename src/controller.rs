pub mod count;
pub mod envelope;
pub mod links;
pub mod subscriptions;
