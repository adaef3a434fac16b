mod rate_limiter;
mod sweeper;

pub use rate_limiter::{
    DenialReason, RateLimitAllowance, RateLimitDenial, RateLimitPolicy, RateLimiter,
};
pub use sweeper::RateLimitSweeper;
